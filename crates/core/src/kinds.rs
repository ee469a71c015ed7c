//! Closed vocabularies shared by every pipeline stage.
//!
//! Each enum has a stable wire/database spelling (`as_str`) and parses back
//! from it via [`std::str::FromStr`]. The spellings are part of the registry
//! schema, so never rename a variant's string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored or inbound string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Assay a member is tracked for.
    GenomeType {
        Array => "aou_array",
        Wgs => "aou_wgs",
        Cvl => "aou_cvl",
    }
}

impl GenomeType {
    /// Genome type named by the `GEN` / `SEQ` token of a genome-center filename.
    pub fn from_gc_token(token: &str) -> Option<Self> {
        match token {
            "GEN" => Some(GenomeType::Array),
            "SEQ" => Some(GenomeType::Wgs),
            _ => None,
        }
    }

    /// Short label used in folder names and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            GenomeType::Array => "array",
            GenomeType::Wgs => "wgs",
            GenomeType::Cvl => "cvl",
        }
    }
}

string_enum! {
    /// Pipeline stage a member currently occupies.
    WorkflowState {
        Aw0 => "AW0",
        Aw1 => "AW1",
        Aw1fPre => "AW1F_PRE",
        Aw1fPost => "AW1F_POST",
        Aw2 => "AW2",
        Aw2Missing => "AW2_MISSING",
        Aw2Fail => "AW2_FAIL",
        GemReady => "GEM_READY",
        A1 => "A1",
        A2 => "A2",
        A2f => "A2F",
        A3 => "A3",
        CvlReady => "CVL_READY",
        W1 => "W1",
        W2 => "W2",
        W3 => "W3",
        Aw1c => "AW1C",
        Aw1cfPost => "AW1CF_POST",
        ControlSample => "CONTROL_SAMPLE",
    }
}

string_enum! {
    /// Every batch job the controller knows how to run.
    JobKind {
        NewParticipantWorkflow => "NEW_PARTICIPANT_WORKFLOW",
        Aw1Manifest => "AW1_MANIFEST",
        Aw1fManifest => "AW1F_MANIFEST",
        Aw2Metrics => "AW2_METRICS",
        ReconcileArray => "RECONCILE_ARRAY",
        ReconcileWgs => "RECONCILE_WGS",
        GemA1Manifest => "GEM_A1_MANIFEST",
        GemA2Manifest => "GEM_A2_MANIFEST",
        GemA3Manifest => "GEM_A3_MANIFEST",
        CvlW1Manifest => "CVL_W1_MANIFEST",
        CvlW2Manifest => "CVL_W2_MANIFEST",
        CvlW3Manifest => "CVL_W3_MANIFEST",
        Aw1cManifest => "AW1C_MANIFEST",
        Aw1cfManifest => "AW1CF_MANIFEST",
        Aw2fManifest => "AW2F_MANIFEST",
        Aw3ArrayManifest => "AW3_ARRAY_MANIFEST",
        Aw3WgsManifest => "AW3_WGS_MANIFEST",
        Aw4ArrayManifest => "AW4_ARRAY_MANIFEST",
        Aw4WgsManifest => "AW4_WGS_MANIFEST",
    }
}

string_enum! {
    /// Every manifest exchanged with a laboratory or partner.
    ManifestKind {
        NewParticipant => "NEW_PARTICIPANT",
        Aw1 => "AW1",
        Aw1f => "AW1F",
        Aw2Array => "AW2_ARRAY",
        Aw2Wgs => "AW2_WGS",
        Aw2f => "AW2F",
        GemA1 => "GEM_A1",
        GemA2 => "GEM_A2",
        GemA3 => "GEM_A3",
        CvlW1 => "CVL_W1",
        CvlW2 => "CVL_W2",
        CvlW3 => "CVL_W3",
        Aw1c => "AW1C",
        Aw1cf => "AW1CF",
        Aw3Array => "AW3_ARRAY",
        Aw3Wgs => "AW3_WGS",
        Aw4Array => "AW4_ARRAY",
        Aw4Wgs => "AW4_WGS",
    }
}

string_enum! {
    JobStatus {
        Running => "RUNNING",
        Completed => "COMPLETED",
    }
}

string_enum! {
    /// Outcome recorded on a job run or a processed file.
    JobResult {
        Success => "SUCCESS",
        Error => "ERROR",
        InvalidFileName => "INVALID_FILE_NAME",
        InvalidFileStructure => "INVALID_FILE_STRUCTURE",
        NoFilesFound => "NO_FILES_FOUND",
    }
}

impl JobResult {
    /// Ordering used to fold per-file results into one job result.
    pub fn severity(&self) -> u8 {
        match self {
            JobResult::NoFilesFound => 0,
            JobResult::Success => 1,
            JobResult::InvalidFileName => 2,
            JobResult::InvalidFileStructure => 3,
            JobResult::Error => 4,
        }
    }

    /// NO_FILES_FOUND counts as success; only failures are errors.
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success | JobResult::NoFilesFound)
    }
}

string_enum! {
    FileStatus {
        Processing => "PROCESSING",
        Processed => "PROCESSED",
    }
}

string_enum! {
    SetStatus {
        Created => "CREATED",
        Invalid => "INVALID",
    }
}

string_enum! {
    QcStatus {
        Unset => "UNSET",
        Pass => "PASS",
        Fail => "FAIL",
    }
}

string_enum! {
    ContaminationCategory {
        Unset => "UNSET",
        NoExtract => "NO_EXTRACT",
        ExtractWgs => "EXTRACT_WGS",
        ExtractBoth => "EXTRACT_BOTH",
        TerminalNoExtract => "TERMINAL_NO_EXTRACT",
    }
}

string_enum! {
    /// Participant's genomics return-of-results consent answer.
    GrorConsent {
        Unset => "UNSET",
        Submitted => "SUBMITTED",
        SubmittedNoConsent => "SUBMITTED_NO_CONSENT",
    }
}

string_enum! {
    /// One expected raw data file produced by a genome center.
    DataFileKind {
        IdatRed => "idat_red",
        IdatGreen => "idat_green",
        IdatRedMd5 => "idat_red_md5",
        IdatGreenMd5 => "idat_green_md5",
        Vcf => "vcf",
        VcfTbi => "vcf_tbi",
        VcfMd5 => "vcf_md5",
        HfVcf => "hf_vcf",
        HfVcfTbi => "hf_vcf_tbi",
        HfVcfMd5 => "hf_vcf_md5",
        Cram => "cram",
        CramMd5 => "cram_md5",
        Crai => "crai",
    }
}

impl DataFileKind {
    /// Lower-cased suffix appended to the member's file stem.
    pub fn suffix(&self) -> &'static str {
        match self {
            DataFileKind::IdatRed => "_red.idat",
            DataFileKind::IdatGreen => "_grn.idat",
            DataFileKind::IdatRedMd5 => "_red.idat.md5sum",
            DataFileKind::IdatGreenMd5 => "_grn.idat.md5sum",
            DataFileKind::Vcf => ".vcf.gz",
            DataFileKind::VcfTbi => ".vcf.gz.tbi",
            DataFileKind::VcfMd5 => ".vcf.gz.md5sum",
            DataFileKind::HfVcf => ".hard-filtered.vcf.gz",
            DataFileKind::HfVcfTbi => ".hard-filtered.vcf.gz.tbi",
            DataFileKind::HfVcfMd5 => ".hard-filtered.vcf.gz.md5sum",
            DataFileKind::Cram => ".cram",
            DataFileKind::CramMd5 => ".cram.md5sum",
            DataFileKind::Crai => ".cram.crai",
        }
    }

    /// Files a genome center must deliver for one member of `genome_type`.
    pub fn expected_for(genome_type: GenomeType) -> &'static [DataFileKind] {
        match genome_type {
            GenomeType::Array => &[
                DataFileKind::Vcf,
                DataFileKind::VcfTbi,
                DataFileKind::VcfMd5,
                DataFileKind::IdatRed,
                DataFileKind::IdatGreen,
                DataFileKind::IdatRedMd5,
                DataFileKind::IdatGreenMd5,
            ],
            GenomeType::Wgs | GenomeType::Cvl => &[
                DataFileKind::HfVcf,
                DataFileKind::HfVcfTbi,
                DataFileKind::HfVcfMd5,
                DataFileKind::Vcf,
                DataFileKind::VcfTbi,
                DataFileKind::VcfMd5,
                DataFileKind::Cram,
                DataFileKind::Crai,
                DataFileKind::CramMd5,
            ],
        }
    }
}

/// Repository sex-at-birth codes mapped to the manifest vocabulary.
///
/// Returns the external value and whether the member must be flagged for
/// review (intersex and unmapped answers both go out as `NA`).
pub fn map_sex_at_birth(code: Option<&str>) -> (&'static str, bool) {
    match code {
        Some("SexAtBirth_Female") => ("F", false),
        Some("SexAtBirth_Male") => ("M", false),
        Some("SexAtBirth_Intersex") => ("NA", true),
        _ => ("NA", false),
    }
}

/// `Y`/`N` rendering used by every manifest flag column.
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Y"
    } else {
        "N"
    }
}

/// Inverse of [`yes_no`]; accepts the spellings partners actually send.
pub fn parse_yes_no(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" | "pass" => Some(true),
        "n" | "no" | "false" | "0" | "fail" => Some(false),
        _ => None,
    }
}
