//! Static registry of manifest contracts.
//!
//! Each [`ManifestKind`] maps to exactly one [`ManifestDescriptor`]: where the
//! file lives, which way it flows, its filename grammar and its column order.
//! Column names are stored in normalised form (see [`normalize_header`]).

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::PipelineError;
use crate::kinds::{GenomeType, ManifestKind};

/// Which side produces the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lab or partner → repository.
    Inbound,
    /// Repository → lab or partner.
    Outbound,
}

/// Bucket family a manifest is exchanged through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketRole {
    GenomicSet,
    GenomeCenter,
    Gem,
    Cvl,
    DrcBroad,
}

#[derive(Debug)]
pub struct ManifestDescriptor {
    pub kind: ManifestKind,
    pub direction: Direction,
    pub bucket: BucketRole,
    /// Subfolders scanned (inbound) or written to (outbound, first entry).
    pub folders: &'static [&'static str],
    /// Filename prefix of outbound files.
    pub file_prefix: &'static str,
    pub columns: &'static [&'static str],
    /// Whether the partner receives a tracked [`crate::GenomicManifestFile`].
    pub partner_facing: bool,
}

// ── Column lists ──────────────────────────────────────────────

const GC_MANIFEST_COLUMNS: &[&str] = &[
    "package_id",
    "biobankid_sampleid",
    "box_storageunit_id",
    "box_id_plate_id",
    "well_position",
    "sample_id",
    "parent_sample_id",
    "collection_tube_id",
    "biobank_id",
    "sex_at_birth",
    "ny_state_y_n",
    "sample_type",
    "treatments",
    "quantity_ul",
    "total_concentration_ng_ul",
    "total_dna_ng",
    "contact",
    "email",
    "study_pi",
    "test_name",
    "failure_mode",
    "failure_mode_desc",
];

const AW2_ARRAY_COLUMNS: &[&str] = &[
    "biobank_id",
    "sample_id",
    "biobankidsampleid",
    "limsid",
    "chipwellbarcode",
    "call_rate",
    "sex_concordance",
    "contamination",
    "processing_status",
    "notes",
];

const AW2_WGS_COLUMNS: &[&str] = &[
    "biobank_id",
    "sample_id",
    "biobankidsampleid",
    "limsid",
    "mean_coverage",
    "genome_coverage",
    "aouhdr_coverage",
    "contamination",
    "sex_concordance",
    "sex_ploidy",
    "aligned_q30_bases",
    "array_concordance",
    "processing_status",
    "notes",
];

const AW2F_COLUMNS: &[&str] = &[
    "package_id",
    "biobankid_sampleid",
    "box_storageunit_id",
    "box_id_plate_id",
    "well_position",
    "sample_id",
    "collection_tube_id",
    "biobank_id",
    "sex_at_birth",
    "ny_state_y_n",
    "sample_type",
    "test_name",
    "failure_mode",
    "failure_mode_desc",
    "processing_status",
    "contamination",
    "contamination_category",
    "consent_for_ror",
];

const NEW_PARTICIPANT_COLUMNS: &[&str] = &[
    "value",
    "biobank_id",
    "collection_tubeid",
    "sex_at_birth",
    "genome_type",
    "ny_flag",
    "ai_an",
    "validation_passed",
];

const CVL_REQUEST_COLUMNS: &[&str] = &[
    "value",
    "biobank_id",
    "sample_id",
    "sex_at_birth",
    "genome_type",
    "ny_flag",
    "ai_an",
    "validation_passed",
];

const CVL_W2_COLUMNS: &[&str] = &[
    "biobank_id",
    "sample_id",
    "sex_at_birth",
    "ny_flag",
    "site_id",
    "secondary_validation",
    "date_submitted",
    "test_name",
];

const GEM_A1_COLUMNS: &[&str] = &[
    "biobank_id",
    "sample_id",
    "sex_at_birth",
    "consent_for_ror",
    "date_of_consent_for_ror",
    "chipwellbarcode",
    "genome_center",
];

const GEM_A2_COLUMNS: &[&str] = &["biobank_id", "sample_id", "success", "date_of_import"];

const GEM_A3_COLUMNS: &[&str] = &["biobank_id", "sample_id", "date_of_consent_removal"];

const AW3_ARRAY_COLUMNS: &[&str] = &[
    "chipwellbarcode",
    "biobank_id",
    "sample_id",
    "sex_at_birth",
    "site_id",
    "red_idat_path",
    "red_idat_md5_path",
    "green_idat_path",
    "green_idat_md5_path",
    "vcf_path",
    "vcf_index_path",
    "vcf_md5_path",
    "callrate",
    "sex_concordance",
    "contamination",
    "processing_status",
    "research_id",
];

const AW3_WGS_COLUMNS: &[&str] = &[
    "biobank_id",
    "sample_id",
    "biobankidsampleid",
    "sex_at_birth",
    "site_id",
    "vcf_hf_path",
    "vcf_hf_index_path",
    "vcf_hf_md5_path",
    "vcf_raw_path",
    "vcf_raw_index_path",
    "vcf_raw_md5_path",
    "cram_path",
    "cram_md5_path",
    "crai_path",
    "contamination",
    "sex_concordance",
    "processing_status",
    "mean_coverage",
    "research_id",
];

const AW4_COLUMNS: &[&str] = &[
    "biobank_id",
    "sample_id",
    "site_id",
    "research_id",
    "qc_status",
    "fingerprint_path",
];

// ── Descriptors ───────────────────────────────────────────────

const fn inbound(
    kind: ManifestKind,
    bucket: BucketRole,
    folders: &'static [&'static str],
    columns: &'static [&'static str],
) -> ManifestDescriptor {
    ManifestDescriptor {
        kind,
        direction: Direction::Inbound,
        bucket,
        folders,
        file_prefix: "",
        columns,
        partner_facing: false,
    }
}

const fn outbound(
    kind: ManifestKind,
    bucket: BucketRole,
    folder: &'static [&'static str],
    file_prefix: &'static str,
    columns: &'static [&'static str],
) -> ManifestDescriptor {
    ManifestDescriptor {
        kind,
        direction: Direction::Outbound,
        bucket,
        folders: folder,
        file_prefix,
        columns,
        partner_facing: true,
    }
}

static DESCRIPTORS: &[ManifestDescriptor] = &[
    outbound(
        ManifestKind::NewParticipant,
        BucketRole::GenomicSet,
        &["genomic_samples_manifests"],
        "Genomic-Manifest-AoU",
        NEW_PARTICIPANT_COLUMNS,
    ),
    inbound(
        ManifestKind::Aw1,
        BucketRole::GenomeCenter,
        &["AW1_genotyping_sample_manifests", "AW1_wgs_sample_manifests"],
        GC_MANIFEST_COLUMNS,
    ),
    inbound(
        ManifestKind::Aw1f,
        BucketRole::GenomeCenter,
        &["AW1F_genotyping_accessioning_results", "AW1F_wgs_accessioning_results"],
        GC_MANIFEST_COLUMNS,
    ),
    inbound(
        ManifestKind::Aw2Array,
        BucketRole::GenomeCenter,
        &["AW2_genotyping_data_manifests"],
        AW2_ARRAY_COLUMNS,
    ),
    inbound(
        ManifestKind::Aw2Wgs,
        BucketRole::GenomeCenter,
        &["AW2_wgs_data_manifests"],
        AW2_WGS_COLUMNS,
    ),
    outbound(
        ManifestKind::Aw2f,
        BucketRole::GenomeCenter,
        &["AW2F_manifests"],
        "",
        AW2F_COLUMNS,
    ),
    outbound(
        ManifestKind::GemA1,
        BucketRole::Gem,
        &["A1_manifests"],
        "AoU_GEM_A1_manifest",
        GEM_A1_COLUMNS,
    ),
    inbound(ManifestKind::GemA2, BucketRole::Gem, &["A2_manifests"], GEM_A2_COLUMNS),
    outbound(
        ManifestKind::GemA3,
        BucketRole::Gem,
        &["A3_manifests"],
        "AoU_GEM_A3_manifest",
        GEM_A3_COLUMNS,
    ),
    outbound(
        ManifestKind::CvlW1,
        BucketRole::Cvl,
        &["W1_manifests"],
        "AoU_CVL_W1",
        CVL_REQUEST_COLUMNS,
    ),
    inbound(ManifestKind::CvlW2, BucketRole::Cvl, &["W2_manifests"], CVL_W2_COLUMNS),
    outbound(
        ManifestKind::CvlW3,
        BucketRole::Cvl,
        &["W3_manifests"],
        "AoU_CVL_W3",
        CVL_REQUEST_COLUMNS,
    ),
    inbound(ManifestKind::Aw1c, BucketRole::Cvl, &["AW1C_manifests"], GC_MANIFEST_COLUMNS),
    inbound(ManifestKind::Aw1cf, BucketRole::Cvl, &["AW1CF_manifests"], GC_MANIFEST_COLUMNS),
    outbound(
        ManifestKind::Aw3Array,
        BucketRole::DrcBroad,
        &["AW3_array_manifest"],
        "AoU_DRCV_GEN",
        AW3_ARRAY_COLUMNS,
    ),
    outbound(
        ManifestKind::Aw3Wgs,
        BucketRole::DrcBroad,
        &["AW3_wgs_manifest"],
        "AoU_DRCV_SEQ",
        AW3_WGS_COLUMNS,
    ),
    inbound(ManifestKind::Aw4Array, BucketRole::DrcBroad, &["AW4_array_manifest"], AW4_COLUMNS),
    inbound(ManifestKind::Aw4Wgs, BucketRole::DrcBroad, &["AW4_wgs_manifest"], AW4_COLUMNS),
];

impl ManifestKind {
    pub fn descriptor(&self) -> &'static ManifestDescriptor {
        DESCRIPTORS
            .iter()
            .find(|d| d.kind == *self)
            .unwrap_or_else(|| unreachable!("every manifest kind has a descriptor"))
    }

    /// Anchored filename grammar of an inbound kind.
    fn grammar(&self) -> Option<&'static Regex> {
        match self {
            ManifestKind::Aw1 => Some(&AW1_GRAMMAR),
            ManifestKind::Aw1f => Some(&AW1F_GRAMMAR),
            ManifestKind::Aw2Array => Some(&AW2_ARRAY_GRAMMAR),
            ManifestKind::Aw2Wgs => Some(&AW2_WGS_GRAMMAR),
            ManifestKind::GemA2 => Some(&GEM_A2_GRAMMAR),
            ManifestKind::CvlW2 => Some(&CVL_W2_GRAMMAR),
            ManifestKind::Aw1c => Some(&AW1C_GRAMMAR),
            ManifestKind::Aw1cf => Some(&AW1CF_GRAMMAR),
            ManifestKind::Aw4Array => Some(&AW4_ARRAY_GRAMMAR),
            ManifestKind::Aw4Wgs => Some(&AW4_WGS_GRAMMAR),
            _ => None,
        }
    }
}

// ── Filename grammar ──────────────────────────────────────────

const PACKAGE: &str = r"(?:TestDataManifest|PKG-\d+(?:-\d+)*)(?:_\d+)?(?:_[a-z0-9]+)?";

fn compile(pattern: String) -> Regex {
    Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid manifest grammar {pattern}: {e}"))
}

static AW1_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(r"^(?P<site>[A-Za-z]+)_AoU_(?P<gc>GEN|SEQ)_{PACKAGE}\.csv$"))
});
static AW1F_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(r"^(?P<site>[A-Za-z]+)_AoU_(?P<gc>GEN|SEQ)_{PACKAGE}_FAILURE\.csv$"))
});
static AW2_ARRAY_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^(?P<site>[A-Za-z]+)_AoU_(?P<gc>GEN)_DataManifest(?:_\d+)?(?:_[a-z0-9]+)?\.csv$".into())
});
static AW2_WGS_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^(?P<site>[A-Za-z]+)_AoU_(?P<gc>SEQ)_DataManifest(?:_\d+)?(?:_[a-z0-9]+)?\.csv$".into())
});
static GEM_A2_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^AoU_GEM_A2_manifest(?:_[0-9-]+)?\.csv$".into()));
static CVL_W2_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(?P<site>[A-Za-z]+)_AoU_CVL_W2(?:_[0-9-]+)?\.csv$".into()));
static AW1C_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"^(?P<site>[A-Za-z]+)_AoU_CVL_{PACKAGE}\.csv$")));
static AW1CF_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"^(?P<site>[A-Za-z]+)_AoU_CVL_{PACKAGE}_FAILURE\.csv$")));
static AW4_ARRAY_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^AoU_DRCB_(?P<gc>GEN)(?:_[0-9-]+)?\.csv$".into()));
static AW4_WGS_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^AoU_DRCB_(?P<gc>SEQ)(?:_[0-9-]+)?\.csv$".into()));

/// What a valid inbound filename tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameParts {
    /// Genome-center site id, lower-cased.
    pub site: Option<String>,
    pub genome_type: Option<GenomeType>,
}

/// Last path segment of an object path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Check `path`'s file name against the grammar of `kind`.
pub fn parse_file_name(kind: ManifestKind, path: &str) -> Result<FileNameParts, PipelineError> {
    let name = file_name_of(path);
    let grammar = kind.grammar().ok_or_else(|| PipelineError::InvalidFilename {
        file: name.to_string(),
        reason: format!("{kind} is not an inbound manifest"),
    })?;
    let caps = grammar
        .captures(name)
        .ok_or_else(|| PipelineError::InvalidFilename {
            file: name.to_string(),
            reason: format!("does not match the {kind} naming convention"),
        })?;

    let site = caps.name("site").map(|m| m.as_str().to_lowercase());
    let genome_type = match kind {
        ManifestKind::Aw1c | ManifestKind::Aw1cf | ManifestKind::CvlW2 => Some(GenomeType::Wgs),
        _ => caps.name("gc").and_then(|m| GenomeType::from_gc_token(m.as_str())),
    };
    Ok(FileNameParts { site, genome_type })
}

/// Deterministic timestamped name for an outbound manifest.
pub fn outbound_file_name(kind: ManifestKind, as_of: DateTime<Utc>) -> String {
    format!(
        "{}_{}.csv",
        kind.descriptor().file_prefix,
        as_of.format("%Y-%m-%d-%H-%M-%S")
    )
}

/// Lower-case a CSV header and collapse every run of non-alphanumerics to `_`.
///
/// `Total DNA(ng)` → `total_dna_ng`, `ny_state_(y/n)` → `ny_state_y_n`.
pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_sep = false;
    for c in header.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Required columns of `kind` absent from a normalised header.
pub fn missing_columns(kind: ManifestKind, header: &[String]) -> Vec<&'static str> {
    kind.descriptor()
        .columns
        .iter()
        .copied()
        .filter(|col| !header.iter().any(|h| h == col))
        .collect()
}
