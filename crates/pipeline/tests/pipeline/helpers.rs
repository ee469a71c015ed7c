use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use genomic_core::{
    BiobankStoredSample, DataFileKind, GenomeType, GenomicSetMember, GrorConsent, JobKind,
    ParticipantSummary, PipelineConfig,
};
use genomic_notify::{Dispatcher, Notifier, RecordingNotifier};
use genomic_pipeline::{JobController, JobOutcome, JobParams};
use genomic_registry::MemoryRegistry;
use genomic_storage::StorageGateway;

pub const GC_BUCKET: &str = "gc-rdr";
pub const AW1_ARRAY_FOLDER: &str = "AW1_genotyping_sample_manifests";
pub const AW1F_ARRAY_FOLDER: &str = "AW1F_genotyping_accessioning_results";
pub const AW2_ARRAY_FOLDER: &str = "AW2_genotyping_data_manifests";
pub const AW2_WGS_FOLDER: &str = "AW2_wgs_data_manifests";
pub const ARRAY_RAW_FOLDER: &str = "Genotyping_sample_raw_data";
pub const WGS_RAW_FOLDER: &str = "Wgs_sample_raw_data";

/// Fixed instant on the test calendar: May 2024, `day` at `hour`:00 UTC.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

// ── Harness ─────────────────────────────────────────────────────────

/// Controller over an in-memory registry and in-memory buckets, with every
/// alert captured by a recording channel.
pub struct Harness {
    pub registry: Arc<MemoryRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub controller: JobController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let storage = StorageGateway::in_memory(config.buckets.all());
        let notifier = Arc::new(RecordingNotifier::new("recording"));
        let channel: Arc<dyn Notifier> = notifier.clone();
        let controller = JobController::new(
            config,
            registry.clone(),
            storage,
            Dispatcher::with_defaults(vec![channel]),
        );
        Self {
            registry,
            notifier,
            controller,
        }
    }

    pub async fn put(&self, bucket: &str, path: &str, contents: impl Into<String>) {
        self.controller
            .storage()
            .write(bucket, path, contents.into().into_bytes())
            .await
            .unwrap();
    }

    pub async fn read(&self, bucket: &str, path: &str) -> String {
        self.controller.storage().read_to_string(bucket, path).await.unwrap()
    }

    pub async fn run(&self, kind: JobKind, as_of: DateTime<Utc>) -> JobOutcome {
        self.controller.run(kind, JobParams::at(as_of)).await.unwrap()
    }

    pub fn members(&self) -> Vec<GenomicSetMember> {
        self.registry.all_members().unwrap()
    }

    pub fn member(&self, biobank_id: &str, genome_type: GenomeType) -> GenomicSetMember {
        self.members()
            .into_iter()
            .find(|m| m.biobank_id == biobank_id && m.genome_type == genome_type)
            .unwrap_or_else(|| panic!("no {genome_type} member for {biobank_id}"))
    }

    /// A consented participant with one confirmed blood sample `tube_id`.
    pub fn enroll(&self, biobank_id: &str, tube_id: &str, modified: DateTime<Utc>) {
        self.registry.put_participant(participant(biobank_id, modified)).unwrap();
        self.registry
            .put_stored_sample(stored_sample(biobank_id, tube_id, "1ED04", modified))
            .unwrap();
    }

    /// Drop every raw data file of an array member except `skip`.
    pub async fn deliver_array_files(&self, chipwellbarcode: &str, skip: &[DataFileKind]) {
        for kind in DataFileKind::expected_for(GenomeType::Array) {
            if skip.contains(kind) {
                continue;
            }
            let path = format!("{ARRAY_RAW_FOLDER}/{chipwellbarcode}{}", kind.suffix());
            self.put(GC_BUCKET, &path, "data").await;
        }
    }

    pub async fn deliver_wgs_files(&self, stem: &str) {
        for kind in DataFileKind::expected_for(GenomeType::Wgs) {
            let path = format!("{WGS_RAW_FOLDER}/{stem}{}", kind.suffix());
            self.put(GC_BUCKET, &path, "data").await;
        }
    }
}

pub fn participant(biobank_id: &str, modified: DateTime<Utc>) -> ParticipantSummary {
    ParticipantSummary {
        participant_id: format!("P{biobank_id}"),
        biobank_id: biobank_id.to_string(),
        sex_at_birth: Some("SexAtBirth_Female".into()),
        state: Some("PIIState_MA".into()),
        ai_an: false,
        consent_for_study_enrollment: true,
        consent_for_genomics_ror: GrorConsent::Submitted,
        consent_for_genomics_ror_authored: Some(modified),
        withdrawn: false,
        withdrawal_authored: None,
        dna_sample_received: true,
        last_modified: modified,
    }
}

pub fn stored_sample(biobank_id: &str, id: &str, test: &str, confirmed: DateTime<Utc>) -> BiobankStoredSample {
    BiobankStoredSample {
        biobank_stored_sample_id: id.to_string(),
        biobank_id: biobank_id.to_string(),
        test: test.to_string(),
        confirmed: Some(confirmed),
        disposed: None,
        created: confirmed,
    }
}

// ── Manifest fixtures ───────────────────────────────────────────────

const GC_HEADER: &str = "Package Id,Biobankid Sampleid,Box Storageunit Id,Box Id Plate Id,Well Position,\
Sample Id,Parent Sample Id,Collection Tube Id,Biobank Id,Sex At Birth,NY State (Y/N),Sample Type,\
Treatments,Quantity (uL),Total Concentration (ng/uL),Total DNA(ng),Contact,Email,Study PI,Test Name,\
Failure Mode,Failure Mode Desc";

/// One row of a genome-center sample manifest.
pub struct GcRow<'a> {
    pub biobank_id: &'a str,
    pub tube_id: &'a str,
    pub sample_id: &'a str,
    pub test_name: &'a str,
    pub failure_mode: &'a str,
}

impl<'a> GcRow<'a> {
    pub fn array(biobank_id: &'a str, tube_id: &'a str, sample_id: &'a str) -> Self {
        Self {
            biobank_id,
            tube_id,
            sample_id,
            test_name: "aou_array",
            failure_mode: "",
        }
    }

    pub fn failed(mut self, mode: &'a str) -> Self {
        self.failure_mode = mode;
        self
    }
}

pub fn gc_manifest(rows: &[GcRow<'_>]) -> String {
    let mut out = format!("{GC_HEADER}\n");
    for r in rows {
        let desc = if r.failure_mode.is_empty() { "" } else { "sample damaged in transit" };
        out.push_str(&format!(
            "PKG-2101-123456,T{b}_{s},BX-1,PL-1,A01,{s},,{t},T{b},F,N,DNA,TE,40,60,2400,lab,lab@example.org,pi,{test},{mode},{desc}\n",
            b = r.biobank_id,
            s = r.sample_id,
            t = r.tube_id,
            test = r.test_name,
            mode = r.failure_mode,
        ));
    }
    out
}

/// One row of an array AW2 metrics manifest.
pub struct MetricsRow<'a> {
    pub biobank_id: &'a str,
    pub sample_id: &'a str,
    pub chipwellbarcode: &'a str,
    pub contamination: &'a str,
    pub status: &'a str,
}

impl<'a> MetricsRow<'a> {
    pub fn passing(biobank_id: &'a str, sample_id: &'a str, chipwellbarcode: &'a str) -> Self {
        Self {
            biobank_id,
            sample_id,
            chipwellbarcode,
            contamination: "0.002",
            status: "Pass",
        }
    }
}

pub fn aw2_array(rows: &[MetricsRow<'_>]) -> String {
    let mut out = String::from(
        "Biobank ID,Sample ID,BiobankIDSampleID,LimsID,Chipwellbarcode,Call Rate,Sex Concordance,Contamination,Processing Status,Notes\n",
    );
    for r in rows {
        out.push_str(&format!(
            "T{b},{s},T{b}_{s},LIMS-{s},{c},0.99,True,{cont},{status},\n",
            b = r.biobank_id,
            s = r.sample_id,
            c = r.chipwellbarcode,
            cont = r.contamination,
            status = r.status,
        ));
    }
    out
}

/// WGS metrics row: biobank id, sample id, lims id, contamination.
pub fn aw2_wgs(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut out = String::from(
        "Biobank ID,Sample ID,BiobankIDSampleID,LimsID,Mean Coverage,Genome Coverage,AouHDR Coverage,\
Contamination,Sex Concordance,Sex Ploidy,Aligned Q30 Bases,Array Concordance,Processing Status,Notes\n",
    );
    for (b, s, lims, cont) in rows {
        out.push_str(&format!(
            "T{b},{s},T{b}_{s},{lims},36.1,0.98,0.99,{cont},True,XX,1000000,True,Pass,\n"
        ));
    }
    out
}

/// Seed array members straight into the registry for generator tests.
pub async fn seed_member(
    harness: &Harness,
    biobank_id: &str,
    sample_id: &str,
    state: genomic_core::WorkflowState,
    when: DateTime<Utc>,
) -> GenomicSetMember {
    use genomic_registry::{Registry, UnitOfWork};

    let mut member = GenomicSetMember::new(biobank_id, GenomeType::Array, when);
    member.participant_id = Some(format!("P{biobank_id}"));
    member.sample_id = Some(sample_id.to_string());
    member.gc_site_id = Some("rdr".into());
    member.sex_at_birth = "F".into();
    member.set_state(state, when);
    let mut unit = UnitOfWork::new();
    unit.put_member(member.clone());
    harness.registry.commit(unit).await.unwrap();
    member
}

/// Two enrolled participants run through the new-participant workflow on
/// day 2, leaving an array and a WGS member each in AW0.
pub async fn two_new_participants(harness: &Harness) {
    harness.enroll("100000001", "TUBE-1", at(1, 0));
    harness.enroll("100000002", "TUBE-2", at(1, 0));
    harness.run(JobKind::NewParticipantWorkflow, at(2, 0)).await;
}

/// [`two_new_participants`] plus the array AW1 package on day 3.
pub async fn through_aw1(harness: &Harness) {
    two_new_participants(harness).await;
    harness
        .put(
            GC_BUCKET,
            &format!("{AW1_ARRAY_FOLDER}/RDR_AoU_GEN_PKG-2101-123456.csv"),
            gc_manifest(&[
                GcRow::array("100000001", "TUBE-1", "SMP-1"),
                GcRow::array("100000002", "TUBE-2", "SMP-2"),
            ]),
        )
        .await;
    harness.run(JobKind::Aw1Manifest, at(3, 0)).await;
}

/// [`through_aw1`] plus passing array metrics on day 4.
pub async fn through_metrics(harness: &Harness) {
    through_aw1(harness).await;
    harness
        .put(
            GC_BUCKET,
            &format!("{AW2_ARRAY_FOLDER}/RDR_AoU_GEN_DataManifest_1.csv"),
            aw2_array(&[
                MetricsRow::passing("100000001", "SMP-1", "CWB-1"),
                MetricsRow::passing("100000002", "SMP-2", "CWB-2"),
            ]),
        )
        .await;
    harness.run(JobKind::Aw2Metrics, at(4, 0)).await;
}
