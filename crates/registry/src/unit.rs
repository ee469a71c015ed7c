use genomic_core::{
    GcValidationMetrics, GenomicFileProcessed, GenomicManifestFeedback, GenomicManifestFile,
    GenomicSampleContamination, GenomicSet, GenomicSetMember,
};
use uuid::Uuid;

/// Registry writes that must land together or not at all.
///
/// Everything a job does for one file or one generated manifest is staged
/// here and applied by [`crate::Registry::commit`]. Staging the same id twice
/// keeps the last version.
#[derive(Debug, Default, Clone)]
pub struct UnitOfWork {
    pub sets: Vec<GenomicSet>,
    pub members: Vec<GenomicSetMember>,
    pub files: Vec<GenomicFileProcessed>,
    pub manifests: Vec<GenomicManifestFile>,
    pub feedback: Vec<GenomicManifestFeedback>,
    pub metrics: Vec<GcValidationMetrics>,
    pub contamination: Vec<GenomicSampleContamination>,
}

fn upsert<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> Uuid) {
    let key = id(&item);
    match items.iter_mut().find(|existing| id(existing) == key) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_set(&mut self, set: GenomicSet) {
        upsert(&mut self.sets, set, |s| s.id);
    }

    pub fn put_member(&mut self, member: GenomicSetMember) {
        upsert(&mut self.members, member, |m| m.id);
    }

    pub fn put_file(&mut self, file: GenomicFileProcessed) {
        upsert(&mut self.files, file, |f| f.id);
    }

    pub fn put_manifest(&mut self, manifest: GenomicManifestFile) {
        upsert(&mut self.manifests, manifest, |m| m.id);
    }

    pub fn put_feedback(&mut self, feedback: GenomicManifestFeedback) {
        upsert(&mut self.feedback, feedback, |f| f.id);
    }

    pub fn put_metrics(&mut self, metrics: GcValidationMetrics) {
        upsert(&mut self.metrics, metrics, |m| m.id);
    }

    /// Contamination rows are append-only.
    pub fn append_contamination(&mut self, entry: GenomicSampleContamination) {
        self.contamination.push(entry);
    }

    /// Staged version of a member, if this unit already touched it.
    pub fn member(&self, id: Uuid) -> Option<&GenomicSetMember> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn feedback_for(&self, input_manifest_file_id: Uuid) -> Option<&GenomicManifestFeedback> {
        self.feedback
            .iter()
            .find(|f| f.input_manifest_file_id == input_manifest_file_id)
    }

    pub fn stages_contamination(&self, sample_id: &str) -> bool {
        self.contamination.iter().any(|c| c.sample_id == sample_id)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
            && self.members.is_empty()
            && self.files.is_empty()
            && self.manifests.is_empty()
            && self.feedback.is_empty()
            && self.metrics.is_empty()
            && self.contamination.is_empty()
    }
}
