//! QC control samples.
//!
//! Rows whose biobank id falls in the reserved control range are kept as
//! members in `CONTROL_SAMPLE`, keyed by sample id, and never advanced.

use tracing::{debug, warn};

use genomic_core::{GenomicSetMember, PipelineError, WorkflowState};
use genomic_registry::UnitOfWork;

use super::FileScope;
use crate::context::JobContext;
use crate::table::Row;

pub(crate) async fn record_control_sample(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    row: &Row,
    biobank_id: &str,
) -> Result<(), PipelineError> {
    let Some(sample_id) = row.get("sample_id") else {
        warn!(file = %scope.file.file_name, biobank_id, "control row without sample id skipped");
        return Ok(());
    };

    let staged = unit
        .members
        .iter()
        .find(|m| m.workflow_state == WorkflowState::ControlSample && m.sample_id.as_deref() == Some(sample_id))
        .cloned();
    let existing = match staged {
        Some(member) => Some(member),
        None => ctx
            .registry
            .members_by_sample_id(sample_id)
            .await?
            .into_iter()
            .find(|m| m.workflow_state == WorkflowState::ControlSample),
    };

    let mut member = existing.unwrap_or_else(|| {
        let mut member = GenomicSetMember::new(biobank_id, scope.genome_type(), ctx.as_of);
        member.workflow_state = WorkflowState::ControlSample;
        member.sample_id = Some(sample_id.to_string());
        member
    });

    if let Some(site) = &scope.parts.site {
        member.gc_site_id = Some(site.clone());
    }
    if let Some(tube) = row.owned("collection_tube_id") {
        member.collection_tube_id = Some(tube);
    }
    if let Some(package) = row.owned("package_id") {
        member.package_id = Some(package);
    }
    member.modified = ctx.as_of;

    debug!(file = %scope.file.file_name, sample_id, "control sample recorded");
    unit.put_member(member);
    Ok(())
}
