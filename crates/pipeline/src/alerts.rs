//! Alert kinds raised by jobs and routed by the dispatcher.

use genomic_core::GenomicSetMember;
use genomic_notify::AlertMember;

pub const MISSING_DATA: &str = "missing_data";
pub const FAILURE_MANIFEST: &str = "failure_manifest";
pub const CONTAMINATION: &str = "contamination";

pub fn member_line(member: &GenomicSetMember, detail: impl Into<String>) -> AlertMember {
    AlertMember {
        biobank_id: member.biobank_id.clone(),
        sample_id: member.sample_id.clone(),
        detail: detail.into(),
    }
}
