//! Member workflow state machine.
//!
//! Every stage moves members through [`transition`]; there is no other way to
//! change a member's state. The table is the single source of truth for which
//! `(state, event)` pairs are legal, including the administrative failure
//! transitions that move a member backward.

use serde::{Deserialize, Serialize};

use crate::kinds::WorkflowState;
use crate::kinds::WorkflowState::*;

/// Something that happened to a member during a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowEvent {
    GcManifestIngested,
    GcFailureReported,
    FailureManifestIngested,
    MetricsIngested,
    MetricsFailed,
    DataMissing,
    ArrayDataReconciled,
    WgsDataReconciled,
    GemA1Sent,
    GemA2Accepted,
    GemA2Rejected,
    GemA3Sent,
    CvlW1Sent,
    CvlW2Ingested,
    CvlW3Sent,
    CvlAw1cIngested,
    CvlFailureManifestIngested,
    Aw3Sent,
    Aw4Ingested,
}

/// A `(state, event)` pair with no entry in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal workflow transition: {event:?} from {from}")]
pub struct IllegalTransition {
    pub from: WorkflowState,
    pub event: WorkflowEvent,
}

/// States in which a member has cleared reconciliation and may be exchanged
/// with the data-release partner.
const EXCHANGE_STATES: &[WorkflowState] = &[GemReady, A1, A2, CvlReady, W1, W2, W3, Aw1c];

/// One row of the transition table: legal source states and the target.
/// `None` as target keeps the member's current state (stamp-only events).
struct Rule {
    event: WorkflowEvent,
    from: &'static [WorkflowState],
    to: Option<WorkflowState>,
}

const TABLE: &[Rule] = &[
    Rule { event: WorkflowEvent::GcManifestIngested, from: &[Aw0, Aw1, Aw1fPre, Aw1fPost], to: Some(Aw1) },
    Rule { event: WorkflowEvent::GcFailureReported, from: &[Aw0, Aw1, Aw1fPre], to: Some(Aw1fPre) },
    Rule {
        event: WorkflowEvent::FailureManifestIngested,
        from: &[Aw1, Aw1fPre, Aw2, Aw2Missing, Aw2Fail],
        to: Some(Aw1fPost),
    },
    Rule { event: WorkflowEvent::MetricsIngested, from: &[Aw1, Aw2, Aw2Missing, Aw2Fail], to: Some(Aw2) },
    Rule { event: WorkflowEvent::MetricsFailed, from: &[Aw1, Aw2, Aw2Missing, Aw2Fail], to: Some(Aw2Fail) },
    Rule { event: WorkflowEvent::DataMissing, from: &[Aw2, Aw2Missing], to: Some(Aw2Missing) },
    Rule { event: WorkflowEvent::ArrayDataReconciled, from: &[Aw2, Aw2Missing], to: Some(GemReady) },
    Rule { event: WorkflowEvent::WgsDataReconciled, from: &[Aw2, Aw2Missing], to: Some(CvlReady) },
    Rule { event: WorkflowEvent::GemA1Sent, from: &[GemReady], to: Some(A1) },
    Rule { event: WorkflowEvent::GemA2Accepted, from: &[A1, A2], to: Some(A2) },
    Rule { event: WorkflowEvent::GemA2Rejected, from: &[A1, A2f], to: Some(A2f) },
    Rule { event: WorkflowEvent::GemA3Sent, from: &[A1, A2, A3], to: Some(A3) },
    Rule { event: WorkflowEvent::CvlW1Sent, from: &[CvlReady], to: Some(W1) },
    Rule { event: WorkflowEvent::CvlW2Ingested, from: &[W1, W2], to: Some(W2) },
    Rule { event: WorkflowEvent::CvlW3Sent, from: &[W2], to: Some(W3) },
    Rule { event: WorkflowEvent::CvlAw1cIngested, from: &[W3, Aw1c], to: Some(Aw1c) },
    Rule { event: WorkflowEvent::CvlFailureManifestIngested, from: &[W3, Aw1c], to: Some(Aw1cfPost) },
    Rule { event: WorkflowEvent::Aw3Sent, from: EXCHANGE_STATES, to: None },
    Rule { event: WorkflowEvent::Aw4Ingested, from: EXCHANGE_STATES, to: None },
];

/// Look up the state a member in `from` moves to when `event` happens.
pub fn transition(
    from: WorkflowState,
    event: WorkflowEvent,
) -> Result<WorkflowState, IllegalTransition> {
    TABLE
        .iter()
        .find(|rule| rule.event == event && rule.from.contains(&from))
        .map(|rule| rule.to.unwrap_or(from))
        .ok_or(IllegalTransition { from, event })
}

/// States from which `event` is legal, in table order.
pub fn sources_of(event: WorkflowEvent) -> &'static [WorkflowState] {
    TABLE
        .iter()
        .find(|rule| rule.event == event)
        .map(|rule| rule.from)
        .unwrap_or(&[])
}
