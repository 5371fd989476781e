//! Approval tally: folds a command stream into the approver set.

use futures::{Stream, StreamExt};
use stage_client::{ClientResult, StageCommand};
use tracing::debug;

use crate::approvers::ApproverSet;

/// What happened to one approval command during a tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyEvent {
    /// The commander was new and has been counted.
    Accepted(String),
    /// The commander had already approved; not counted again.
    Duplicate(String),
}

/// Result of one tally pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyOutcome {
    /// Approver set after the pass (a superset of the starting set).
    pub approvers: ApproverSet,
    /// `approvers.len() >= min_approver_num`.
    pub quorum_met: bool,
    /// `"Approved by: a, b"`, or empty when nobody approved yet.
    pub display: String,
    /// Per-command decisions, in consumption order.
    pub events: Vec<TallyEvent>,
    /// Ids of the approval commands consumed, counted or not.
    pub handled: Vec<String>,
}

impl TallyOutcome {
    /// Commanders counted during this pass.
    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            TallyEvent::Accepted(u) => Some(u.as_str()),
            TallyEvent::Duplicate(_) => None,
        })
    }

    /// Approvals still missing for `min_approver_num`.
    pub fn remaining(&self, min_approver_num: usize) -> usize {
        min_approver_num.saturating_sub(self.approvers.len())
    }
}

/// Tally approval commands against `approved`.
///
/// Commands are consumed in delivery order until the quorum is met; the rest
/// of the stream is left unread. A replayed command whose commander is
/// already in `approved` only counts as a duplicate. Commands that are not approvals are skipped,
/// whatever filter the host applied.
///
/// A stream element error aborts the pass: the error is returned and nothing
/// from the pass is kept.
pub async fn tally<S>(
    min_approver_num: usize,
    mut commands: S,
    approved: &ApproverSet,
) -> ClientResult<TallyOutcome>
where
    S: Stream<Item = ClientResult<StageCommand>> + Unpin,
{
    let mut approvers = approved.clone();
    let mut events = Vec::new();
    let mut handled = Vec::new();

    while approvers.len() < min_approver_num {
        let Some(item) = commands.next().await else {
            break;
        };
        let command = item?;
        if !command.is_approval() {
            debug!(
                command_id = %command.id,
                kind = %command.kind,
                "skipping non-approval command"
            );
            continue;
        }
        handled.push(command.id);
        if approvers.insert(command.commander.as_str()) {
            events.push(TallyEvent::Accepted(command.commander));
        } else {
            events.push(TallyEvent::Duplicate(command.commander));
        }
    }

    let quorum_met = approvers.len() >= min_approver_num;
    let display = approvers.display();
    Ok(TallyOutcome {
        approvers,
        quorum_met,
        display,
        events,
        handled,
    })
}
