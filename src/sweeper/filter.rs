//! Event Filter
//!
//! Pure eligibility rules. The indexer delivers newest-first; eligible
//! events are returned oldest-first so marks only ever move forward.

use rust_decimal::Decimal;

use super::types::{Account, CandidateEvent, ProgressState};
use crate::core_types::Timestamp;

/// Chain addresses compare case-insensitively (EIP-55 checksums are cosmetic)
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// An event is eligible iff it pays this account, is strictly newer than
/// the account's mark, is not settled and carries a positive amount.
pub fn eligible(
    event: &CandidateEvent,
    account: &Account,
    low_water: Timestamp,
    state: &ProgressState,
) -> bool {
    same_address(&event.recipient, &account.address)
        && event.observed_at > low_water
        && !state.is_settled(&event.tx_id)
        && event.amount > Decimal::ZERO
}

/// Filter and order one account's batch
///
/// Duplicate tx ids within a batch (indexers may report one tx per log)
/// are collapsed to the first occurrence.
pub fn select_eligible(
    account: &Account,
    events: Vec<CandidateEvent>,
    state: &ProgressState,
) -> Vec<CandidateEvent> {
    let low_water = state.low_water_of(account.user_id);

    let mut selected: Vec<CandidateEvent> = Vec::with_capacity(events.len());
    for event in events {
        if !eligible(&event, account, low_water, state) {
            continue;
        }
        if selected.iter().any(|e| e.tx_id == event.tx_id) {
            continue;
        }
        selected.push(event);
    }

    selected.sort_by(|a, b| {
        a.observed_at
            .cmp(&b.observed_at)
            .then_with(|| a.tx_id.cmp(&b.tx_id))
    });
    selected
}

/// Whether settling `event` may raise the mark to its timestamp
///
/// `unsettled` are the other events of the same batch that are not (yet)
/// settled: failures earlier in the batch and everything still queued. The
/// mark must stay strictly below all of them or they would be filtered out
/// forever.
pub fn may_advance_mark(event: &CandidateEvent, unsettled: &[CandidateEvent]) -> bool {
    unsettled
        .iter()
        .filter(|e| e.tx_id != event.tx_id)
        .all(|e| e.observed_at > event.observed_at)
}
