// ABOUTME: Audit queries over a resource's full revision history.
// ABOUTME: Answers which session ids ever touched a resource, independent of any session.

use crate::log::RevisionLog;
use crate::resolve::{self, ResolveError};

/// Every distinct session id in a resource's history, ascending.
///
/// Scans the full record sequence in revision order, so the result is
/// independent of any particular session's viewpoint. The ordering
/// invariant makes session ids strictly increasing, so the sequence is
/// ascending and distinct as scanned; a violation surfaces as an
/// integrity fault instead of a deduplicated guess.
pub fn session_ids_for<L: RevisionLog>(
    log: &L,
    entity_type: &str,
    natural_id: u64,
) -> Result<Vec<u64>, ResolveError> {
    let records = log.scan(entity_type, natural_id)?;
    resolve::verify_monotonic(&records)?;
    Ok(records.iter().map(|r| r.session_id).collect())
}
