//! Transcript merge and de-duplication.
//!
//! The merge keeps the first occurrence of every turn id and never reorders
//! turns that were already accepted. Display ordering (by creation time or
//! sequence) is left to the presentation layer.

use callwire_types::Turn;
use std::collections::HashSet;

/// Merges an incoming batch into an existing history.
///
/// The result is `existing ++ incoming` with every element whose id already
/// appeared earlier in that combined sequence removed. Applying the same
/// batch twice yields the same history as applying it once.
pub fn merge_turns(existing: &[Turn], incoming: &[Turn]) -> Vec<Turn> {
    let mut seen = HashSet::with_capacity(existing.len() + incoming.len());
    existing
        .iter()
        .chain(incoming)
        .filter(|turn| seen.insert(turn.id.as_str()))
        .cloned()
        .collect()
}

/// Returns the turns of `incoming` whose ids are not in `seen`, in batch
/// order, recording each accepted id in `seen`.
///
/// This is the incremental form of [`merge_turns`]: for a history whose ids
/// are exactly `seen`, `history ++ take_unseen(seen, incoming)` equals
/// `merge_turns(history, incoming)`.
pub fn take_unseen(seen: &mut HashSet<String>, incoming: Vec<Turn>) -> Vec<Turn> {
    incoming
        .into_iter()
        .filter(|turn| seen.insert(turn.id.clone()))
        .collect()
}
