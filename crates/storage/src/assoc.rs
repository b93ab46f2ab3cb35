//! Association diffing for copy-on-write updates.
//!
//! When a new version is appended, association rows present in the old
//! version but absent (or changed) in the draft are closed at the new
//! generation; unchanged rows stay open under their original row key. Rows
//! are never deleted.

use medley_core::{AssocRow, Generation, RecordId};

/// Reconcile the open rows of one association table against the desired
/// values of a new version.
///
/// Rows visible at `old_gen` whose value matches a desired value (first
/// match claims it) remain open. Unmatched open rows are closed at
/// `new_gen`; unmatched desired values become fresh rows effective at
/// `new_gen`.
pub(crate) fn reconcile<T: Clone + PartialEq>(
    rows: &mut Vec<AssocRow<T>>,
    owner: RecordId,
    old_gen: Generation,
    new_gen: Generation,
    desired: &[T],
) {
    let mut claimed = vec![false; desired.len()];

    for row in rows.iter_mut() {
        if !row.window.is_open() || !row.visible_at(old_gen) {
            continue;
        }
        let kept = desired
            .iter()
            .enumerate()
            .find(|(i, value)| !claimed[*i] && *value == &row.value);
        match kept {
            Some((i, _)) => claimed[i] = true,
            None => row.window.close(new_gen),
        }
    }

    for (i, value) in desired.iter().enumerate() {
        if !claimed[i] {
            rows.push(AssocRow::open(owner, new_gen, value.clone()));
        }
    }
}

/// The values of rows visible at the given generation, in row order.
pub(crate) fn visible_values<T: Clone>(rows: &[AssocRow<T>], at: Generation) -> Vec<T> {
    rows.iter()
        .filter(|r| r.visible_at(at))
        .map(|r| r.value.clone())
        .collect()
}
