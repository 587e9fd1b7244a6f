//! Per-example diffing between two example lists.

use crate::example::Example;
use crate::hashing::example_hash;
use crate::operation::{Invocation, OperationRecord, Transformation, TransformationType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Compute the per-example transformations that turn `before` into `after`.
///
/// Hashes are compared as multisets, so reordering alone yields no entries.
/// A removed and an added example with identical text are paired into a
/// single `EXAMPLE_CHANGED` entry (an annotation edit); everything else is a
/// plain removal or addition. Output order: changes, removals, additions,
/// each in list order.
pub fn diff_examples(before: &[Example], after: &[Example]) -> Vec<Transformation> {
    let before_hashed: Vec<(String, &Example)> =
        before.iter().map(|e| (example_hash(e), e)).collect();
    let after_hashed: Vec<(String, &Example)> =
        after.iter().map(|e| (example_hash(e), e)).collect();

    let removed = unmatched(&before_hashed, &after_hashed);
    let mut added = unmatched(&after_hashed, &before_hashed);

    let mut changed = Vec::new();
    let mut removed_only = Vec::new();
    for (old_hash, old) in removed {
        match added.iter().position(|(_, new)| new.text == old.text) {
            Some(idx) => {
                let (new_hash, _) = added.remove(idx);
                changed.push(Transformation::changed(old_hash, new_hash));
            }
            None => removed_only.push(Transformation::removed(old_hash)),
        }
    }

    changed
        .into_iter()
        .chain(removed_only)
        .chain(
            added
                .into_iter()
                .map(|(hash, _)| Transformation::added(hash)),
        )
        .collect()
}

/// Entries of `from` not accounted for by `against`, respecting multiplicity.
fn unmatched<'a>(
    from: &[(String, &'a Example)],
    against: &[(String, &'a Example)],
) -> Vec<(String, &'a Example)> {
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for (hash, _) in against {
        *remaining.entry(hash.as_str()).or_default() += 1;
    }
    let mut out = Vec::new();
    for (hash, example) in from {
        match remaining.get_mut(hash.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => out.push((hash.clone(), *example)),
        }
    }
    out
}

/// `EXAMPLE_CHANGED` entries for every position where the two lists differ.
///
/// Used when the multiset diff is empty but the lists are not equal: a pure
/// reorder, or edits confined to `meta` or `tokens`.
pub fn positional_changes(before: &[Example], after: &[Example]) -> Vec<Transformation> {
    before
        .iter()
        .zip(after)
        .filter(|(old, new)| old != new)
        .map(|(old, new)| Transformation::changed(example_hash(old), example_hash(new)))
        .collect()
}

/// Build a completed record whose counts come from diffing `before` and `after`.
///
/// Any difference between the lists is reported, so a reorder or a
/// meta-only edit still counts as changed data.
pub fn record_from_diff(
    name: &str,
    invocation: Invocation,
    start_ts: DateTime<Utc>,
    before: &[Example],
    after: &[Example],
) -> OperationRecord {
    let mut transformations = diff_examples(before, after);
    if transformations.is_empty() && before != after {
        transformations = positional_changes(before, after);
    }
    let count = |kind: TransformationType| {
        transformations
            .iter()
            .filter(|t| t.kind == kind)
            .count()
    };

    let mut record = OperationRecord::completed(name, start_ts, invocation);
    record.examples_added = count(TransformationType::ExampleAdded);
    record.examples_removed = count(TransformationType::ExampleRemoved);
    record.examples_changed = count(TransformationType::ExampleChanged);
    record.transformations = transformations;
    record
}
