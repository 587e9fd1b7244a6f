//! Content hashing for examples, datasets and operation histories.
//!
//! All hashes are lowercase hex SHA-256 digests, stable across processes and
//! platforms. Example identity covers text and spans only.

use crate::example::{Example, Span};
use crate::operation::OperationRecord;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct ExampleIdentity<'a> {
    text: &'a str,
    spans: &'a [Span],
}

/// Hash a single example's content (text + span annotations).
pub fn example_hash(example: &Example) -> String {
    let identity = ExampleIdentity {
        text: &example.text,
        spans: &example.spans,
    };
    // Serializing borrowed strings and integers cannot fail.
    let canonical = serde_json::to_vec(&identity).unwrap_or_default();
    hash_bytes(&canonical)
}

/// Hash an ordered example list. This is the dataset's commit id.
pub fn dataset_hash(examples: &[Example]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((examples.len() as u64).to_le_bytes());
    for example in examples {
        hasher.update(example_hash(example).as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Hash chain over an operation history, seeded with the dataset name.
///
/// Any edit, insertion, removal or reordering of records changes the result.
pub fn lineage_hash(dataset_name: &str, operations: &[OperationRecord]) -> String {
    let mut current = hash_bytes(dataset_name.as_bytes());
    for record in operations {
        let record_json = serde_json::to_string(record).unwrap_or_default();
        current = hash_bytes(format!("{current}:{record_json}").as_bytes());
    }
    current
}

/// Compute SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Invocation;
    use chrono::Utc;

    fn sample() -> Vec<Example> {
        let text = "Apple is based in Cupertino";
        vec![
            Example::new(text).with_span(Span::over(text, 0, 5, "ORG").unwrap()),
            Example::new("nothing to see"),
        ]
    }

    #[test]
    fn test_example_hash_ignores_meta() {
        let plain = Example::new("hello");
        let tagged = Example::new("hello").with_meta("source", serde_json::json!("web"));
        assert_eq!(example_hash(&plain), example_hash(&tagged));
    }

    #[test]
    fn test_example_hash_sees_labels() {
        let text = "Apple";
        let org = Example::new(text).with_span(Span::over(text, 0, 5, "ORG").unwrap());
        let product = Example::new(text).with_span(Span::over(text, 0, 5, "PRODUCT").unwrap());
        assert_ne!(example_hash(&org), example_hash(&product));
    }

    #[test]
    fn test_dataset_hash_order_sensitive() {
        let examples = sample();
        let mut reversed = examples.clone();
        reversed.reverse();
        assert_ne!(dataset_hash(&examples), dataset_hash(&reversed));
    }

    #[test]
    fn test_empty_dataset_hash_is_stable() {
        assert_eq!(dataset_hash(&[]), dataset_hash(&Vec::new()));
        assert_eq!(dataset_hash(&[]).len(), 64);
    }

    #[test]
    fn test_lineage_hash_tracks_history() {
        let base = lineage_hash("ner", &[]);
        let record = OperationRecord::completed("dedup", Utc::now(), Invocation::new());
        let one = lineage_hash("ner", std::slice::from_ref(&record));
        assert_ne!(base, one);
        assert_ne!(one, lineage_hash("other", std::slice::from_ref(&record)));

        let mut edited = record.clone();
        edited.examples_removed = 7;
        assert_ne!(one, lineage_hash("ner", &[edited]));
    }
}
