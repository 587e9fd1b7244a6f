//! Annotated examples: the unit of data a dataset is made of.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A labeled character span inside an example's text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_end: Option<usize>,
}

impl Span {
    /// Build a span over `text[start..end]`.
    ///
    /// Offsets are byte offsets; out-of-range or non-boundary offsets are
    /// rejected rather than silently clamped.
    pub fn over(text: &str, start: usize, end: usize, label: &str) -> Option<Self> {
        let slice = text.get(start..end)?;
        Some(Self {
            text: slice.to_string(),
            start,
            end,
            label: label.to_string(),
            token_start: None,
            token_end: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub id: usize,
}

/// A single annotated example: text plus its span annotations.
///
/// Only `text` and `spans` define an example's identity for hashing; `tokens`
/// and `meta` are carried along but never change the content hash.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Token>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl Example {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    /// Labels present on this example, in span order, without duplicates.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for span in &self.spans {
            if !labels.contains(&span.label.as_str()) {
                labels.push(&span.label);
            }
        }
        labels
    }
}
