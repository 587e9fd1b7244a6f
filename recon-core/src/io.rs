//! Reading and writing example data, plus the loading pipeline that
//! normalizes freshly read examples before they are hashed.

use crate::error::{ReconError, Result};
use crate::example::Example;
use crate::persistence;
use std::path::Path;

/// Turns a path into an ordered example list. Must be deterministic for
/// identical input files.
pub trait Loader {
    fn load(&self, path: &Path) -> Result<Vec<Example>>;
}

/// Writes an example list to a path.
pub trait Writer {
    fn write(&self, path: &Path, examples: &[Example]) -> Result<()>;
}

/// One example per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlLoader;

impl Loader for JsonlLoader {
    fn load(&self, path: &Path) -> Result<Vec<Example>> {
        Ok(persistence::read_jsonl(path)?)
    }
}

/// A single JSON array of examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn load(&self, path: &Path) -> Result<Vec<Example>> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlWriter;

impl Writer for JsonlWriter {
    fn write(&self, path: &Path, examples: &[Example]) -> Result<()> {
        persistence::atomic_write_jsonl(path, examples)?;
        Ok(())
    }
}

type StepFn = Box<dyn Fn(Vec<Example>) -> Vec<Example> + Send + Sync>;

/// Ordered, named preprocessing steps run on loaded examples.
#[derive(Default)]
pub struct LoadingPipeline {
    steps: Vec<(String, StepFn)>,
}

impl std::fmt::Debug for LoadingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingPipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

impl LoadingPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step<F>(mut self, name: &str, step: F) -> Self
    where
        F: Fn(Vec<Example>) -> Vec<Example> + Send + Sync + 'static,
    {
        self.steps.push((name.to_string(), Box::new(step)));
        self
    }

    /// Build a pipeline from built-in step names:
    /// `drop_empty`, `sort_spans`, `dedupe_spans`.
    pub fn from_names(names: &[String]) -> Result<Self> {
        let mut pipeline = Self::new();
        for name in names {
            pipeline = match name.as_str() {
                "drop_empty" => pipeline.add_step(name, drop_empty),
                "sort_spans" => pipeline.add_step(name, sort_spans),
                "dedupe_spans" => pipeline.add_step(name, dedupe_spans),
                other => {
                    return Err(ReconError::invalid_input(format!(
                        "unknown loading step '{other}'"
                    )));
                }
            };
        }
        Ok(pipeline)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&self, mut examples: Vec<Example>) -> Vec<Example> {
        for (name, step) in &self.steps {
            let before = examples.len();
            examples = step(examples);
            tracing::debug!(step = %name, before, after = examples.len(), "Loading step applied");
        }
        examples
    }
}

fn drop_empty(examples: Vec<Example>) -> Vec<Example> {
    examples
        .into_iter()
        .filter(|e| !e.text.trim().is_empty())
        .collect()
}

fn sort_spans(mut examples: Vec<Example>) -> Vec<Example> {
    for example in &mut examples {
        example
            .spans
            .sort_by(|a, b| (a.start, a.end, &a.label).cmp(&(b.start, b.end, &b.label)));
    }
    examples
}

fn dedupe_spans(mut examples: Vec<Example>) -> Vec<Example> {
    for example in &mut examples {
        let mut seen = std::collections::HashSet::new();
        example
            .spans
            .retain(|s| seen.insert((s.start, s.end, s.label.clone())));
    }
    examples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example::Span;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_writer_then_loader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.jsonl");
        let examples = vec![Example::new("a"), Example::new("b")];
        JsonlWriter.write(&path, &examples).unwrap();
        assert_eq!(JsonlLoader.load(&path).unwrap(), examples);
    }

    #[test]
    fn test_json_loader_reads_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"[{"text": "x"}, {"text": "y", "spans": []}]"#).unwrap();
        let examples = JsonLoader.load(&path).unwrap();
        assert_eq!(examples.len(), 2);
    }

    #[test]
    fn test_loader_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = JsonlLoader.load(&dir.path().join("nope.jsonl")).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
    }

    #[test]
    fn test_pipeline_from_names() {
        let text = "Berlin Berlin";
        let example = Example::new(text)
            .with_span(Span::over(text, 7, 13, "GPE").unwrap())
            .with_span(Span::over(text, 0, 6, "GPE").unwrap())
            .with_span(Span::over(text, 0, 6, "GPE").unwrap());
        let pipeline = LoadingPipeline::from_names(&[
            "drop_empty".to_string(),
            "dedupe_spans".to_string(),
            "sort_spans".to_string(),
        ])
        .unwrap();

        let out = pipeline.run(vec![example, Example::new("   ")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].spans.len(), 2);
        assert_eq!(out[0].spans[0].start, 0);
    }

    #[test]
    fn test_pipeline_rejects_unknown_step() {
        let err = LoadingPipeline::from_names(&["tokenize".to_string()]).unwrap_err();
        assert!(err.to_string().contains("tokenize"));
    }

    #[test]
    fn test_custom_step() {
        let pipeline = LoadingPipeline::new().add_step("lower", |examples: Vec<Example>| {
            examples
                .into_iter()
                .map(|mut e| {
                    e.text = e.text.to_lowercase();
                    e
                })
                .collect()
        });
        assert_eq!(pipeline.step_names(), vec!["lower"]);
        assert_eq!(pipeline.run(vec![Example::new("ABC")])[0].text, "abc");
    }
}
