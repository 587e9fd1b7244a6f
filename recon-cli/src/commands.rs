//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use recon_core::config::{load_config, workspace_config_path};
use recon_core::{
    Dataset, Example, LoadOptions, OperationRecord, OperationRegistry, OperationStatus,
    ReconConfig, SaveOptions, TransformationType,
};
use std::path::Path;

pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Status { path, name, save } => handle_status(&path, &name, save, workspace),
        Commands::Log { path, name } => handle_log(&path, &name, workspace),
        Commands::Show { path, name, index } => handle_show(&path, &name, index, workspace),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn config(workspace: &Path) -> anyhow::Result<ReconConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

/// The CLI has no transformations of its own, so nothing is ever replayed:
/// loading only reconciles the history against the data on disk.
fn load(path: &Path, name: &str, config: &ReconConfig) -> anyhow::Result<Dataset> {
    let options = LoadOptions::from_config(config)?;
    Ok(Dataset::load(name, path, &OperationRegistry::new(), &options)?)
}

fn handle_status(path: &Path, name: &str, save: bool, workspace: &Path) -> anyhow::Result<()> {
    let config = config(workspace)?;
    let dataset = load(path, name, &config)?;

    let pending = dataset
        .operations()
        .iter()
        .filter(|op| op.status == OperationStatus::NotStarted)
        .count();
    println!("Dataset: {}", dataset.name());
    println!("Examples: {}", dataset.len());
    println!("Commit: {}", dataset.commit_hash());
    println!("Operations: {} ({} pending)", dataset.operations().len(), pending);
    if let Some(last) = dataset.operations().last() {
        if last.name == recon_core::EXTERNAL_CHANGE_OPERATION {
            println!(
                "Changed outside recon since last save: +{} -{}",
                last.examples_added, last.examples_removed
            );
        }
    }

    if save {
        dataset.save(path, &SaveOptions::from_config(&config))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn handle_log(path: &Path, name: &str, workspace: &Path) -> anyhow::Result<()> {
    let config = config(workspace)?;
    let dataset = load(path, name, &config)?;

    if dataset.operations().is_empty() {
        println!("No operations recorded for '{}'.", dataset.name());
        return Ok(());
    }
    for (idx, op) in dataset.operations().iter().enumerate() {
        println!("{}", format_record(idx, op));
    }
    Ok(())
}

fn format_record(idx: usize, op: &OperationRecord) -> String {
    let status = match op.status {
        OperationStatus::Completed => "completed",
        OperationStatus::NotStarted => "not started",
    };
    format!(
        "{:>3}  {:<28} {:<12} {}  +{} -{} ~{}",
        idx,
        op.name,
        status,
        op.end_ts.format("%Y-%m-%d %H:%M:%S"),
        op.examples_added,
        op.examples_removed,
        op.examples_changed
    )
}

fn handle_show(path: &Path, name: &str, index: usize, workspace: &Path) -> anyhow::Result<()> {
    let config = config(workspace)?;
    let dataset = load(path, name, &config)?;
    let op = dataset.operations().get(index).ok_or_else(|| {
        anyhow::anyhow!(
            "No operation at index {} ({} recorded)",
            index,
            dataset.operations().len()
        )
    })?;

    println!("{}", format_record(index, op));
    if !op.invocation.args.is_empty() || !op.invocation.kwargs.is_empty() {
        println!("Args: {}", serde_json::to_string(&op.invocation)?);
    }
    if op.transformations.is_empty() {
        println!("No per-example changes recorded.");
        return Ok(());
    }

    let store = dataset.example_store();
    let describe = |hash: &Option<String>| -> String {
        match hash {
            Some(hash) => match store.get(hash) {
                Some(example) => summarize(example),
                None => format!("<{} not in store>", short(hash)),
            },
            None => "-".to_string(),
        }
    };
    for t in &op.transformations {
        match t.kind {
            TransformationType::ExampleAdded => println!("  + {}", describe(&t.example)),
            TransformationType::ExampleRemoved => println!("  - {}", describe(&t.prev_example)),
            TransformationType::ExampleChanged => {
                println!("  ~ {}", describe(&t.prev_example));
                println!("    → {}", describe(&t.example));
            }
        }
    }
    Ok(())
}

fn summarize(example: &Example) -> String {
    let text: String = example.text.chars().take(60).collect();
    let ellipsis = if example.text.chars().count() > 60 { "…" } else { "" };
    let spans: Vec<String> = example
        .spans
        .iter()
        .map(|s| format!("{}:{}", s.label, s.text))
        .collect();
    if spans.is_empty() {
        format!("{text}{ellipsis}")
    } else {
        format!("{text}{ellipsis} [{}]", spans.join(", "))
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&ReconConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = config(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
