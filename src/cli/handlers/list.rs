// src/cli/handlers/list.rs

use crate::{
    cli::Cli,
    core::config_loader,
    models::{Document, ModeEntry},
};
use anyhow::{Context, Result};
use colored::*;

/// Prints the modes and aliases defined in the metadata file.
pub fn handle(cli: &Cli) -> Result<()> {
    let document = config_loader::load_file(&cli.yaml)
        .with_context(|| format!(t!("generate.error.load_yaml"), path = cli.yaml.display()))?;

    println!(
        "\n--- {} ---",
        format_args!(t!("list.info.header"), path = cli.yaml.display().to_string().yellow())
    );
    if document.is_empty() {
        println!("  {}", t!("list.info.empty").dimmed());
        return Ok(());
    }
    for line in describe(&document) {
        println!("  {}", line);
    }
    Ok(())
}

/// One line per top-level entry, in file order.
fn describe(document: &Document) -> Vec<String> {
    let width = document.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    document
        .iter()
        .map(|(name, entry)| {
            let detail = match entry {
                ModeEntry::Spec(spec) => format!("{} {}", spec.command.cyan(), describe_blocks(spec.option.len())),
                ModeEntry::Alias(members) => format!("{} {}", t!("list.label.alias").green(), members.join(", ")),
                ModeEntry::Malformed(_) => t!("list.label.not_a_mode").dimmed().to_string(),
            };
            format!("{}  {}", format!("{:<width$}", name, width = width).bold(), detail)
        })
        .collect()
}

fn describe_blocks(count: usize) -> String {
    format!(t!("list.label.blocks"), count = count).dimmed().to_string()
}
