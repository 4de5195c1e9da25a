// src/cli/handlers/generate.rs

use crate::{
    cli::Cli,
    constants::{DEFAULT_DIGIT, DEFAULT_NAME, DEFAULT_PER_SCRIPT},
    core::{assembler, config_loader},
    models::{BranchPolicy, RenderOptions},
    system::{
        settings::Settings,
        writer::{self, ChunkLayout},
    },
};
use anyhow::{Context, Result};
use colored::*;
use std::{fs, num::NonZeroUsize};

/// The main handler: loads the metadata, generates the commands of the
/// requested modes and writes them out.
pub fn handle(cli: &Cli, settings: &Settings) -> Result<()> {
    let opts = render_options(cli, settings);
    log::debug!("Render options: {:?}", opts);

    let document = config_loader::load_file(&cli.yaml)
        .with_context(|| format!(t!("generate.error.load_yaml"), path = cli.yaml.display()))?;

    let preamble = match &cli.preamble {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!(t!("generate.error.read_preamble"), path = path.display()))?,
        None => String::new(),
    };

    let commands = assembler::generate(&document, &cli.modes, &opts).context(t!("generate.error.generate"))?;

    if let Some(raw_outdir) = &cli.outdir {
        if cli.output.is_some() {
            log::warn!("{}", t!("generate.warning.output_ignored"));
        }
        let outdir = writer::expand_path(raw_outdir)?;
        let layout = chunk_layout(cli, settings);
        let written = writer::write_chunks(&outdir, &layout, &preamble, commands)
            .with_context(|| format!(t!("generate.error.write_dir"), path = outdir.display()))?;
        println!(
            "{} {}",
            t!("common.success").green(),
            format_args!(t!("generate.success.dir"), count = written.len(), path = outdir.display())
        );
        return Ok(());
    }

    match &cli.output {
        Some(path) => {
            let count = writer::write_file(path, &preamble, commands)
                .with_context(|| format!(t!("generate.error.write_file"), path = path.display()))?;
            println!(
                "{} {}",
                t!("common.success").green(),
                format_args!(t!("generate.success.file"), count = count, path = path.display())
            );
        }
        None => {
            writer::write_stdout(&preamble, commands).context(t!("generate.error.write_stdout"))?;
        }
    }
    Ok(())
}

/// Merges CLI flags with the user's defaults. Flags win.
pub fn render_options(cli: &Cli, settings: &Settings) -> RenderOptions {
    let defaults = &settings.defaults;
    let strict = cli.strict || defaults.strict.unwrap_or(false);
    RenderOptions {
        branch: cli.branch.clone().or_else(|| defaults.branch.clone()),
        policy: if strict { BranchPolicy::Strict } else { BranchPolicy::Skip },
        quote: cli.quote || defaults.quote.unwrap_or(false),
    }
}

pub fn chunk_layout(cli: &Cli, settings: &Settings) -> ChunkLayout {
    let defaults = &settings.defaults;
    let per_script = cli
        .per_script
        .or_else(|| defaults.per_script.and_then(NonZeroUsize::new))
        .or(NonZeroUsize::new(DEFAULT_PER_SCRIPT))
        .unwrap_or(NonZeroUsize::MIN);
    ChunkLayout {
        name: cli
            .name
            .clone()
            .or_else(|| defaults.name.clone())
            .unwrap_or_else(|| DEFAULT_NAME.to_string()),
        digit: cli.digit.or(defaults.digit).unwrap_or(DEFAULT_DIGIT),
        per_script,
    }
}
