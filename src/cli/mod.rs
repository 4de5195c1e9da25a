use clap::Parser;
use std::{num::NonZeroUsize, path::PathBuf};

pub mod handlers;

/// Builds the color-aware help template at runtime.
fn build_help_string() -> &'static str {
    // Replaces the semantic tags of the template with ANSI styles.
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let template = t!("cli.help.template");

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let formatted_string = template
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted_string.into_boxed_str())
}

/// yaml2cli: generates shell scripts from command line arguments organized in YAML.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
pub struct Cli {
    /// Modes to generate. Aliases expand to the modes they list.
    #[arg(value_name = "MODE", required_unless_present = "list")]
    pub modes: Vec<String>,

    /// YAML metadata file.
    #[arg(short = 'y', long, value_name = "FILE")]
    pub yaml: PathBuf,

    /// Output script. Defaults to stdout.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write one script per N commands into this directory (ignores --output).
    #[arg(short = 'd', long, value_name = "DIR")]
    pub outdir: Option<String>,

    /// Commands per script when --outdir is used.
    #[arg(short = 'N', value_name = "N")]
    pub per_script: Option<NonZeroUsize>,

    /// Script file stem in --outdir mode; the index and `.sh` are appended.
    #[arg(short = 'n', long, value_name = "NAME")]
    pub name: Option<String>,

    /// Zero-padding width of the script index.
    #[arg(short = 'D', long, value_name = "D")]
    pub digit: Option<usize>,

    /// Preamble prepended to every script. In --outdir mode `{0}` is the
    /// padded index and `{1}` the name.
    #[arg(short = 'p', long = "path", value_name = "FILE")]
    pub preamble: Option<PathBuf>,

    /// Branch (host) used to pick branch-keyed values.
    #[arg(short = 'H', long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Fail instead of warning when a value has no entry for the branch.
    #[arg(long)]
    pub strict: bool,

    /// Shell-quote arguments that need it.
    #[arg(long)]
    pub quote: bool,

    /// List the modes and aliases defined in the YAML file and exit.
    #[arg(long)]
    pub list: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_full_invocation() {
        let cli = Cli::try_parse_from([
            "yaml2cli", "-y", "meta.yml", "-d", "out", "-N", "3", "-n", "sim", "-D", "2", "-H", "cori",
            "--strict", "all",
        ])
        .unwrap();
        assert_eq!(cli.modes, vec!["all"]);
        assert_eq!(cli.yaml, PathBuf::from("meta.yml"));
        assert_eq!(cli.outdir.as_deref(), Some("out"));
        assert_eq!(cli.per_script.map(NonZeroUsize::get), Some(3));
        assert_eq!(cli.name.as_deref(), Some("sim"));
        assert_eq!(cli.digit, Some(2));
        assert_eq!(cli.branch.as_deref(), Some("cori"));
        assert!(cli.strict);
        assert!(!cli.list);
    }

    #[test]
    fn test_modes_are_required_unless_listing() {
        assert!(Cli::try_parse_from(["yaml2cli", "-y", "meta.yml"]).is_err());
        let cli = Cli::try_parse_from(["yaml2cli", "-y", "meta.yml", "--list"]).unwrap();
        assert!(cli.modes.is_empty());
    }

    #[test]
    fn test_zero_per_script_is_rejected() {
        assert!(Cli::try_parse_from(["yaml2cli", "-y", "m.yml", "-N", "0", "a"]).is_err());
    }
}
