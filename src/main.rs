//! nftdelta - print the nftables rules an application stack added
//!
//! # Usage
//!
//! ```bash
//! # Capture before and after the stack starts, then subtract
//! sudo nft list ruleset > global.nft
//! docker compose up -d
//! sudo nft list ruleset > complete.nft
//! nftdelta global.nft complete.nft > app.nft
//!
//! # Subtract from the live ruleset directly
//! nftdelta global.nft --capture -o /etc/nftables.d/app.nft
//!
//! # Review additions and removals
//! nftdelta global.nft complete.nft --format unified
//!
//! # Normalize a single capture
//! nftdelta --normalize complete.nft
//! ```
//!
//! Exit codes: 0 success, 1 parse/capture/output failure, 2 usage error.

use clap::Parser;
use nftdelta::config::{self, Config};
use nftdelta::core::capture::{Capture, capture_live_ruleset};
use nftdelta::core::diff::RulesetDiffer;
use nftdelta::core::error::{EXIT_SUCCESS, Error, NftablesErrorPattern, Result};
use nftdelta::core::normalize::NormalizeOptions;
use nftdelta::core::render::{self, OutputFormat, RenderOptions};
use nftdelta::utils::{self, STDIN_ARG};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "NFTDELTA_LOG";

#[derive(Parser)]
#[command(name = "nftdelta", version)]
#[command(about = "Print the nftables rules added on top of a baseline ruleset", long_about = None)]
struct Cli {
    /// Baseline and complete ruleset captures (`-` reads stdin)
    #[arg(value_name = "INPUTS")]
    inputs: Vec<String>,

    /// Use the live `nft list ruleset` as the last input
    #[arg(long)]
    capture: bool,

    /// Normalize a single capture instead of diffing two
    #[arg(long)]
    normalize: bool,

    /// Output format [default: nft, or `default_format` from the config]
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write atomically to PATH instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Do not infer missing `xt target "DNAT"` destinations
    #[arg(long)]
    no_infer_dnat: bool,

    /// Indent nft output with N spaces instead of a tab
    #[arg(long, value_name = "N")]
    indent: Option<usize>,

    /// Configuration file [default: ~/.config/nftdelta/config.json]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log to stderr: -v debug, -vv trace (NFTDELTA_LOG overrides)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn expected_inputs(&self) -> usize {
        if self.normalize { 1 } else { 2 }
    }

    fn provided_inputs(&self) -> usize {
        self.inputs.len() + usize::from(self.capture)
    }
}

/// Effective settings after merging CLI flags over the config file
struct Settings {
    format: OutputFormat,
    normalize: NormalizeOptions,
    render: RenderOptions,
    nft_command: Option<String>,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Self {
        let mut normalize = config.normalize_options();
        if cli.no_infer_dnat {
            normalize.infer_dnat_targets = false;
        }

        let mut render = config.render_options();
        if cli.indent.is_some() {
            render.indent_width = cli.indent;
        }

        Self {
            format: cli.format.unwrap_or(config.default_format),
            normalize,
            render,
            nft_command: config.nft_command.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            report_error(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Logs go to stderr; stdout carries the ruleset.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    validate_inputs(cli)?;

    let config = config::load_config(cli.config.as_deref())?;
    let settings = Settings::resolve(cli, &config);
    debug!(
        "Format {}, DNAT inference {}",
        settings.format, settings.normalize.infer_dnat_targets
    );

    let captures = gather_captures(cli, &settings)?;
    let text = if cli.normalize {
        normalize_capture(&captures, &settings)?
    } else {
        diff_captures(&captures, &settings)?
    };

    write_output(cli.output.as_deref(), &text)
}

/// Checks the argument counts before anything is read or captured.
fn validate_inputs(cli: &Cli) -> Result<()> {
    let expected = cli.expected_inputs();
    let provided = cli.provided_inputs();
    if provided != expected {
        let what = if cli.normalize {
            "exactly one capture to normalize"
        } else {
            "a baseline and a complete capture"
        };
        return Err(Error::Usage(format!(
            "expected {what}, got {provided} input(s)"
        )));
    }

    if cli.inputs.iter().filter(|arg| *arg == STDIN_ARG).count() > 1 {
        return Err(Error::Usage(
            "standard input ('-') can only be used for one input".to_string(),
        ));
    }

    Ok(())
}

fn gather_captures(cli: &Cli, settings: &Settings) -> Result<Vec<Capture>> {
    let mut captures = cli
        .inputs
        .iter()
        .map(|arg| utils::read_input(arg))
        .collect::<Result<Vec<_>>>()?;

    if cli.capture {
        captures.push(capture_live_ruleset(settings.nft_command.as_deref())?);
    }

    Ok(captures)
}

fn normalize_capture(captures: &[Capture], settings: &Settings) -> Result<String> {
    let [capture] = captures else {
        return Err(Error::Usage(format!(
            "expected exactly one capture to normalize, got {}",
            captures.len()
        )));
    };
    let document = capture.parse(&settings.normalize)?;

    match settings.format {
        OutputFormat::Nft => Ok(render::render_nft(&document, &settings.render)),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&document)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Unified => Err(Error::Usage(
            "the unified format compares two captures and cannot be used with --normalize"
                .to_string(),
        )),
    }
}

fn diff_captures(captures: &[Capture], settings: &Settings) -> Result<String> {
    let differ = RulesetDiffer::new(settings.normalize);

    if settings.format == OutputFormat::Unified {
        let [baseline, complete] = captures else {
            return Err(Error::Usage(format!(
                "expected a baseline and a complete capture, got {} input(s)",
                captures.len()
            )));
        };
        let baseline_doc = baseline.parse(&settings.normalize)?;
        let complete_doc = complete.parse(&settings.normalize)?;
        return Ok(render::render_unified(
            &baseline_doc,
            &complete_doc,
            (&baseline.name, &complete.name),
            &settings.render,
        ));
    }

    let outcome = differ.diff_captures(captures)?;
    info!(
        "{} new rule(s) in {} new block(s); {} rule(s) already in the baseline",
        outcome.summary.new_rules, outcome.summary.new_blocks, outcome.summary.unchanged_rules
    );

    match settings.format {
        OutputFormat::Json => render::render_json(&outcome),
        _ => Ok(render::render_nft(&outcome.document, &settings.render)),
    }
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    if let Some(path) = path {
        utils::write_atomic(path, text)?;
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn report_error(error: &Error) {
    eprintln!("Error: {error}");

    match error {
        Error::Usage(_) => {
            eprintln!("Usage: nftdelta [OPTIONS] <BASELINE> <COMPLETE>");
            eprintln!("       nftdelta [OPTIONS] <BASELINE> --capture");
            eprintln!("       nftdelta --normalize <CAPTURE>");
            eprintln!("Try 'nftdelta --help' for more information.");
        }
        Error::Nftables {
            message, stderr, ..
        } => {
            let translation =
                NftablesErrorPattern::match_error(stderr.as_deref().unwrap_or(message));
            eprintln!("{}", translation.user_message);
            for suggestion in &translation.suggestions {
                eprintln!("  - {suggestion}");
            }
            if let Some(url) = &translation.help_url {
                eprintln!("  See: {url}");
            }
        }
        _ => {}
    }
}
