use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use loadorder_core::constants::CONFIG_FILE;
use loadorder_core::{Extension, ExtensionRegistry, LoadingOrder, LoadorderConfig};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod styles;

use styles as s;

/// The command-line interface for Loadorder.
#[derive(Debug, Parser)]
#[command(name = "loadorder")]
#[command(version)]
#[command(styles = s::get_clap_styles())]
#[command(
    help_template = "{bin} {version}\n\n{about-with-newline}{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
#[command(about = "Resolve the loading order of plugin extensions")]
#[command(
    long_about = "Loadorder reads extension declarations from loadorder.toml and resolves
the FIRST, LAST, BEFORE <id> and AFTER <id> constraints of every extension
point into a single deterministic order, or reports the two declarations
that contradict each other."
)]
#[command(
    after_help = "\x1b[1;32mExamples:\x1b[0m\n  \x1b[36mloadorder sort editor.formatters\x1b[0m   \x1b[2m# Print the resolved order of one point\x1b[0m\n  \x1b[36mloadorder check\x1b[0m                    \x1b[2m# Verify every point can be ordered\x1b[0m\n  \x1b[36mloadorder parse \"FIRST, AFTER x\"\x1b[0m    \x1b[2m# Show how an order attribute is read\x1b[0m"
)]
pub(crate) struct Cli {
    /// Path to the extension declarations.
    #[arg(long, default_value = CONFIG_FILE)]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print the resolved order of one extension point.
    Sort {
        /// Extension point name, for example `editor.formatters`.
        point: String,
        /// Print extension descriptors as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Resolve every extension point and report the first conflict.
    Check,
    /// Show the normalized form of an order attribute.
    Parse {
        /// Order attribute, for example `"BEFORE x, AFTER y"`.
        spec: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    debug!("parsed cli arguments: {:?}", cli);

    let stdout = io::stdout();
    execute(&cli, &mut stdout.lock())
}

/// Executes a parsed command, writing its report to `out`.
fn execute(cli: &Cli, out: &mut impl Write) -> Result<()> {
    match &cli.command {
        Command::Parse { spec } => print_order(&LoadingOrder::parse(spec)?, out),
        Command::Sort { point, json } => {
            let registry = load_registry(&cli.config)?;
            let ordered = registry
                .sorted(point)
                .with_context(|| format!("failed to order extension point '{point}'"))?;
            if *json {
                let descriptors = ordered.iter().map(|e| e.descriptor()).collect::<Vec<_>>();
                serde_json::to_writer_pretty(&mut *out, &descriptors)?;
                writeln!(out)?;
            } else {
                for extension in ordered {
                    print_extension(extension, out)?;
                }
            }
            Ok(())
        }
        Command::Check => {
            let registry = load_registry(&cli.config)?;
            let resolved = registry.sort_all()?;
            for (point, ordered) in &resolved {
                debug!("{} resolves {} extensions", point, ordered.len());
            }
            writeln!(out, "check passed ({} points)", resolved.len())?;
            Ok(())
        }
    }
}

fn load_registry(path: &str) -> Result<ExtensionRegistry> {
    let cfg = LoadorderConfig::load_from_file(path)
        .with_context(|| format!("unable to load config '{path}'"))?;
    Ok(ExtensionRegistry::from_config(&cfg))
}

fn print_extension(extension: &Extension, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "{} {} [{}]",
        extension.plugin(),
        extension.id().unwrap_or("-"),
        extension.descriptor().order
    )?;
    Ok(())
}

fn print_order(order: &LoadingOrder, out: &mut impl Write) -> Result<()> {
    let join = |ids: &std::collections::BTreeSet<String>| {
        ids.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    };
    writeln!(out, "first: {}", order.is_first())?;
    writeln!(out, "last: {}", order.is_last())?;
    writeln!(out, "before: [{}]", join(order.before_ids()))?;
    writeln!(out, "after: [{}]", join(order.after_ids()))?;
    Ok(())
}
