//! NetGuard CLI
//!
//! Offline analysis of captured packets.
//!
//! # Usage
//!
//! ```bash
//! netguard analyze --hex 45000028...
//! netguard analyze --hex 45000028... --identity com.example.app --block com.example.app
//! netguard replay capture.txt --format pretty
//! cat capture.txt | netguard replay -
//! netguard config > netguard.json
//! ```
//!
//! Without `--config` the origin probe is enabled for the `netguard` module;
//! a config file decides for itself via `integrity.enabled`.
//!
//! Replay files hold one packet per line, either `hex` or `identity,hex`.
//! Blank lines and `#` comments are skipped.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netguard_analyzer::{AnalyzerConfig, InMemoryRuleStore, IntegrityConfig, PacketAnalyzer};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod input;
mod output;

use output::OutputFormat;

/// Module name this binary ships under, checked by the origin probe
const ORIGIN_MODULE: &str = "netguard";

#[derive(Parser)]
#[command(name = "netguard")]
#[command(version)]
#[command(about = "NetGuard packet risk analyzer", long_about = None)]
struct Cli {
    /// Analyzer configuration (JSON)
    #[arg(long, short, env = "NETGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Block an identity in the rule store (repeatable)
    #[arg(long = "block", value_name = "IDENTITY")]
    blocked: Vec<String>,

    /// Output format
    #[arg(long, short, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single hex-encoded packet
    Analyze {
        /// Packet bytes as hex
        #[arg(long)]
        hex: String,
        /// Caller identity, e.g. an app package name
        #[arg(long)]
        identity: Option<String>,
    },
    /// Analyze every packet in a file (`-` for stdin)
    Replay { file: PathBuf },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => default_config(),
    };

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Analyze { hex, identity } => {
            let analyzer = build_analyzer(config, &cli.blocked)?;
            let bytes = input::decode_hex(&hex)?;
            let result = analyzer.analyze(&bytes, identity.as_deref());
            cli.format.print(&result.record())?;
        }
        Commands::Replay { file } => {
            let analyzer = build_analyzer(config, &cli.blocked)?;
            replay(&analyzer, &file, cli.format)?;
        }
    }

    Ok(())
}

fn default_config() -> AnalyzerConfig {
    AnalyzerConfig {
        integrity: IntegrityConfig::verify_origin(ORIGIN_MODULE),
        ..AnalyzerConfig::default()
    }
}

fn build_analyzer(config: AnalyzerConfig, blocked: &[String]) -> Result<PacketAnalyzer> {
    let rules = Arc::new(InMemoryRuleStore::new());
    for identity in blocked {
        rules.set_rule(identity, false);
    }

    let analyzer = PacketAnalyzer::new(config).context("invalid analyzer configuration")?;
    Ok(analyzer.with_rules(rules))
}

fn replay(analyzer: &PacketAnalyzer, file: &Path, format: OutputFormat) -> Result<()> {
    let reader: Box<dyn BufRead> = if file.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let handle = std::fs::File::open(file)
            .with_context(|| format!("opening {}", file.display()))?;
        Box::new(BufReader::new(handle))
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", index + 1))?;
        let Some(packet) = input::parse_line(&line)
            .with_context(|| format!("line {}", index + 1))?
        else {
            continue;
        };

        let result = analyzer.analyze(&packet.bytes, packet.identity.as_deref());
        format.print(&result.record())?;
    }

    let stats = analyzer.stats();
    tracing::info!(
        packets = stats.packets_analyzed,
        high_risk = stats.high_risk,
        blocked = stats.packets_blocked,
        violations = stats.integrity_violations,
        downgrades = stats.tls_downgrades,
        sessions = analyzer.tracked_sessions(),
        "Replay complete"
    );

    Ok(())
}
