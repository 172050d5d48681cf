use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use incidentscope::config::{AppConfig, LoggingConfig};
use incidentscope::detect::{AnalysisEngine, AnalysisReport};
use incidentscope::ingest::IngestRequest;
use incidentscope::storage::{self, IncidentStore};

#[derive(Parser)]
#[command(
    name = "incidentscope",
    about = "Incident anomaly detection and likely-cause ranking",
    version,
    long_about = None
)]
struct Cli {
    /// TOML config file (default: $INCIDENTSCOPE_CONFIG, then /etc/incidentscope/incidentscope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind address, overrides the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ingest metric samples and events from a JSON payload
    Ingest {
        /// Payload file, or `-` for stdin
        #[arg(long)]
        file: PathBuf,
    },

    /// Detect anomalies and rank likely causes for an incident
    Analyze {
        /// Incident ID
        incident_id: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List recent incidents
    Incidents {
        /// Maximum number of incidents to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    // Logs go to stderr; stdout carries command output.
    if cfg.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Resolve the config with a stderr subscriber installed for the duration,
/// since the real one depends on the result.
fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || AppConfig::resolve(explicit))
}

fn read_payload(file: &Path) -> Result<IngestRequest> {
    let raw = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read payload file: {}", file.display()))?
    };
    serde_json::from_str(&raw).context("payload is not a valid ingest request")
}

fn print_report(report: &AnalysisReport) {
    println!("\n=== Incident Analysis: {} ===", report.incident_id);

    println!("\nAnomalies ({}):", report.anomalies.len());
    if !report.anomalies.is_empty() {
        println!("{:<32} | {:<24} | {:>12} | {:>8}", "Timestamp", "Metric", "Value", "Z");
        println!("{:-<32}-|-{:-<24}-|-{:-<12}-|-{:-<8}", "", "", "", "");
        for a in &report.anomalies {
            println!(
                "{:<32} | {:<24} | {:>12.3} | {:>8.2}",
                a.ts.to_rfc3339(),
                a.metric_name,
                a.value,
                a.z_score
            );
        }
    }

    println!("\nLikely causes ({}):", report.likely_causes.len());
    for c in &report.likely_causes {
        println!("{:>6.3}  {} at {}", c.confidence, c.event_type, c.ts.to_rfc3339());
        for line in &c.evidence {
            println!("        - {}", line);
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or(config.server.bind);
            tracing::info!(%bind, "Starting incidentscope daemon");
            incidentscope::serve(&bind, &config.storage.db_path).await?;
        }
        Commands::Ingest { file } => {
            let req = read_payload(&file)?;
            req.validate()?;
            let store = IncidentStore::new(storage::open_pool(&config.storage.db_path)?);
            let resp = store.ingest(&req)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Analyze { incident_id, json } => {
            let store = IncidentStore::new(storage::open_pool(&config.storage.db_path)?);
            let engine = AnalysisEngine::new(store);
            let Some(report) = engine.analyze_incident(&incident_id).await? else {
                anyhow::bail!("Incident '{}' not found", incident_id);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Incidents { limit } => {
            let store = IncidentStore::new(storage::open_pool(&config.storage.db_path)?);
            let list = store.list_incidents(limit)?;
            if list.is_empty() {
                println!("No incidents found.");
            } else {
                println!(
                    "{:<36} | {:<20} | {:<10} | {:>7} | {:>6} | Created",
                    "ID", "Name", "Source", "Metrics", "Events"
                );
                println!("{:-<36}-|-{:-<20}-|-{:-<10}-|-{:-<7}-|-{:-<6}-|-{:-<25}", "", "", "", "", "", "");
                for s in list {
                    println!(
                        "{:<36} | {:<20} | {:<10} | {:>7} | {:>6} | {}",
                        s.incident.id,
                        s.incident.name.as_deref().unwrap_or("-"),
                        s.incident.source.as_deref().unwrap_or("-"),
                        s.metric_count,
                        s.event_count,
                        s.incident.created_at.to_rfc3339()
                    );
                }
            }
        }
    }

    Ok(())
}
