//! Chronograph CLI - inspect and replay a temporal knowledge graph journal

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use chronograph_core::config::Config;
use chronograph_core::domain::graph::GraphSnapshot;
use chronograph_core::domain::index::Direction;
use chronograph_core::domain::versioning::{DataMap, SystemClock};
use chronograph_core::storage::{export_to_path, import_from_path};
use chronograph_core::{Error, TemporalService, parse_timestamp};

#[derive(Parser)]
#[command(name = "chronograph")]
#[command(author, version, about = "Temporal knowledge graph engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Journal file (defaults to storage.journal_path from config)
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a change to an element
    RecordElement {
        /// Element ID
        id: String,
        /// Element type (persona, skill, template, agent, memory, ensemble, working_memory)
        #[arg(short = 't', long = "type")]
        element_type: String,
        /// Element data as a JSON object
        #[arg(short, long, default_value = "{}")]
        data: String,
        /// Change type (create, update, delete)
        #[arg(short, long, default_value = "create")]
        change: String,
        #[arg(short, long, default_value = "cli")]
        author: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Record a change to a relationship
    RecordRelationship {
        /// Relationship ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        /// Relationship type
        #[arg(short = 't', long = "type")]
        relationship_type: Option<String>,
        #[arg(long)]
        confidence: Option<f64>,
        /// Exempt from decay
        #[arg(long)]
        critical: bool,
        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Change type (create, update, delete)
        #[arg(short, long, default_value = "create")]
        change: String,
        #[arg(short, long, default_value = "cli")]
        author: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Show an element's version history
    History {
        id: String,
        /// Inclusive lower bound (RFC3339)
        #[arg(long)]
        start: Option<String>,
        /// Inclusive upper bound (RFC3339)
        #[arg(long)]
        end: Option<String>,
    },

    /// Show a relationship's version history
    RelationHistory {
        id: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Include decayed confidence for each version
        #[arg(long)]
        decay: bool,
    },

    /// Print one element version's data as JSON
    ExportVersion { id: String, version: u64 },

    /// Reconstruct the graph as of a point in time
    GraphAt {
        /// Point in time (RFC3339)
        at: String,
        /// Apply confidence decay relative to that time
        #[arg(long)]
        decay: bool,
    },

    /// Current graph, dropping relationships whose decayed confidence is below a threshold
    Decayed {
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        threshold: f64,
    },

    /// Project a relationship's confidence to a future time
    Project {
        /// Relationship ID
        id: String,
        /// Future point in time (RFC3339), not before now
        at: String,
    },

    /// Relationships touching an element
    Related {
        element: String,
        /// forward, reverse or both
        #[arg(short, long, default_value = "both")]
        direction: String,
    },

    /// Version counts
    Stats,

    /// Relationship index statistics
    IndexStats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// List all configuration values
    Show,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chronograph=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Print an error with its code and suggestion when it came from the engine
fn report(e: &anyhow::Error) {
    match e.downcast_ref::<Error>() {
        Some(core) => {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", e),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;

    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, format),
        command => command,
    };

    let config = Config::load()?;
    let journal = match cli.journal {
        Some(path) => path,
        None => config.journal_path()?,
    };
    let service = open_service(&config, &journal).await?;

    match command {
        Commands::RecordElement {
            id,
            element_type,
            data,
            change,
            author,
            description,
        } => {
            let data = parse_object("--data", &data)?;
            let version = service
                .record_element_change(&id, &element_type, data, &author, &change, &description)
                .await?;
            save_journal(&service, &journal).await?;
            match format {
                OutputFormat::Json => print_json(&version)?,
                OutputFormat::Text => println!(
                    "Recorded {} v{} ({})",
                    version.entity_id, version.version, version.change_type
                ),
            }
        }

        Commands::RecordRelationship {
            id,
            from,
            to,
            relationship_type,
            confidence,
            critical,
            metadata,
            change,
            author,
            description,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let mut data = match metadata {
                Some(raw) => parse_object("--metadata", &raw)?,
                None => DataMap::new(),
            };
            if let Some(from) = from {
                data.insert("from".to_string(), Value::from(from));
            }
            if let Some(to) = to {
                data.insert("to".to_string(), Value::from(to));
            }
            if let Some(kind) = relationship_type {
                data.insert("type".to_string(), Value::from(kind));
            }
            if let Some(confidence) = confidence {
                data.insert("confidence".to_string(), Value::from(confidence));
            }
            if critical {
                data.insert("critical".to_string(), Value::Bool(true));
            }

            let version = service
                .record_relationship_change(&id, data, &author, &change, &description)
                .await?;
            save_journal(&service, &journal).await?;
            match format {
                OutputFormat::Json => print_json(&version)?,
                OutputFormat::Text => println!(
                    "Recorded {} v{} ({}): {} -[{}]-> {} confidence {:.3}",
                    version.entity_id,
                    version.version,
                    version.change_type,
                    version.data.from,
                    version.data.relationship_type,
                    version.data.to,
                    version.data.confidence
                ),
            }
        }

        Commands::History { id, start, end } => {
            let entries = service
                .get_element_history(&id, parse_bound(start)?, parse_bound(end)?)
                .await?;
            match format {
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Text => {
                    if entries.is_empty() {
                        println!("No versions of {} in that range.", id);
                    }
                    for entry in entries {
                        println!(
                            "v{}  {}  {}  {}  {}",
                            entry.version,
                            entry.timestamp.to_rfc3339(),
                            entry.author,
                            entry.change_type,
                            Value::Object(entry.changes)
                        );
                    }
                }
            }
        }

        Commands::RelationHistory {
            id,
            start,
            end,
            decay,
        } => {
            let entries = service
                .get_relationship_history(&id, parse_bound(start)?, parse_bound(end)?, decay)
                .await?;
            match format {
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Text => {
                    if entries.is_empty() {
                        println!("No versions of {} in that range.", id);
                    }
                    for entry in entries {
                        let decayed = entry
                            .decayed_confidence
                            .map(|c| format!(" -> {:.3}", c))
                            .unwrap_or_default();
                        println!(
                            "v{}  {}  {}  {}  confidence {:.3}{}",
                            entry.version,
                            entry.timestamp.to_rfc3339(),
                            entry.author,
                            entry.change_type,
                            entry.original_confidence,
                            decayed
                        );
                    }
                }
            }
        }

        Commands::ExportVersion { id, version } => {
            println!("{}", service.export_element_version(&id, version).await?);
        }

        Commands::GraphAt { at, decay } => {
            let at = parse_timestamp(&at)?;
            let snapshot = service.get_graph_at_time(at, decay).await?;
            match format {
                OutputFormat::Json => print_json(&snapshot)?,
                OutputFormat::Text => print_snapshot(&snapshot),
            }
        }

        Commands::Decayed { threshold } => {
            let graph = service
                .decayed_graph(threshold, &CancellationToken::new())
                .await?;
            match format {
                OutputFormat::Json => print_json(&graph)?,
                OutputFormat::Text => {
                    print_snapshot(&graph.snapshot);
                    println!(
                        "Threshold {:.3}: kept {} of {} relationships ({} filtered out)",
                        graph.threshold,
                        graph.snapshot.relationship_count(),
                        graph.total_relationships,
                        graph.filtered_out
                    );
                }
            }
        }

        Commands::Project { id, at } => {
            let at = parse_timestamp(&at)?;
            let outcome = service.project_relationship_confidence(&id, at).await?;
            let remaining = service.half_life_remaining(&id).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "relationship_id": id,
                    "at": at,
                    "original_confidence": outcome.original_confidence,
                    "projected_confidence": outcome.decayed_confidence,
                    "decay_percentage": outcome.decay_percentage(),
                    "half_life_remaining_hours": remaining.map(|d| d.num_minutes() as f64 / 60.0),
                }))?,
                OutputFormat::Text => {
                    println!(
                        "{} at {}: {:.3} -> {:.3} ({:.1}% decayed)",
                        id,
                        at.to_rfc3339(),
                        outcome.original_confidence,
                        outcome.decayed_confidence,
                        outcome.decay_percentage()
                    );
                    match remaining {
                        Some(left) => println!("Half-life remaining: {}h", left.num_hours()),
                        None => println!("Exempt from decay"),
                    }
                }
            }
        }

        Commands::Related { element, direction } => {
            let direction = Direction::parse(&direction).ok_or_else(|| {
                anyhow!(
                    "Invalid direction: {}. Valid options: forward, reverse, both",
                    direction
                )
            })?;
            let ids = service.related_relationships(&element, direction);
            match format {
                OutputFormat::Json => print_json(&ids)?,
                OutputFormat::Text => {
                    if ids.is_empty() {
                        println!("No {} relationships for {}.", direction, element);
                    }
                    for id in ids {
                        println!("{}", id);
                    }
                }
            }
        }

        Commands::Stats => {
            let stats = service.get_version_stats().await;
            match format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => {
                    println!("Tracked elements:        {}", stats.tracked_elements);
                    println!("Tracked relationships:   {}", stats.tracked_relationships);
                    println!("Element versions:        {}", stats.total_element_versions);
                    println!("Relationship versions:   {}", stats.total_relationship_versions);
                    println!("Total versions:          {}", stats.total_versions);
                    let decay = &stats.decay_stats;
                    println!(
                        "Confidence (high/medium/low): {}/{}/{}",
                        decay.high_confidence_count,
                        decay.medium_confidence_count,
                        decay.low_confidence_count
                    );
                    println!("Reinforced relationships: {}", decay.reinforced_relationships);
                }
            }
        }

        Commands::IndexStats => {
            let stats = service.index_stats();
            match format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => {
                    println!("Forward entries: {}", stats.forward_entries);
                    println!("Reverse entries: {}", stats.reverse_entries);
                    println!("Cache hits:      {}", stats.cache_hits);
                    println!("Cache misses:    {}", stats.cache_misses);
                    println!("Cache size:      {}", stats.cache_size);
                }
            }
        }

        Commands::Config { action } => cmd_config(action, format)?,
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn open_service(config: &Config, journal: &Path) -> anyhow::Result<TemporalService> {
    let store = import_from_path(journal, Arc::new(SystemClock))?;
    debug!(journal = %journal.display(), "Journal loaded");
    let service = TemporalService::open(Arc::new(store), config.service_options()?).await?;
    Ok(service)
}

async fn save_journal(service: &TemporalService, journal: &Path) -> anyhow::Result<()> {
    let result = export_to_path(service.version_store(), journal).await?;
    debug!(records = result.total_records(), "Journal saved");
    Ok(())
}

fn parse_object(flag: &str, raw: &str) -> anyhow::Result<DataMap> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{} must be valid JSON", flag))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("{} must be a JSON object", flag)),
    }
}

fn parse_bound(raw: Option<String>) -> anyhow::Result<Option<chrono::DateTime<chrono::Utc>>> {
    Ok(raw.as_deref().map(parse_timestamp).transpose()?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_snapshot(snapshot: &GraphSnapshot) {
    println!(
        "Graph at {}: {} elements, {} relationships",
        snapshot.timestamp.to_rfc3339(),
        snapshot.element_count(),
        snapshot.relationship_count()
    );
    for element in snapshot.elements.values() {
        println!(
            "  [{}] {} v{}",
            element.element_type, element.element_id, element.version
        );
    }
    for rel in snapshot.relationships.values() {
        let confidence = if snapshot.decay_applied {
            format!(
                "{:.3} (was {:.3})",
                rel.decayed_confidence, rel.original_confidence
            )
        } else {
            format!("{:.3}", rel.original_confidence)
        };
        println!(
            "  {} -[{}]-> {}  {}  ({})",
            rel.from, rel.relationship_type, rel.to, confidence, rel.relationship_id
        );
    }
}

fn cmd_config(action: ConfigAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            let items = config.list()?;
            match format {
                OutputFormat::Json => {
                    let map: serde_json::Map<String, Value> = items
                        .into_iter()
                        .map(|(key, value)| (key, Value::String(value)))
                        .collect();
                    print_json(&map)?;
                }
                OutputFormat::Text => {
                    for (key, value) in items {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::Reset => {
            Config::reset()?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
