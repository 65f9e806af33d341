// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Hub History CLI
//!
//! Command-line access to a history store: record values, list a Thing's
//! history, show its latest values and inspect retention rules.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use hubhistory_core::{parse_timestamp, HistoryConfig, StoredValue};
use hubhistory_service::HistoryService;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hubhistory")]
#[command(about = "Hub History - time-indexed Thing event store", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an event or action
    Add {
        /// Agent ID
        #[arg(long)]
        agent: String,

        /// Thing ID
        #[arg(long)]
        thing: String,

        /// Event or action name
        #[arg(long)]
        name: String,

        /// Value payload
        #[arg(long, default_value = "")]
        data: String,

        /// Creation time, defaults to now
        #[arg(long)]
        time: Option<String>,

        /// Record as an action instead of an event
        #[arg(long)]
        action: bool,
    },

    /// List the history of a Thing
    History {
        /// Agent ID
        #[arg(long)]
        agent: String,

        /// Thing ID
        #[arg(long)]
        thing: String,

        /// Only values with this name
        #[arg(long)]
        name: Option<String>,

        /// Start at this time instead of the oldest (or newest) value
        #[arg(long)]
        seek: Option<String>,

        /// Maximum number of values
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Newest first
        #[arg(long)]
        backward: bool,
    },

    /// Show the latest value of each name of a Thing
    Latest {
        /// Agent ID
        #[arg(long)]
        agent: String,

        /// Thing ID
        #[arg(long)]
        thing: String,

        /// Names to show, all when omitted
        names: Vec<String>,
    },

    /// List the configured retention rules
    Rules,

    /// Check whether a value would be retained
    Check {
        /// Agent ID
        #[arg(long)]
        agent: String,

        /// Thing ID
        #[arg(long)]
        thing: String,

        /// Event name
        #[arg(long)]
        name: String,
    },
}

/// Value as printed with `--json`.
#[derive(Serialize)]
struct ValueOutput {
    agent_id: String,
    thing_id: String,
    name: String,
    kind: &'static str,
    created: String,
    created_msec: i64,
    data: String,
}

impl From<&StoredValue> for ValueOutput {
    fn from(value: &StoredValue) -> Self {
        Self {
            agent_id: value.agent_id.clone(),
            thing_id: value.thing_id.clone(),
            name: value.name.clone(),
            kind: if value.is_action() { "action" } else { "event" },
            created: format_time(value.created_msec),
            created_msec: value.created_msec,
            data: value.data_lossy(),
        }
    }
}

fn format_time(msec: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(msec)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| msec.to_string())
}

fn print_values(values: &[StoredValue], json: bool) -> Result<()> {
    if json {
        let output: Vec<ValueOutput> = values.iter().map(ValueOutput::from).collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    if values.is_empty() {
        println!("No values");
        return Ok(());
    }
    for value in values {
        let marker = if value.is_action() { "action" } else { "event " };
        println!(
            "{}  {}  {:<20} {}",
            format_time(value.created_msec),
            marker,
            value.name,
            value.data_lossy()
        );
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "hubhistory=debug,hubhistory_core=debug,hubhistory_storage=debug,hubhistory_service=debug"
    } else {
        "hubhistory=info,hubhistory_core=warn,hubhistory_storage=warn,hubhistory_service=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read up to `limit` values of a Thing through a cursor.
fn read_history(
    svc: &HistoryService,
    agent: &str,
    thing: &str,
    name: Option<&str>,
    seek: Option<&str>,
    limit: usize,
    backward: bool,
) -> Result<Vec<StoredValue>> {
    let handle = svc.get_cursor(agent, thing, name)?;

    let start = match seek {
        Some(text) => {
            if parse_timestamp(text).is_none() {
                bail!("Unrecognised time '{}'", text);
            }
            svc.cursor_seek(&handle, text)?
        }
        None if backward => svc.cursor_last(&handle)?,
        None => svc.cursor_first(&handle)?,
    };

    let mut values = Vec::with_capacity(limit);
    if let Some(value) = start {
        if limit > 0 {
            values.push(value);
        }
        let rest = limit.saturating_sub(values.len());
        if rest > 0 {
            let (batch, _) = if backward {
                svc.cursor_prev_n(&handle, rest)?
            } else {
                svc.cursor_next_n(&handle, rest)?
            };
            values.extend(batch);
        }
    }
    svc.cursor_release(&handle)?;
    Ok(values)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config =
        HistoryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    debug!(backend = %config.storage.backend, data_dir = ?config.storage.data_dir, "Using store");

    let svc = HistoryService::new(config).context("Failed to open history store")?;

    match cli.command {
        Commands::Add {
            agent,
            thing,
            name,
            data,
            time,
            action,
        } => {
            let created_msec = match time {
                Some(text) => parse_timestamp(&text)
                    .with_context(|| format!("Unrecognised time '{}'", text))?,
                None => 0,
            };
            let value = if action {
                StoredValue::action(&agent, &thing, &name, data)
            } else {
                StoredValue::event(&agent, &thing, &name, data)
            }
            .with_created(created_msec);

            if action {
                svc.add_action(value)?;
            } else {
                svc.add_event(value)?;
            }
            info!(agent = %agent, thing = %thing, name = %name, "Recorded value");
            if !cli.json {
                let kind = if action { "action" } else { "event" };
                println!("✓ Recorded {} '{}' for {}/{}", kind, name, agent, thing);
            }
        }

        Commands::History {
            agent,
            thing,
            name,
            seek,
            limit,
            backward,
        } => {
            let values = read_history(
                &svc,
                &agent,
                &thing,
                name.as_deref(),
                seek.as_deref(),
                limit,
                backward,
            )?;
            print_values(&values, cli.json)?;
        }

        Commands::Latest {
            agent,
            thing,
            names,
        } => {
            let values: Vec<StoredValue> = svc
                .get_latest_values(&agent, &thing, &names)?
                .into_values()
                .collect();
            print_values(&values, cli.json)?;
        }

        Commands::Rules => {
            let rules = svc.get_rules();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else if rules.is_empty() {
                println!("No retention rules, all values are retained");
            } else {
                for rule in rules {
                    let name = if rule.is_wildcard() { "*" } else { rule.name.as_str() };
                    println!(
                        "{:<20} {}  agents={:?} things={:?} exclude={:?}",
                        name,
                        if rule.retain { "retain " } else { "discard" },
                        rule.agents,
                        rule.things,
                        rule.exclude
                    );
                }
            }
        }

        Commands::Check { agent, thing, name } => {
            let retained = svc.test_value(&StoredValue::event(&agent, &thing, &name, Vec::new()));
            if cli.json {
                println!("{}", serde_json::json!({ "retained": retained }));
            } else if retained {
                println!("✓ '{}' of {}/{} is retained", name, agent, thing);
            } else {
                println!("✗ '{}' of {}/{} is not retained", name, agent, thing);
            }
        }
    }

    svc.stop().context("Failed to close history store")?;
    Ok(())
}
