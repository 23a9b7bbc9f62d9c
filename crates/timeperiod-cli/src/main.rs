//! timeperiod CLI - resolve time expressions, navigate time selector ranges,
//! compile SLA schedules and inspect maintenance recurrences.
//!
//! Usage:
//!   timeperiod resolve <FROM> [TO]
//!   timeperiod navigate --method <METHOD> [--from <FROM> --to <TO>] [--profile <FILE>]
//!   timeperiod schedule --day mon=8:00-17:00 [--day ...]
//!   timeperiod recurrence decode|next --field <NAME=VALUE>...

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Weekday;
use clap::{Parser, Subcommand};
use serde::Serialize;
use timeperiod_engine::{
    active_window, compile, current_period, decode, encode, format_timestamp, next_occurrence,
    next_occurrence_since, normalize, range_label, resolve_pair, to_rrule, update, EngineConfig,
    FieldErrors, MemoryProfileStore, RawFields, TimeExpression, TimeRange, TimeSelectorRequest,
    WeekdaySet, WeeklySchedule,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "timeperiod")]
#[command(about = "Time period and recurrence engine")]
#[command(version)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true, env = "TIMEPERIOD_CONFIG")]
    config: Option<PathBuf>,

    /// IANA timezone, overrides the configuration file
    #[arg(long, global = true, env = "TIMEPERIOD_TZ")]
    timezone: Option<String>,

    /// Reference time as a Unix timestamp (defaults to the current time)
    #[arg(long, global = true, env = "TIMEPERIOD_NOW")]
    now: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a time expression, or a from/to pair
    Resolve {
        /// Start expression, e.g. "now-1d/d" or "2026-02-18 14:30"
        from: String,

        /// End expression; when given, the pair is resolved as a range
        to: Option<String>,
    },

    /// Apply a time selector operation and persist the result
    Navigate {
        /// increment, decrement, zoomout, rangechange or rangeoffset
        #[arg(short, long)]
        method: String,

        /// Current (or, for rangechange, new) start expression
        #[arg(long)]
        from: Option<String>,

        /// Current (or, for rangechange, new) end expression
        #[arg(long)]
        to: Option<String>,

        /// Profile namespace
        #[arg(long, default_value = "web.dashboard.filter")]
        idx: String,

        #[arg(long, default_value_t = 0)]
        idx2: u64,

        #[arg(long, allow_hyphen_values = true)]
        from_offset: Option<i64>,

        #[arg(long, allow_hyphen_values = true)]
        to_offset: Option<i64>,

        /// Profile store file; the stored range is used when --from/--to are absent
        #[arg(short, long)]
        profile: Option<PathBuf>,
    },

    /// Compile per-weekday periods into a weekly SLA schedule
    Schedule {
        /// WEEKDAY=PERIODS, e.g. "mon=8:00-12:00,13:00-17:00"
        #[arg(short, long = "day", required = true)]
        days: Vec<String>,
    },

    /// Maintenance recurrence operations
    Recurrence {
        #[command(subcommand)]
        command: RecurrenceCommands,
    },
}

#[derive(Subcommand)]
enum RecurrenceCommands {
    /// Validate record fields and print the typed pattern
    Decode {
        /// NAME=VALUE record field, e.g. "timeperiod_type=2"
        #[arg(short, long = "field", required = true)]
        fields: Vec<String>,
    },

    /// Print the next occurrences of a recurrence
    Next {
        #[arg(short, long = "field", required = true)]
        fields: Vec<String>,

        /// Search after this timestamp (defaults to --now)
        #[arg(long)]
        after: Option<i64>,

        /// Maintenance activation time, anchors "every N" cycles
        #[arg(long)]
        since: Option<i64>,

        /// Number of occurrences to list
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.timezone)?;
    let now = cli.now.unwrap_or_else(|| chrono::Utc::now().timestamp());
    debug!(now, timezone = %config.timezone, "starting");

    match cli.command {
        Commands::Resolve { from, to } => resolve(&config, now, &from, to.as_deref()),
        Commands::Navigate {
            method,
            from,
            to,
            idx,
            idx2,
            from_offset,
            to_offset,
            profile,
        } => {
            let mut store = load_store(profile.as_deref())?;
            let (from, to) = match (from, to) {
                (Some(from), Some(to)) => (from, to),
                (None, None) => {
                    let current = current_period(&store, &config, Some(&idx), idx2, now)
                        .map_err(|errors| anyhow::anyhow!("stored range: {}", errors))?;
                    (current.from, current.to)
                }
                _ => bail!("--from and --to must be given together"),
            };
            let request = TimeSelectorRequest {
                method: Some(method),
                idx: Some(idx),
                idx2: Some(idx2),
                from: Some(from),
                to: Some(to),
                from_offset,
                to_offset,
            };

            match update(&mut store, &config, &request, now) {
                Ok(response) => {
                    if let Some(path) = profile.as_deref() {
                        save_store(path, &store)?;
                    }
                    print_json(&response)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => print_errors(&errors),
            }
        }
        Commands::Schedule { days } => schedule(&days),
        Commands::Recurrence { command } => match command {
            RecurrenceCommands::Decode { fields } => {
                let fields = parse_fields(&fields)?;
                match decode(&fields, &config) {
                    Ok(pattern) => {
                        print_json(&serde_json::json!({
                            "pattern": pattern,
                            "record": encode(&pattern),
                        }))?;
                        Ok(ExitCode::SUCCESS)
                    }
                    Err(e) => print_errors(&FieldErrors::from(e)),
                }
            }
            RecurrenceCommands::Next {
                fields,
                after,
                since,
                count,
            } => {
                let fields = parse_fields(&fields)?;
                let pattern = match decode(&fields, &config) {
                    Ok(pattern) => pattern,
                    Err(e) => return print_errors(&FieldErrors::from(e)),
                };
                let tz = config.tz()?;
                let since = since.unwrap_or(now);
                let mut after = after.unwrap_or(now);

                let mut occurrences = Vec::new();
                while occurrences.len() < count {
                    let Some(start) = next_occurrence_since(&pattern, since, after, &tz)? else {
                        break;
                    };
                    occurrences.push(serde_json::json!({
                        "start": start,
                        "start_date": format_timestamp(start, &tz)?,
                        "end": start + pattern.duration() as i64,
                    }));
                    after = start;
                }

                print_json(&serde_json::json!({
                    "rrule": to_rrule(&pattern, since, &tz)?,
                    "next": next_occurrence(&pattern, now, &tz)?,
                    "active_window": active_window(&pattern, since, config.max_date, now, &tz)?,
                    "occurrences": occurrences,
                }))?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn load_config(path: Option<&Path>, timezone: Option<String>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            EngineConfig::from_json(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(timezone) = timezone {
        config.timezone = timezone;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_store(path: Option<&Path>) -> Result<MemoryProfileStore> {
    match path {
        Some(path) if path.exists() => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid profile file {}", path.display()))
        }
        _ => Ok(MemoryProfileStore::new()),
    }
}

fn save_store(path: &Path, store: &MemoryProfileStore) -> Result<()> {
    let json = serde_json::to_string_pretty(store)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write profile file {}", path.display()))
}

fn resolve(config: &EngineConfig, now: i64, from: &str, to: Option<&str>) -> Result<ExitCode> {
    let tz = config.tz()?;

    let Some(to) = to else {
        let expr = match TimeExpression::parse(from, config) {
            Ok(expr) => expr,
            Err(e) => return print_errors(&FieldErrors::from(e)),
        };
        let timestamp = expr.resolve(now, config)?;
        print_json(&serde_json::json!({
            "expression": expr.to_string(),
            "timestamp": timestamp,
            "date": format_timestamp(timestamp, &tz)?,
        }))?;
        return Ok(ExitCode::SUCCESS);
    };

    let range = match TimeRange::parse(from, to, config) {
        Ok(range) => range,
        Err(e) => return print_errors(&FieldErrors::from(e)),
    };
    let resolved = match resolve_pair(&range, now, config) {
        Ok(resolved) => resolved,
        Err(e) => return print_errors(&FieldErrors::from(e)),
    };
    print_json(&serde_json::json!({
        "label": range_label(&range.from, &range.to),
        "from": range.from.to_string(),
        "to": range.to.to_string(),
        "from_ts": resolved.from_ts,
        "to_ts": resolved.to_ts,
        "from_date": format_timestamp(resolved.from_ts, &tz)?,
        "to_date": format_timestamp(resolved.to_ts, &tz)?,
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn schedule(days: &[String]) -> Result<ExitCode> {
    let mut text: HashMap<Weekday, String> = HashMap::new();
    for day in days {
        let (name, periods) = day
            .split_once('=')
            .with_context(|| format!("Expected WEEKDAY=PERIODS, got \"{}\"", day))?;
        let weekday: Weekday = name
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown weekday \"{}\"", name))?;
        text.insert(weekday, periods.to_string());
    }
    let enabled: WeekdaySet = text.keys().copied().collect();

    let intervals = match compile(&text, &enabled) {
        Ok(intervals) => intervals,
        Err(e) => return print_errors(&FieldErrors::from(e)),
    };
    let normalized = normalize(intervals.clone());
    print_json(&serde_json::json!({
        "intervals": intervals,
        "always": normalized == WeeklySchedule::Always,
        "weekly_seconds": normalized.weekly_seconds(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn parse_fields(pairs: &[String]) -> Result<RawFields> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .with_context(|| format!("Expected NAME=VALUE, got \"{}\"", pair))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Field errors go to stdout as JSON so callers can redisplay them.
fn print_errors(errors: &FieldErrors) -> Result<ExitCode> {
    debug!(%errors, "request rejected");
    print_json(&serde_json::json!({ "errors": errors }))?;
    Ok(ExitCode::from(1))
}
