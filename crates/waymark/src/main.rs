//! Waymark: weekly time and location reminders
//!
//! Main binary with subcommands:
//! - `register` / `unregister`: manage reminders
//! - `list`: show reminders, armed alarms and monitored regions
//! - `tick`: deliver due alarms
//! - `visit`: report being at a point
//! - `run`: tick in the foreground until interrupted

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waymark_geo::{Coordinates, Place};
use waymark_scheduler::{DayOfWeek, DispatchReport, ListenerRef, SystemClock, TimeOfDay};

use crate::error::HostError;
use crate::host::Host;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

mod daemon;
mod error;
mod host;
mod journal;
mod listeners;

#[derive(Parser)]
#[command(name = "waymark")]
#[command(about = "Weekly time and location reminders", long_about = None)]
struct Cli {
    /// Directory holding reminders, alarms and regions
    #[arg(long, global = true, env = "WAYMARK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Whether location access is granted.
    /// Accepts 1/true/yes/on or 0/false/no/off.
    #[arg(long, global = true, env = "WAYMARK_LOCATION_GRANTED", value_parser = parse_bool_env, default_value = "true")]
    location_granted: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a reminder
    Register {
        #[command(subcommand)]
        reminder: RegisterCommand,
    },

    /// Unregister a reminder
    Unregister {
        /// Kind of reminder
        #[arg(value_enum)]
        kind: KindArg,

        /// Reminder id
        id: String,
    },

    /// Show reminders, armed alarms and monitored regions
    List,

    /// Deliver every alarm that is due
    Tick,

    /// Report being at a point, firing any region entered
    Visit {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Tick in the foreground until Ctrl-C
    Run {
        /// Seconds between ticks
        #[arg(long, default_value = "1")]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum RegisterCommand {
    /// Fire every week at a day and time
    Time {
        #[command(flatten)]
        common: CommonArgs,

        /// Day of week (e.g. friday, fri)
        #[arg(long)]
        day: DayOfWeek,

        /// Time of day, HH:MM or HH:MM:SS
        #[arg(long)]
        time: TimeOfDay,
    },

    /// Fire on entering a place, on one day of the week
    Location {
        #[command(flatten)]
        common: CommonArgs,

        /// Day of week (e.g. friday, fri)
        #[arg(long)]
        day: DayOfWeek,

        #[command(flatten)]
        place: PlaceArgs,
    },

    /// Fire on entering a place shortly after a day and time
    TimeLocation {
        #[command(flatten)]
        common: CommonArgs,

        /// Day of week (e.g. friday, fri)
        #[arg(long)]
        day: DayOfWeek,

        /// Time of day, HH:MM or HH:MM:SS
        #[arg(long)]
        time: TimeOfDay,

        #[command(flatten)]
        place: PlaceArgs,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Reminder id (a new UUID if omitted)
    #[arg(long)]
    id: Option<String>,

    /// Listener to fire
    #[arg(long, default_value = "log")]
    listener: String,

    /// Listener parameter as key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(clap::Args)]
struct PlaceArgs {
    /// Latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Human-readable label for the place
    #[arg(long)]
    address: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Time,
    Location,
    TimeLocation,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "waymark=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| miette::miette!("no data directory, pass --data-dir"))?
            .join("waymark"),
    };
    let host = Host::open(
        data_dir,
        cli.location_granted,
        listeners::builtin(),
        Arc::new(SystemClock),
    );

    match cli.command {
        Commands::Register { reminder } => register(&host, reminder).await,
        Commands::Unregister { kind, id } => unregister(&host, kind, &id).await,
        Commands::List => list(&host).await,
        Commands::Tick => {
            let report = host.tick().await.map_err(|e| miette::miette!("{}", e))?;
            print_report(&report);
            Ok(())
        }
        Commands::Visit { lat, lon } => {
            let report = host
                .visit(Coordinates::new(lat, lon))
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            print_report(&report);
            Ok(())
        }
        Commands::Run { interval } => {
            daemon::run(host, Duration::from_secs(interval.max(1))).await
        }
    }
}

async fn register(host: &Host, reminder: RegisterCommand) -> Result<()> {
    match reminder {
        RegisterCommand::Time { common, day, time } => {
            let (id, listener) = common.resolve()?;
            let next = host
                .manager
                .register_time_reminder(&id, day, time, listener)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("registered {id}, next alarm {next}");
        }
        RegisterCommand::Location { common, day, place } => {
            let (id, listener) = common.resolve()?;
            host.manager
                .register_location_reminder(&id, day, place.into_place(), listener)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("registered {id}");
        }
        RegisterCommand::TimeLocation {
            common,
            day,
            time,
            place,
        } => {
            let (id, listener) = common.resolve()?;
            let next = host
                .manager
                .register_time_location_reminder(&id, day, time, place.into_place(), listener)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("registered {id}, next alarm {next}");
        }
    }
    Ok(())
}

async fn unregister(host: &Host, kind: KindArg, id: &str) -> Result<()> {
    let result = match kind {
        KindArg::Time => host.manager.unregister_time_reminder(id).await,
        KindArg::Location => host.manager.unregister_location_reminder(id).await,
        KindArg::TimeLocation => host.manager.unregister_time_location_reminder(id).await,
    };
    result.map_err(|e| miette::miette!("{}", e))?;
    println!("unregistered {id}");
    Ok(())
}

async fn list(host: &Host) -> Result<()> {
    let reminders = host
        .manager
        .list()
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let alarms = host
        .alarms
        .armed()
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let regions = host
        .regions
        .regions()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    println!("reminders ({}):", reminders.len());
    for r in &reminders {
        let mut line = format!("  {} {} {}", r.id, r.kind.label(), r.kind.day());
        if let Some(time) = r.kind.time() {
            line.push_str(&format!(" {time}"));
        }
        if let Some(place) = r.kind.place() {
            line.push_str(&format!(" at {} ({})", place.address, place.coordinates));
        }
        line.push_str(&format!(" -> {}", r.listener.key));
        println!("{line}");
    }

    println!("alarms ({}):", alarms.len());
    for a in &alarms {
        println!("  {} at {}", a.trigger_id, a.at);
    }

    println!("regions ({}):", regions.len());
    for r in &regions {
        let expiry = match r.region.expires_after {
            Some(ttl) => format!("expires {}s after {}", ttl.as_secs(), r.added_at),
            None => "never expires".to_string(),
        };
        println!(
            "  {} {:?} around {} r={}m, {}",
            r.region.id,
            r.region.target,
            r.region.region.center,
            r.region.region.radius.as_m(),
            expiry
        );
    }
    Ok(())
}

fn print_report(report: &DispatchReport) {
    for id in &report.invoked {
        println!("fired {id}");
    }
    for id in &report.windows_opened {
        println!("watching {id}");
    }
    for id in &report.skipped {
        println!("skipped {id}");
    }
}

impl CommonArgs {
    fn resolve(self) -> Result<(String, ListenerRef)> {
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let params = parse_params(&self.params).map_err(|e| miette::miette!("{}", e))?;
        Ok((id, ListenerRef::new(self.listener).with_params(params)))
    }
}

impl PlaceArgs {
    fn into_place(self) -> Place {
        let coordinates = Coordinates::new(self.lat, self.lon);
        let address = self.address.unwrap_or_else(|| coordinates.to_string());
        Place::new(coordinates, address)
    }
}

/// Turn `key=value` pairs into a JSON object. Values that parse as JSON keep
/// their type; anything else is a string.
fn parse_params(pairs: &[String]) -> Result<serde_json::Value, HostError> {
    if pairs.is_empty() {
        return Ok(serde_json::Value::Null);
    }

    let mut map = serde_json::Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| HostError::InvalidParam(pair.clone()))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(serde_json::Value::Object(map))
}
