use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use quadrant_lib::model::{group_by_quadrant, NewRitual, NewTask, Ritual, Task, ALL_DAYS};
use quadrant_lib::store::{ensure_table, MemoryStore, RemoteStore, SqliteStore};
use quadrant_lib::sync_errors::{is_validation_error, validation_error};
use quadrant_lib::time::parse_day_key;
use quadrant_lib::{
    AppError, CacheScope, LoadOutcome, LocalCache, MutationOutcome, MutationStatus, RitualTracker,
    SyncConfig, SyncWarning, SyncedCollection,
};

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_CACHED: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "quadrant", about = "Inspect and edit quadrant planner data", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// SQLite database acting as the remote store.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory holding cached snapshots.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Owner whose records are read and written.
    #[arg(long, global = true, default_value = "local")]
    owner: String,
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit JSON instead of a plain table.
    #[arg(long, global = true)]
    json: bool,
    /// Do not open the database; serve cached data only.
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Quadrant tasks.
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Daily rituals and their streaks.
    #[command(subcommand)]
    Rituals(RitualCommand),
    /// Cached snapshots.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    List,
    Add {
        title: String,
        #[arg(long)]
        urgent: bool,
        #[arg(long)]
        important: bool,
        /// Due date as yyyy-mm-dd.
        #[arg(long)]
        due: Option<String>,
    },
    /// Flip the completed flag.
    Toggle { id: String },
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum RitualCommand {
    List,
    Add {
        title: String,
        /// Comma separated weekdays, e.g. mon,wed,fri. Defaults to every day.
        #[arg(long)]
        days: Option<String>,
    },
    /// Toggle completion for a day (today when omitted).
    Check {
        id: String,
        #[arg(long)]
        date: Option<String>,
    },
    Stats { id: String },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Print the cached snapshot for a table.
    Show { table: String },
}

struct Session {
    remote: Arc<dyn RemoteStore>,
    cache: LocalCache,
    config: Arc<SyncConfig>,
    owner: String,
    json: bool,
}

fn main() {
    quadrant_lib::init_logging();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: start async runtime: {err}");
            process::exit(EXIT_FAILED);
        }
    };
    match runtime.block_on(handle_cli(cli)) {
        Ok(code) => process::exit(code),
        Err(err) => {
            if let Some(app) = err.downcast_ref::<AppError>() {
                if is_validation_error(app) {
                    eprintln!("Invalid input: {}", app.message());
                    process::exit(EXIT_FAILED);
                }
            }
            eprintln!("Error: {err:#}");
            process::exit(EXIT_FAILED);
        }
    }
}

async fn handle_cli(cli: Cli) -> Result<i32> {
    if let Commands::Cache(CacheCommand::Show { table }) = &cli.command {
        let config = load_config(&cli.global)?;
        return show_cache(&cli.global, &config, table);
    }
    let ctx = open_session(&cli.global).await?;
    match cli.command {
        Commands::Tasks(command) => handle_tasks(&ctx, command).await,
        Commands::Rituals(command) => handle_rituals(&ctx, command).await,
        Commands::Cache(_) => Ok(EXIT_OK),
    }
}

fn load_config(global: &GlobalArgs) -> Result<SyncConfig> {
    let mut config =
        SyncConfig::load(global.config.as_deref()).context("load configuration")?;
    if let Some(db) = &global.db {
        config.database_path = Some(db.clone());
    }
    if let Some(dir) = &global.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

async fn open_session(global: &GlobalArgs) -> Result<Session> {
    let config = load_config(global)?;
    let remote: Arc<dyn RemoteStore> = if global.offline {
        let store = MemoryStore::new();
        store.set_offline(true);
        Arc::new(store)
    } else {
        let path = config.resolved_database_path();
        Arc::new(
            SqliteStore::open(&path)
                .await
                .with_context(|| format!("open store {}", path.display()))?,
        )
    };
    Ok(Session {
        remote,
        cache: LocalCache::file(config.resolved_cache_dir()),
        config: Arc::new(config),
        owner: global.owner.clone(),
        json: global.json,
    })
}

fn print_warnings(warnings: &[SyncWarning]) {
    for warning in warnings {
        eprintln!("warning: {} ({})", warning.message, warning.code.as_str());
    }
}

fn load_exit_code(outcomes: &[&LoadOutcome]) -> i32 {
    if outcomes.iter().any(|o| o.from_cache()) {
        EXIT_CACHED
    } else {
        EXIT_OK
    }
}

fn mutation_exit_code<T>(base: i32, outcome: &MutationOutcome<T>) -> i32 {
    match outcome.status {
        MutationStatus::NoOp => EXIT_FAILED,
        MutationStatus::PersistFailed => EXIT_CACHED,
        MutationStatus::Persisted => base,
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{serialized}");
    Ok(())
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    parse_day_key(value).ok_or_else(|| {
        anyhow::Error::from(validation_error(
            "date",
            format!("{value:?} is not a yyyy-mm-dd date"),
        ))
    })
}

fn parse_days(value: &str) -> Result<Vec<u8>> {
    const NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
    let mut days = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let lower = part.to_ascii_lowercase();
        let day = NAMES
            .iter()
            .position(|name| lower.starts_with(name))
            .map(|i| i as u8)
            .or_else(|| lower.parse::<u8>().ok().filter(|d| ALL_DAYS.contains(d)));
        match day {
            Some(day) if !days.contains(&day) => days.push(day),
            Some(_) => {}
            None => {
                return Err(validation_error(
                    "days_of_week",
                    format!("unknown weekday {part:?}"),
                )
                .into())
            }
        }
    }
    days.sort_unstable();
    Ok(days)
}

fn print_task_table(tasks: &[Task]) {
    for (quadrant, bucket) in group_by_quadrant(tasks) {
        println!("{} {}", quadrant.as_str().to_uppercase(), quadrant.label());
        for task in bucket {
            println!("  {}  {}", task.id, task.title);
        }
    }
    let done = tasks.iter().filter(|t| t.completed).count();
    if done > 0 {
        println!("({done} completed)");
    }
}

async fn handle_tasks(ctx: &Session, command: TaskCommand) -> Result<i32> {
    let tasks: SyncedCollection<Task> = SyncedCollection::new(
        Arc::clone(&ctx.remote),
        ctx.cache.clone(),
        Arc::clone(&ctx.config),
    );
    let loaded = tasks.load(&ctx.owner).await;
    print_warnings(loaded.warning.as_slice());
    let base = load_exit_code(&[&loaded]);

    match command {
        TaskCommand::List => {
            let items = tasks.items();
            if ctx.json {
                print_json(&json!({ "source": loaded.source, "tasks": items }))?;
            } else {
                print_task_table(&items);
            }
            Ok(base)
        }
        TaskCommand::Add {
            title,
            urgent,
            important,
            due,
        } => {
            let mut draft = NewTask::new(title).with_flags(urgent, important);
            draft.due_date = due.as_deref().map(parse_date).transpose()?;
            let outcome = tasks.add(draft).await?;
            report_mutation(ctx, &outcome)?;
            Ok(mutation_exit_code(base, &outcome))
        }
        TaskCommand::Toggle { id } => {
            let outcome = tasks.toggle(&id, "completed").await?;
            report_mutation(ctx, &outcome)?;
            Ok(mutation_exit_code(base, &outcome))
        }
        TaskCommand::Delete { id } => {
            let outcome = tasks.delete(&id).await;
            report_mutation(ctx, &outcome)?;
            Ok(mutation_exit_code(base, &outcome))
        }
    }
}

fn report_mutation<T: serde::Serialize>(ctx: &Session, outcome: &MutationOutcome<T>) -> Result<()> {
    print_warnings(&outcome.warnings);
    if ctx.json {
        print_json(&json!({
            "status": outcome.status,
            "entity": outcome.entity,
            "warnings": outcome.warnings,
        }))
    } else {
        match serde_json::to_value(&outcome.entity)?.get("id").and_then(|v| v.as_str()) {
            Some(id) => println!("{id} {:?}", outcome.status),
            None => println!("{:?}", outcome.status),
        }
        Ok(())
    }
}

fn ritual_row(tracker: &RitualTracker, ritual: &Ritual) -> serde_json::Value {
    let stats = tracker.stats(&ritual.id).unwrap_or_default();
    json!({
        "id": ritual.id,
        "title": ritual.title,
        "days_of_week": ritual.days_of_week,
        "is_active": ritual.is_active,
        "stats": stats,
        "done_today": tracker.is_completed_on(&ritual.id, tracker.today()),
    })
}

async fn handle_rituals(ctx: &Session, command: RitualCommand) -> Result<i32> {
    let tracker = RitualTracker::new(
        Arc::clone(&ctx.remote),
        ctx.cache.clone(),
        Arc::clone(&ctx.config),
    )
    .context("resolve timezone")?;
    let loaded = tracker.load(&ctx.owner).await;
    print_warnings(&loaded.warnings());
    let base = load_exit_code(&[&loaded.rituals, &loaded.completions]);

    match command {
        RitualCommand::List => {
            let rows: Vec<serde_json::Value> = tracker
                .rituals()
                .items()
                .iter()
                .map(|r| ritual_row(&tracker, r))
                .collect();
            if ctx.json {
                print_json(&json!({ "rituals": rows }))?;
            } else {
                for ritual in tracker.rituals().items() {
                    let stats = tracker.stats(&ritual.id).unwrap_or_default();
                    let mark = if tracker.is_completed_on(&ritual.id, tracker.today()) {
                        "x"
                    } else {
                        " "
                    };
                    println!(
                        "[{mark}] {}  {:<24} streak {:>3}  best {:>3}  month {:>3}%",
                        ritual.id, ritual.title, stats.current, stats.longest, stats.completion_rate
                    );
                }
            }
            Ok(base)
        }
        RitualCommand::Add { title, days } => {
            let mut draft = NewRitual::new(title);
            if let Some(days) = days.as_deref() {
                draft = draft.on_days(parse_days(days)?);
            }
            let outcome = tracker.add_ritual(draft).await?;
            report_mutation(ctx, &outcome)?;
            Ok(mutation_exit_code(base, &outcome))
        }
        RitualCommand::Check { id, date } => {
            let day = match date.as_deref() {
                Some(date) => parse_date(date)?,
                None => tracker.today(),
            };
            let outcome = tracker.toggle_completion(&id, day).await?;
            print_warnings(&outcome.warnings);
            let done = tracker.is_completed_on(&id, day);
            if ctx.json {
                print_json(&json!({
                    "ritual_id": id,
                    "date": day,
                    "completed": done,
                    "status": outcome.status,
                    "streak": tracker.get_streak(&id),
                }))?;
            } else if !outcome.is_no_op() {
                println!(
                    "{id} {} on {day}; streak {}",
                    if done { "done" } else { "not done" },
                    tracker.get_streak(&id)
                );
            }
            Ok(mutation_exit_code(base, &outcome))
        }
        RitualCommand::Stats { id } => {
            let Some(stats) = tracker.stats(&id) else {
                eprintln!("ritual {id} not found");
                return Ok(EXIT_FAILED);
            };
            if ctx.json {
                print_json(&json!({ "ritual_id": id, "stats": stats }))?;
            } else {
                println!("current streak : {}", stats.current);
                println!("longest streak : {}", stats.longest);
                println!("this month     : {}%", stats.completion_rate);
            }
            Ok(base)
        }
    }
}

fn show_cache(global: &GlobalArgs, config: &SyncConfig, table: &str) -> Result<i32> {
    ensure_table(table)?;
    let cache = LocalCache::file(config.resolved_cache_dir());
    let scope = CacheScope::new(table, global.owner.as_str());
    match cache.raw(&scope) {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("parse cached snapshot")?;
            print_json(&value)?;
            Ok(EXIT_OK)
        }
        None => {
            eprintln!("no cached snapshot for {}", scope.key());
            Ok(EXIT_FAILED)
        }
    }
}
