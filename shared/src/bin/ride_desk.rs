//! `ride-desk`: drives the dashboard core from a terminal.
//!
//! Usage: ride-desk [--json] <list | accept ID | decline ID | complete ID>

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crux_core::{Core, Request};
use crux_http::protocol::{HttpRequest, HttpResult};
use crux_kv::{KeyValueOperation, KeyValueResult};
use tokio::task::JoinSet;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use shared::capabilities::{PostgrestClient, SqliteKv};
use shared::{App, Capabilities, Config, Effect, Event, ViewModel};

#[derive(Parser)]
#[command(name = "ride-desk", about = "Review and act on student ride requests")]
struct Args {
    /// Print the view model as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and show every ride request
    List,
    /// Accept a pending ride
    Accept { id: String },
    /// Decline a pending ride
    Decline { id: String },
    /// Mark an accepted ride as completed
    Complete { id: String },
}

impl Command {
    fn event(&self) -> Option<Event> {
        match self {
            Self::List => None,
            Self::Accept { id } => Some(Event::accept(id.as_str())),
            Self::Decline { id } => Some(Event::decline(id.as_str())),
            Self::Complete { id } => Some(Event::complete(id.as_str())),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

enum Pending {
    Http(Request<HttpRequest>),
    KeyValue(Request<KeyValueOperation>),
}

enum Outcome {
    Http(HttpResult),
    KeyValue(KeyValueResult),
}

/// Runs the core's effects against the network and the SQLite cache.
/// Effects execute concurrently; their outcomes are fed back in completion
/// order until the core stops asking for work.
struct Shell {
    core: Core<Effect, App>,
    http: Arc<PostgrestClient>,
    kv: Arc<SqliteKv>,
    pending: HashMap<u64, Pending>,
    tasks: JoinSet<(u64, Outcome)>,
    next_id: u64,
    renders: usize,
}

impl Shell {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let kv = SqliteKv::open(&config.cache_path)
            .with_context(|| format!("opening cache at {}", config.cache_path.display()))?;
        let http = PostgrestClient::new(&config.remote).context("configuring remote client")?;

        Ok(Self {
            core: Core::new::<Capabilities>(),
            http: Arc::new(http),
            kv: Arc::new(kv),
            pending: HashMap::new(),
            tasks: JoinSet::new(),
            next_id: 0,
            renders: 0,
        })
    }

    async fn send(&mut self, event: Event) -> anyhow::Result<()> {
        debug!(event = event.name(), "shell_event");
        let effects = self.core.process_event(event);
        self.dispatch(effects);
        self.settle().await
    }

    fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            let id = self.next_id;
            match effect {
                Effect::Render(_) => {
                    self.renders += 1;
                    continue;
                }
                Effect::Http(request) => {
                    let operation = request.operation.clone();
                    let client = Arc::clone(&self.http);
                    self.tasks
                        .spawn(async move { (id, Outcome::Http(client.execute(&operation).await)) });
                    self.pending.insert(id, Pending::Http(request));
                }
                Effect::KeyValue(request) => {
                    let operation = request.operation.clone();
                    let kv = Arc::clone(&self.kv);
                    self.tasks
                        .spawn(async move { (id, Outcome::KeyValue(kv.run(operation).await)) });
                    self.pending.insert(id, Pending::KeyValue(request));
                }
            }
            self.next_id += 1;
        }
    }

    async fn settle(&mut self) -> anyhow::Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            let (id, outcome) = joined.context("effect task failed")?;
            let effects = match (self.pending.remove(&id), outcome) {
                (Some(Pending::Http(mut request)), Outcome::Http(result)) => {
                    self.core.resolve(&mut request, result)
                }
                (Some(Pending::KeyValue(mut request)), Outcome::KeyValue(result)) => {
                    self.core.resolve(&mut request, result)
                }
                _ => anyhow::bail!("effect {id} finished without a matching request"),
            };
            self.dispatch(effects);
        }
        Ok(())
    }

    fn view(&self) -> ViewModel {
        self.core.view()
    }
}

fn print_table(view: &ViewModel) {
    if let Some(driver) = &view.driver {
        match &driver.email {
            Some(email) => println!("Driver: {} <{email}>", driver.display_name),
            None => println!("Driver: {}", driver.display_name),
        }
    }

    let source = match view.data_source {
        Some(shared::DataSource::Remote) => "remote",
        Some(shared::DataSource::LocalCache) => "local cache",
        None => "none",
    };
    println!(
        "Source: {source} | {} rides, {} pending, {} completed",
        view.total_count, view.pending_count, view.completed_count
    );

    if view.rides.is_empty() {
        println!("No ride requests.");
    }

    for ride in &view.rides {
        println!(
            "[{}] {}  {} <{}>  {} -> {}  {} {}  ({})",
            ride.status_label,
            ride.id,
            ride.student_name,
            ride.student_email,
            ride.pickup_location,
            ride.destination,
            ride.date,
            ride.time,
            ride.disability_type,
        );
        if let Some(notes) = &ride.additional_notes {
            println!("    notes: {notes}");
        }
        if !ride.actions.is_empty() {
            let actions: Vec<&str> = ride.actions.iter().map(|a| a.as_str()).collect();
            println!("    actions: {}", actions.join(", "));
        }
    }

    if let Some(toast) = &view.toast {
        println!("{}", toast.message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("loading configuration")?;
    info!(
        cache = %config.cache_path.display(),
        backfill = %config.backfill_mode,
        "ride_desk_starting"
    );

    let mut shell = Shell::new(&config)?;
    shell.send(Event::Configured(config.dashboard_settings())).await?;
    shell.send(Event::SessionChanged(config.driver.clone())).await?;
    shell.send(Event::Mounted).await?;
    if let Some(event) = args.command.event() {
        shell.send(event).await?;
    }

    let view = shell.view();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_table(&view);
    }

    info!(renders = shell.renders, "ride_desk_finished");
    Ok(())
}
