use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

use runboard_core::{ColumnSet, RunRow};
use runboard_persist::{SqliteStore, ViewStateRepo};
use runboard_poll::{AlwaysVisible, PollConfig, PollController, PollEvent};
use runboard_store::{
    compute_diff_columns, hidden_columns, visible_columns, visible_rows, ColumnLayout, LifecycleFilter, SortKey, SortSpec,
    ViewAction, ViewState, ViewStore,
};

mod fetch;

#[derive(Parser, Debug)]
#[command(name = "runboardctl", version, about = "Runboard CLI: run-table view state, CSV export and polling")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// SQLite file holding persisted view state
    #[arg(long = "db", global = true, env = "RUNBOARD_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Stage { Active, Deleted }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Layout { Compact, Grid }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the experiment's visible runs as CSV
    Export {
        experiment: String,
        /// JSON file with an array of runs
        #[arg(long = "runs")]
        runs: String,
    },
    /// List columns whose values are identical across all runs
    Diff {
        #[arg(long = "runs")]
        runs: String,
    },
    /// Inspect or edit the persisted view state of an experiment
    View {
        experiment: String,
        #[command(subcommand)]
        action: ViewCmd,
    },
    /// Poll resources from `<dir>/<id>.json` until one disappears
    Poll {
        /// Directory serving the resources
        #[arg(long = "dir")]
        dir: String,
        /// Resource ids to poll
        #[arg(long = "resource", required = true)]
        resources: Vec<String>,
        /// Interval override (default: RUNBOARD_POLL_INTERVAL_MS or 10s)
        #[arg(long = "interval-ms")]
        interval_ms: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum ViewCmd {
    /// Show the current state and, with --runs, the visible columns
    Show {
        #[arg(long = "runs")]
        runs: Option<String>,
    },
    /// Hide columns of one category
    Hide { set: String, keys: Vec<String> },
    /// Un-hide columns of one category
    Unhide { set: String, keys: Vec<String> },
    /// Switch diff view on or off
    ToggleDiff {
        #[arg(long = "runs")]
        runs: String,
    },
    Search { text: String },
    ParamFilter { filter: String },
    MetricFilter { filter: String },
    /// Sort by `attributes.<label>`, `params.<key>`, `metrics.<key>` or `tags.<key>`
    Sort {
        key: String,
        #[arg(long = "asc", action = ArgAction::SetTrue)]
        ascending: bool,
    },
    Lifecycle {
        #[arg(value_enum)]
        stage: Stage,
    },
    Layout {
        #[arg(value_enum)]
        layout: Layout,
    },
    Reset,
}

fn init_tracing() {
    let env = std::env::var("RUNBOARD_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RUNBOARD_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid RUNBOARD_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_runs(path: &str) -> Result<Vec<RunRow>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading runs from {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing runs in {}", path))
}

fn open_repo(db: Option<&str>) -> Result<SqliteStore> {
    match db {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_default(),
    }
}

/// Load the experiment's persisted state into a fresh store.
fn load_store(repo: &SqliteStore, experiment: &str) -> Result<ViewStore> {
    let mut store = ViewStore::new();
    if let Some(state) = repo.get(experiment)? {
        store.restore(experiment, state);
    }
    Ok(store)
}

fn key_set(keys: Vec<String>) -> BTreeSet<String> { keys.into_iter().collect() }

fn print_state(output: Output, experiment: &str, state: &ViewState, rows: Option<&[RunRow]>) -> Result<()> {
    match output {
        Output::Json => {
            let mut v = serde_json::to_value(state)?;
            if let Some(rows) = rows {
                let cols = visible_columns(rows, state);
                v["visible_columns"] = serde_json::json!({
                    "attributes": cols.attributes,
                    "params": cols.params,
                    "metrics": cols.metrics,
                    "tags": cols.tags,
                });
            }
            println!("{}", serde_json::to_string_pretty(&v)?);
        }
        Output::Human => {
            let p = &state.persisted;
            println!("experiment: {}", experiment);
            println!("diff view: {}", if p.diff_switch_selected { "on" } else { "off" });
            for set in ColumnSet::ALL {
                let hidden: Vec<&str> = p.unchecked_keys.get(set).iter().map(|s| s.as_str()).collect();
                println!("hidden {}: {}", set, if hidden.is_empty() { "(none)".to_string() } else { hidden.join(", ") });
            }
            println!("search: {}", state.search_input);
            println!("param filter: {}", state.param_key_filter.raw());
            println!("metric filter: {}", state.metric_key_filter.raw());
            println!("lifecycle: {:?} • layout: {:?}", state.lifecycle_filter, state.layout);
            println!("sort: {:?} {}", state.sort.key, if state.sort.ascending { "asc" } else { "desc" });
            if let Some(rows) = rows {
                let cols = visible_columns(rows, state);
                for set in ColumnSet::ALL {
                    println!("visible {}: {}", set, cols.get(set).join(", "));
                }
            }
        }
    }
    Ok(())
}

async fn run_poll(cli_output: Output, dir: String, resources: Vec<String>, interval_ms: Option<u64>) -> Result<()> {
    let mut config = PollConfig::from_env();
    if let Some(ms) = interval_ms.filter(|ms| *ms > 0) {
        config.interval = Duration::from_millis(ms);
    }
    let mut controller = PollController::from_config(fetch::FsFetcher::new(&dir), AlwaysVisible, resources, &config);
    let cache = controller.cache();
    let mut events = controller.start_polling(config.interval);
    loop {
        tokio::select! {
            evt = events.recv() => {
                match evt {
                    Some(PollEvent::Refreshed { fetched, failed }) => {
                        info!(fetched, failed, cached = cache.len(), "poll: refreshed");
                        if cli_output == Output::Json {
                            println!("{}", serde_json::json!({ "event": "refreshed", "fetched": fetched, "failed": failed }));
                        }
                    }
                    Some(PollEvent::NotFound { resource, redirect_to }) => {
                        match cli_output {
                            Output::Human => println!("{} not found; redirect to {}", resource, redirect_to),
                            Output::Json => println!("{}", serde_json::json!({ "event": "not_found", "resource": resource, "redirect_to": redirect_to })),
                        }
                        break;
                    }
                    None => {
                        warn!("poll event channel closed");
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; stopping poll loop");
                break;
            }
        }
    }
    controller.stop_polling();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Export { experiment, runs } => {
            let rows = load_runs(&runs)?;
            let repo = open_repo(cli.db.as_deref())?;
            let store = load_store(&repo, &experiment)?;
            let state = store.state(&experiment);
            let shown: Vec<RunRow> = visible_rows(&rows, &state).into_iter().cloned().collect();
            let hidden = hidden_columns(&shown, &state);
            info!(experiment = %experiment, runs = rows.len(), shown = shown.len(), "export invoked");
            print!("{}", runboard_export::to_csv(&shown, &hidden));
        }
        Commands::Diff { runs } => {
            let rows = load_runs(&runs)?;
            let diff = compute_diff_columns(&rows);
            match cli.output {
                Output::Human => {
                    for set in ColumnSet::ALL {
                        let keys: Vec<&str> = diff.get(set).iter().map(|s| s.as_str()).collect();
                        println!("{}: {}", set, keys.join(", "));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
            }
        }
        Commands::View { experiment, action } => {
            let repo = open_repo(cli.db.as_deref())?;
            let mut store = load_store(&repo, &experiment)?;
            let before = store.state(&experiment);
            let mut rows: Option<Vec<RunRow>> = None;
            let next = match action {
                ViewCmd::Show { runs } => {
                    rows = runs.as_deref().map(load_runs).transpose()?;
                    None
                }
                ViewCmd::Hide { set, keys } => {
                    let set: ColumnSet = set.parse()?;
                    let mut hidden = store.state(&experiment).persisted.unchecked_keys.get(set).clone();
                    hidden.extend(keys);
                    Some(ViewAction::SetUnchecked { set, keys: hidden })
                }
                ViewCmd::Unhide { set, keys } => {
                    let set: ColumnSet = set.parse()?;
                    let shown = key_set(keys);
                    let hidden = store.state(&experiment).persisted.unchecked_keys.get(set).difference(&shown).cloned().collect();
                    Some(ViewAction::SetUnchecked { set, keys: hidden })
                }
                ViewCmd::ToggleDiff { runs } => {
                    let loaded = load_runs(&runs)?;
                    store.toggle_diff(&experiment, &loaded);
                    rows = Some(loaded);
                    None
                }
                ViewCmd::Search { text } => Some(ViewAction::SetSearch(text)),
                ViewCmd::ParamFilter { filter } => Some(ViewAction::SetParamKeyFilter(filter)),
                ViewCmd::MetricFilter { filter } => Some(ViewAction::SetMetricKeyFilter(filter)),
                ViewCmd::Sort { key, ascending } => {
                    let key = SortKey::parse(&key)
                        .ok_or_else(|| runboard_core::RunboardError::Validation(format!("bad sort key '{}'", key)))?;
                    Some(ViewAction::SetSort(SortSpec { key, ascending }))
                }
                ViewCmd::Lifecycle { stage } => Some(ViewAction::SetLifecycle(match stage {
                    Stage::Active => LifecycleFilter::Active,
                    Stage::Deleted => LifecycleFilter::Deleted,
                })),
                ViewCmd::Layout { layout } => Some(ViewAction::SetLayout(match layout {
                    Layout::Compact => ColumnLayout::Compact,
                    Layout::Grid => ColumnLayout::Grid,
                })),
                ViewCmd::Reset => Some(ViewAction::Reset),
            };
            if let Some(action) = next {
                store.dispatch(&experiment, action);
            }
            let state = store.state(&experiment);
            repo.put_if_changed(&experiment, &before, &state)?;
            print_state(cli.output, &experiment, &state, rows.as_deref())?;
        }
        Commands::Poll { dir, resources, interval_ms } => {
            info!(dir = %dir, resources = resources.len(), "poll invoked");
            run_poll(cli.output, dir, resources, interval_ms).await?;
        }
    }
    Ok(())
}
