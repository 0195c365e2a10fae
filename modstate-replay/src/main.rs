use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libmodstate::logging::LoggingConfig;
use libmodstate::notify::{StoreEvent, StoreEventReceiver};
use libmodstate::{
    build, compose, AccessError, AccessorRef, Config, Event, ModstateError, ModulePath, Selector,
    StateNode, Store,
};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "modstate-replay")]
#[command(version, about = "Replay events through a declared module tree")]
#[command(long_about = r#"Replay a stream of events through a module tree and print the resulting state.

Events are read one JSON object per line:
    {"id": "USER/LOADING_START", "payload": null}

The payload is optional. Events whose namespace no module owns are
accepted and leave the state unchanged (logged as warnings).

EXAMPLES:
    # Replay from stdin and print the final state
    cat events.jsonl | modstate-replay app.toml

    # Replay from a file, printing a snapshot after every event
    modstate-replay app.toml --events events.jsonl --each

    # Read one accessor instead of the whole state
    modstate-replay app.toml --events events.jsonl --select ARTICLE.articleCount

    # Read it on behalf of an ancestor module
    modstate-replay app.toml --events events.jsonl --select ARTICLE.articleCount --as USER

    # Single event inline
    echo '{"id":"USER/LOADING_START"}' | modstate-replay app.toml | jq '.USER.ui'

EXIT CODES:
    0 - Success
    1 - Invalid config file, unreadable events or malformed event line
    2 - Unreadable or invalid declaration, or invalid tree structure
    3 - Selected accessor is unknown or not visible to the requesting module
"#)]
struct Cli {
    /// Declaration file
    #[arg(value_name = "TREE")]
    tree: PathBuf,

    /// Read events from this file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Print a snapshot (one JSON line) after every event
    #[arg(long)]
    each: bool,

    /// Print this accessor's value instead of the whole state
    #[arg(short, long, value_name = "OWNER.ACCESSOR")]
    select: Option<String>,

    /// Module reading the selected accessor (defaults to its owner)
    #[arg(long = "as", value_name = "PATH", requires = "select")]
    requester: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// What gets printed for a snapshot
enum View {
    Whole,
    Select(Selector),
}

impl View {
    fn render(&self, state: &StateNode) -> Result<Value> {
        match self {
            View::Whole => Ok(state.to_json()),
            View::Select(selector) => Ok(selector.select(state).map_err(ModstateError::from)?),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e.downcast_ref::<ModstateError>().map_or(1, ModstateError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    LoggingConfig::from_settings(&config.logging)
        .verbose(cli.verbose)
        .init();

    tracing::debug!("modstate-replay started with args: {:?}", cli);

    let decl = libmodstate::declare::load_declaration(&cli.tree)?;
    let reducer = compose(build(decl).map_err(ModstateError::from)?);

    let view = match &cli.select {
        Some(reference) => {
            let accessor: AccessorRef = reference.parse().map_err(ModstateError::from)?;
            let requester = match &cli.requester {
                Some(path) => path.parse::<ModulePath>().map_err(ModstateError::from)?,
                None => reducer
                    .tree()
                    .by_namespace(&accessor.owner)
                    .map(|node| node.path().clone())
                    .ok_or_else(|| {
                        ModstateError::from(AccessError::UnknownModule(accessor.owner.clone()))
                    })?,
            };
            View::Select(
                reducer
                    .selector(&requester, accessor)
                    .map_err(ModstateError::from)?,
            )
        }
        None => View::Whole,
    };

    let mut store = Store::with_config(reducer, &config.store);
    let reporter = tokio::spawn(report(store.events()));

    let input: Box<dyn BufRead> = match &cli.events {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut replayed = 0usize;
    for (index, line) in input.lines().enumerate() {
        let line = line.context("Failed to read events")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .with_context(|| format!("Malformed event on line {}", index + 1))?;

        store.dispatch_event(event);
        replayed += 1;

        if cli.each {
            println!("{}", serde_json::to_string(&view.render(&store.state())?)?);
        }
    }

    if !cli.each {
        println!("{}", serde_json::to_string_pretty(&view.render(&store.state())?)?);
    }

    // Closing the store ends the reporter's stream.
    drop(store);
    if let Err(e) = reporter.await {
        tracing::warn!("notification reporter failed: {}", e);
    }
    tracing::info!(events = replayed, "replay finished");

    Ok(())
}

/// Log store notifications until the store goes away
async fn report(mut receiver: StoreEventReceiver) {
    loop {
        match receiver.recv().await {
            Ok(StoreEvent::Applied {
                event_id,
                owner,
                changed,
            }) => {
                tracing::debug!(%event_id, %owner, ?changed, "event applied");
            }
            Ok(StoreEvent::Unhandled { event_id }) => {
                tracing::warn!(%event_id, "no module owns this event");
            }
            Ok(StoreEvent::TreeReplaced { modules }) => {
                tracing::debug!(modules, "tree replaced");
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "notification reporter lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
