use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libmodstate::logging::LoggingConfig;
use libmodstate::{build, CompositionTree, Config, ModstateError};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "modstate-check")]
#[command(version, about = "Validate a declared module tree")]
#[command(long_about = r#"Build a module tree from a TOML declaration and report its shape.

Every structural rule is checked: unique module names among siblings,
unique namespaces, unique event ids, reactions limited to descendant
namespaces and accessor reads limited to the module's line of descent.

EXAMPLES:
    # Validate and list modules, namespaces and event ids
    modstate-check app.toml

    # JSON output for scripting
    modstate-check app.toml --format json
    modstate-check app.toml --format json | jq -r '.events[]'

    # Only validate (no output on success)
    modstate-check app.toml --quiet && echo ok

OUTPUT FORMATS:
    text - Human-readable listing (default)
    json - Single JSON object with modules, namespaces and events

EXIT CODES:
    0 - Tree is valid
    1 - Invalid config file
    2 - Unreadable or invalid declaration, or invalid tree structure
"#)]
struct Cli {
    /// Declaration file
    #[arg(value_name = "TREE")]
    tree: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Print nothing on success
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    modules: Vec<ModuleReport>,
    namespaces: Vec<String>,
    events: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ModuleReport {
    path: String,
    #[serde(skip)]
    depth: usize,
    namespace: String,
    emits: Vec<String>,
    reacts_to: Vec<String>,
    accessors: Vec<String>,
}

impl Report {
    fn from_tree(tree: &CompositionTree) -> Self {
        let modules = tree
            .nodes()
            .map(|node| {
                let descriptor = node.descriptor();
                ModuleReport {
                    path: node.path().to_string(),
                    depth: node.path().len(),
                    namespace: descriptor.namespace().to_string(),
                    emits: descriptor.emits().iter().map(ToString::to_string).collect(),
                    reacts_to: descriptor.reacts_to().iter().cloned().collect(),
                    accessors: descriptor.accessor_names().map(str::to_string).collect(),
                }
            })
            .collect();

        Self {
            modules,
            namespaces: tree.namespacer().namespaces().map(str::to_string).collect(),
            events: tree.namespacer().event_ids().map(ToString::to_string).collect(),
        }
    }

    fn print_text(&self) {
        println!("modules:");
        for module in &self.modules {
            let indent = "  ".repeat(module.depth + 1);
            if module.path == module.namespace {
                println!("{}{}", indent, module.path);
            } else {
                println!("{}{} ({})", indent, module.path, module.namespace);
            }
            if !module.accessors.is_empty() {
                println!("{}  accessors: {}", indent, module.accessors.join(", "));
            }
            if !module.reacts_to.is_empty() {
                println!("{}  reacts to: {}", indent, module.reacts_to.join(", "));
            }
        }

        println!("namespaces: {}", self.namespaces.join(", "));

        println!("events:");
        for event in &self.events {
            println!("  {}", event);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        let code = e.downcast_ref::<ModstateError>().map_or(1, ModstateError::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    LoggingConfig::from_settings(&config.logging)
        .verbose(cli.verbose)
        .init();

    tracing::debug!("modstate-check started with args: {:?}", cli);

    let decl = libmodstate::declare::load_declaration(&cli.tree)?;
    let tree = build(decl).map_err(ModstateError::from)?;
    tracing::info!(modules = tree.len(), "tree is valid");

    if cli.quiet {
        return Ok(());
    }

    let report = Report::from_tree(&tree);
    match cli.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report).context("Failed to render report")?;
            println!("{}", json);
        }
        _ => report.print_text(),
    }

    Ok(())
}
