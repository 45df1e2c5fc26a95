use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{info, warn};
use trellis_engine::{
    CatalogDocument, ExecutionContext, Executor, MemoryCatalog, MemoryStateStore, ReqwestTransport, ResolveScope, Services,
    load_config, parse_pipeline_file,
};
use trellis_types::{Pipeline, StorageArea};

#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Run, resolve and validate declarative action pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a pipeline and print results, errors and final state as JSON
    Run(RunArgs),
    /// Resolve a single template against optional state and event payloads
    Resolve(ResolveArgs),
    /// Check a pipeline document against the built-in action registry
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to a pipeline document (YAML or JSON)
    pipeline: PathBuf,
    /// Pipeline name within a bundle; defaults to the first one
    #[arg(long)]
    name: Option<String>,
    /// JSON/YAML file used as the triggering event payload
    #[arg(long)]
    event: Option<PathBuf>,
    /// JSON/YAML file used as the initial state tree
    #[arg(long)]
    state: Option<PathBuf>,
    /// JSON/YAML layout catalog (`{ views: [...] }`) for tree instantiation
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Keep the runtime alive this long so scheduled timers can fire
    #[arg(long, default_value_t = 0)]
    wait_ms: u64,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// Template text, e.g. "Hello {{event.user}}"
    template: String,
    #[arg(long)]
    state: Option<PathBuf>,
    #[arg(long)]
    event: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    pipeline: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_pipeline_cmd(args).await,
        Command::Resolve(args) => resolve_cmd(args),
        Command::Validate(args) => validate_cmd(args),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    // Logs go to stderr so stdout stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_pipeline_cmd(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let pipeline = select_pipeline(&args.pipeline, args.name.as_deref())?;

    let http = ReqwestTransport::new(&config)?;
    let mut services = Services::in_memory(config).with_http(Arc::new(http));
    let catalog = match &args.catalog {
        Some(path) => {
            let document: CatalogDocument = serde_yaml::from_value(read_document(path)?)
                .with_context(|| format!("Invalid catalog document: {}", path.display()))?;
            let catalog = Arc::new(MemoryCatalog::from_document(document));
            services = services.with_catalog(catalog.clone());
            Some(catalog)
        }
        None => None,
    };
    let executor = Executor::with_builtin_actions(services)?;

    let problems = executor.validate_pipeline(&pipeline);
    if !problems.is_empty() {
        for problem in &problems {
            warn!(pipeline = %pipeline.name, %problem, "pipeline validation failed");
        }
        bail!("pipeline '{}' is invalid: {}", pipeline.name, problems.join("; "));
    }

    let state = Arc::new(MemoryStateStore::with_state(optional_document(args.state.as_deref())?));
    let mut context = ExecutionContext::new(state).with_event(optional_document(args.event.as_deref())?);

    info!(pipeline = %pipeline.name, actions = pipeline.actions.len(), "running pipeline");
    let report = executor.run_pipeline(&pipeline, &mut context).await;
    if args.wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.wait_ms)).await;
    }
    executor.services().timers.cancel_all();

    let mut output = json!({
        "report": report,
        "results": context.results,
        "errors": context.errors,
        "state": context.state_snapshot(),
    });
    if let Some(catalog) = catalog {
        output["catalog"] = serde_json::to_value(catalog.to_document())?;
    }
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_cmd(args: ResolveArgs) -> Result<()> {
    let config = load_config()?;
    let executor = Executor::with_builtin_actions(Services::in_memory(config))?;
    let state = Arc::new(MemoryStateStore::with_state(optional_document(args.state.as_deref())?));
    let context = ExecutionContext::new(state).with_event(optional_document(args.event.as_deref())?);

    let local_store = executor.services().storage.snapshot(StorageArea::Local);
    let scope = ResolveScope::from_context(&context, None, local_store);
    let resolved = executor.resolver().resolve(&Value::String(args.template), &scope)?;
    println!("{}", serde_json::to_string_pretty(&resolved.unwrap_or(Value::Null))?);
    Ok(())
}

fn validate_cmd(args: ValidateArgs) -> Result<()> {
    let config = load_config()?;
    let executor = Executor::with_builtin_actions(Services::in_memory(config))?;
    let bundle = parse_pipeline_file(&args.pipeline)?;

    let mut invalid = 0usize;
    for (name, pipeline) in &bundle.pipelines {
        let problems = executor.validate_pipeline(pipeline);
        if problems.is_empty() {
            println!("{name}: ok ({} actions)", pipeline.actions.len());
        } else {
            invalid += 1;
            for problem in problems {
                println!("{name}: {problem}");
            }
        }
    }
    if invalid > 0 {
        bail!("{invalid} of {} pipelines are invalid", bundle.pipelines.len());
    }
    Ok(())
}

fn select_pipeline(path: &Path, name: Option<&str>) -> Result<Pipeline> {
    let mut bundle = parse_pipeline_file(path)?;
    match name {
        Some(name) => bundle
            .pipelines
            .shift_remove(name)
            .with_context(|| format!("pipeline '{name}' not found in {}", path.display())),
        None => bundle
            .pipelines
            .shift_remove_index(0)
            .map(|(_, pipeline)| pipeline)
            .with_context(|| format!("no pipelines found in {}", path.display())),
    }
}

fn read_document(path: &Path) -> Result<serde_yaml::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Reads an optional JSON/YAML payload; no path yields `{}`.
fn optional_document(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(json!({}));
    };
    serde_yaml::from_value(read_document(path)?).with_context(|| format!("Failed to convert {}", path.display()))
}
