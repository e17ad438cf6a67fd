use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tideline_cache::SqliteKvStore;
use tideline_config::{WorkflowDef, WorkflowRef};
use tideline_engine::{EngineConfig, RunRequest, TriggerEngine, TriggerRegistry, TriggerSpec};
use tideline_trigger::{TriggerEvent, WebhookRequest};

/// Tideline - deduplicated trigger runs for workflow automation
#[derive(Parser)]
#[command(name = "tideline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tideline)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Directory workflow paths are relative to (default: the workflow's directory)
  #[arg(long, global = true)]
  workflows_root: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run one trigger of a workflow and print the new items
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Name of the trigger under `on`
    #[arg(long)]
    trigger: String,

    /// Deliver a webhook request read from this JSON file instead of a schedule tick
    #[arg(long)]
    webhook: Option<PathBuf>,
  },

  /// Print the context a trigger would run with
  Context {
    workflow_file: PathBuf,

    #[arg(long)]
    trigger: String,
  },

  /// Clear a trigger's cache so its next run is a first run
  Reset {
    workflow_file: PathBuf,

    #[arg(long)]
    trigger: String,
  },
}

/// Webhook request as stored in a `--webhook` file.
#[derive(Deserialize)]
struct RequestFile {
  path: String,
  #[serde(default = "default_method")]
  method: String,
  #[serde(default)]
  body: serde_json::Value,
  #[serde(default)]
  headers: BTreeMap<String, String>,
}

fn default_method() -> String {
  "post".to_string()
}

/// A workflow file loaded from disk.
struct LoadedWorkflow {
  reference: WorkflowRef,
  def: WorkflowDef,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tideline"),
  };

  let Some(command) = cli.command else {
    println!("tideline - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let root = cli.workflows_root.as_deref();
    match command {
      Commands::Run {
        workflow_file,
        trigger,
        webhook,
      } => run_trigger(&workflow_file, root, &trigger, webhook.as_deref(), &data_dir).await,
      Commands::Context {
        workflow_file,
        trigger,
      } => show_context(&workflow_file, root, &trigger, &data_dir).await,
      Commands::Reset {
        workflow_file,
        trigger,
      } => reset_trigger(&workflow_file, root, &trigger, &data_dir).await,
    }
  })
}

async fn open_engine(data_dir: &Path) -> Result<TriggerEngine> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_path = data_dir.join("cache.db");
  let store = SqliteKvStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open cache: {}", db_path.display()))?;

  Ok(TriggerEngine::new(
    Arc::new(store),
    TriggerRegistry::with_builtins(),
    EngineConfig::default(),
  ))
}

async fn load_workflow(workflow_file: &Path, root: Option<&Path>) -> Result<LoadedWorkflow> {
  let content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let def = WorkflowDef::from_json_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  let relative = match root {
    Some(root) => workflow_file
      .strip_prefix(root)
      .with_context(|| format!("{} is not under {}", workflow_file.display(), root.display()))?
      .to_path_buf(),
    None => workflow_file
      .file_name()
      .map(PathBuf::from)
      .context("workflow path has no file name")?,
  };
  let reference = WorkflowRef::new(relative.to_string_lossy())
    .context("invalid workflow path")?;

  Ok(LoadedWorkflow { reference, def })
}

async fn read_event(webhook: Option<&Path>) -> Result<TriggerEvent> {
  let Some(path) = webhook else {
    return Ok(TriggerEvent::Schedule);
  };

  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read webhook request: {}", path.display()))?;
  let file: RequestFile = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse webhook request: {}", path.display()))?;

  let request = WebhookRequest::new(&file.path, &file.method, file.body).with_headers(file.headers);
  Ok(TriggerEvent::Webhook { request })
}

async fn run_trigger(
  workflow_file: &Path,
  root: Option<&Path>,
  trigger: &str,
  webhook: Option<&Path>,
  data_dir: &Path,
) -> Result<()> {
  let workflow = load_workflow(workflow_file, root).await?;
  let options = workflow.def.trigger(trigger)?.clone();
  let event = read_event(webhook).await?;
  let engine = open_engine(data_dir).await?;

  // Ctrl-C aborts the fetch without touching the cache
  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_signal.cancel();
    }
  });

  let result = engine
    .run_with_cancel(
      RunRequest {
        trigger: TriggerSpec::new(trigger, options),
        workflow: workflow.reference,
        event,
      },
      cancel,
    )
    .await
    .with_context(|| format!("trigger '{}' failed", trigger))?;

  let items: Vec<serde_json::Value> = result.items.into_iter().map(|i| i.into_value()).collect();
  println!(
    "{}",
    serde_json::to_string_pretty(&serde_json::json!({ "items": items }))?
  );

  Ok(())
}

async fn show_context(
  workflow_file: &Path,
  root: Option<&Path>,
  trigger: &str,
  data_dir: &Path,
) -> Result<()> {
  let workflow = load_workflow(workflow_file, root).await?;
  let options = workflow.def.trigger(trigger)?;
  let engine = open_engine(data_dir).await?;

  let context = engine
    .context(&workflow.reference, trigger, options)
    .await
    .context("failed to resolve trigger context")?;

  println!("{}", serde_json::to_string_pretty(&context)?);
  Ok(())
}

async fn reset_trigger(
  workflow_file: &Path,
  root: Option<&Path>,
  trigger: &str,
  data_dir: &Path,
) -> Result<()> {
  let workflow = load_workflow(workflow_file, root).await?;
  let options = workflow.def.trigger(trigger)?;
  let engine = open_engine(data_dir).await?;

  engine
    .cache(&workflow.reference, trigger, options)?
    .reset()
    .await
    .context("failed to reset trigger cache")?;

  eprintln!("Reset cache for trigger '{}' in {}", trigger, workflow.reference);
  Ok(())
}
