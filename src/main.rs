use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use conduit_config::FlowDef;
use conduit_connection::{ConnectionProvider, FileConnections, MemoryConnections};
use conduit_engine::{DEFAULT_MAX_CONCURRENCY, DEFAULT_NODE_TIMEOUT_MS, Engine, EngineConfig};
use conduit_http::ReqwestClient;
use conduit_store::{ExecutionStore, SqliteStore};

/// Conduit - run flows of HTTP calls and data transforms
#[derive(Parser)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  settings: Settings,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args)]
struct Settings {
  /// Path to the data directory (default: ~/.conduit)
  #[arg(long, global = true, env = "CONDUIT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Connections file (default: <data-dir>/connections.json when present)
  #[arg(long, global = true, env = "CONDUIT_CONNECTIONS")]
  connections: Option<PathBuf>,

  /// SQLite URL where execution records are kept, e.g. sqlite://runs.db?mode=rwc
  #[arg(long, global = true, env = "CONDUIT_DATABASE")]
  database: Option<String>,

  /// Nodes of one run allowed in flight at once
  #[arg(long, global = true, env = "CONDUIT_MAX_CONCURRENCY", default_value_t = DEFAULT_MAX_CONCURRENCY)]
  max_concurrency: usize,

  /// Timeout for nodes without their own timeoutMs
  #[arg(long, global = true, env = "CONDUIT_NODE_TIMEOUT_MS", default_value_t = DEFAULT_NODE_TIMEOUT_MS)]
  node_timeout_ms: u64,

  /// Wall-clock limit for a whole run
  #[arg(long, global = true, env = "CONDUIT_RUN_TIMEOUT_MS")]
  run_timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a flow or a single node
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// List recorded executions of a flow, newest first
  History {
    /// The flow ID
    flow_id: String,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an entire flow; the payload is read from stdin
  Flow {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,
  },

  /// Run a single node; its context is read from stdin
  Node {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    /// The node ID to execute
    #[arg(long)]
    node: String,
  },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let Some(command) = cli.command else {
    println!("conduit - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Run {
        target: RunTarget::Flow { flow_file },
      } => run_flow(&cli.settings, &flow_file).await,
      Commands::Run {
        target: RunTarget::Node { flow_file, node },
      } => run_node(&cli.settings, &flow_file, &node).await,
      Commands::History { flow_id } => history(&cli.settings, &flow_id).await,
    }
  })
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

async fn run_flow(settings: &Settings, flow_file: &Path) -> Result<()> {
  let flow = read_flow(flow_file).await?;
  eprintln!("Loaded flow: {} ({} nodes)", flow.name, flow.nodes().len());

  let payload = read_json_from_stdin()?;

  let mut engine = settings.engine()?;
  if let Some(store) = settings.store().await? {
    engine = engine.with_execution_store(store);
  }

  let result = engine
    .run(&flow, payload, cancel_on_ctrl_c())
    .await
    .context("flow run failed")?;

  eprintln!(
    "Execution {} finished: {:?}",
    result.execution_id, result.status
  );
  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(())
}

async fn run_node(settings: &Settings, flow_file: &Path, node_id: &str) -> Result<()> {
  let flow = read_flow(flow_file).await?;
  eprintln!("Running node: {}", node_id);

  let context = match read_json_from_stdin()? {
    serde_json::Value::Object(context) => context,
    other => bail!("node context must be a JSON object, got: {}", other),
  };

  let outcome = settings
    .engine()?
    .run_node(&flow, node_id, context, cancel_on_ctrl_c())
    .await
    .context("node run failed")?;

  println!("{}", serde_json::to_string_pretty(&outcome)?);

  Ok(())
}

async fn history(settings: &Settings, flow_id: &str) -> Result<()> {
  let store = settings
    .store()
    .await?
    .context("--database is required to read execution history")?;

  let executions = store
    .list_executions(flow_id)
    .await
    .with_context(|| format!("failed to list executions of flow '{}'", flow_id))?;

  eprintln!("{} execution(s) of flow {}", executions.len(), flow_id);
  println!("{}", serde_json::to_string_pretty(&executions)?);

  Ok(())
}

impl Settings {
  fn data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(data_dir) => Ok(data_dir.clone()),
      None => dirs::home_dir()
        .map(|home| home.join(".conduit"))
        .context("could not determine home directory"),
    }
  }

  fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      max_concurrency: self.max_concurrency,
      node_timeout_ms: self.node_timeout_ms,
      run_timeout_ms: self.run_timeout_ms,
    }
  }

  fn connections(&self) -> Result<Arc<dyn ConnectionProvider>> {
    let path = match &self.connections {
      Some(path) => Some(path.clone()),
      None => {
        let default = self.data_dir()?.join("connections.json");
        default.exists().then_some(default)
      }
    };

    Ok(match path {
      Some(path) => {
        eprintln!("Using connections from {}", path.display());
        Arc::new(FileConnections::new(path))
      }
      None => Arc::new(MemoryConnections::new()),
    })
  }

  fn engine(&self) -> Result<Engine> {
    Ok(
      Engine::new(self.connections()?, Arc::new(ReqwestClient::default()))
        .with_config(self.engine_config()),
    )
  }

  async fn store(&self) -> Result<Option<Arc<SqliteStore>>> {
    let Some(url) = &self.database else {
      return Ok(None);
    };
    let store = SqliteStore::connect(url)
      .await
      .with_context(|| format!("failed to open database: {}", url))?;
    Ok(Some(Arc::new(store)))
  }
}

async fn read_flow(flow_file: &Path) -> Result<FlowDef> {
  let content = tokio::fs::read_to_string(flow_file)
    .await
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))
}

/// Cancel the run on Ctrl-C; in-flight nodes are recorded as cancelled.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Cancelling run...");
      token.cancel();
    }
  });
  cancel
}

fn read_json_from_stdin() -> Result<serde_json::Value> {
  if io::stdin().is_terminal() {
    // Nothing piped in.
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read JSON from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse JSON from stdin")
  }
}
