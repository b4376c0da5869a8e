//! Worker binary entry point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use videogrid_common::EngineConfig;
use videogrid_engine::{builtin, EngineContext, EvaluatorRegistry, KernelRegistry};
use videogrid_storage::{FilesystemStorage, StorageBackend};
use videogrid_worker::{start_server, MasterClient, WorkerState};

#[derive(Debug, Parser)]
#[command(name = "videogrid-worker", about = "videogrid worker node")]
struct Args {
    /// Master address (host:port)
    #[arg(long, default_value = "127.0.0.1:5001")]
    master: String,

    /// Bind address for this worker's endpoints
    #[arg(long, default_value = "0.0.0.0:5002")]
    bind: String,

    /// Address the master should reach this worker on; defaults to hostname:port
    #[arg(long)]
    advertise: Option<String>,

    /// Root directory of the store
    #[arg(long, default_value = "videogrid-data")]
    storage_root: PathBuf,

    /// Optional engine configuration manifest (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "videogrid_worker=info,videogrid_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };

    let mut evaluators = EvaluatorRegistry::new();
    let mut kernels = KernelRegistry::new();
    builtin::register_builtins(&mut evaluators, &mut kernels)?;
    let ctx = Arc::new(EngineContext::new(config, evaluators, kernels));

    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemStorage::new(&args.storage_root)?);

    let advertise = match args.advertise {
        Some(address) => address,
        None => {
            let host = hostname::get()?.to_string_lossy().into_owned();
            let port = args.bind.rsplit(':').next().unwrap_or("5002");
            format!("{host}:{port}")
        }
    };

    let master = MasterClient::new(format!("http://{}", args.master));
    let node_id = master.register_worker(&advertise).await?;
    info!(node_id, advertise, "registered with master");

    let state = WorkerState::new(ctx, storage, master, node_id);
    start_server(&args.bind, state).await?;
    Ok(())
}
