//! Master binary entry point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use videogrid_common::EngineConfig;
use videogrid_engine::{builtin, EngineContext, EvaluatorRegistry, KernelRegistry};
use videogrid_master::{start_server, MasterState};
use videogrid_storage::{FilesystemStorage, StorageBackend};

#[derive(Debug, Parser)]
#[command(name = "videogrid-master", about = "videogrid master node")]
struct Args {
    /// Bind address for the master's endpoints
    #[arg(long, default_value = "0.0.0.0:5001")]
    bind: String,

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
                "videogrid_master=info,videogrid_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };

    // The master only reads evaluator metadata, but it shares the worker's
    // catalogue so descriptors and plans agree across the cluster.
    let mut evaluators = EvaluatorRegistry::new();
    let mut kernels = KernelRegistry::new();
    builtin::register_builtins(&mut evaluators, &mut kernels)?;
    let ctx = Arc::new(EngineContext::new(config, evaluators, kernels));

    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemStorage::new(&args.storage_root)?);

    let state = MasterState::new(ctx, storage);
    start_server(&args.bind, state).await?;
    Ok(())
}
