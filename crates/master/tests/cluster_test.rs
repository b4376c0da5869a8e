//! Cluster integration tests: real master and worker servers over loopback

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use videogrid_common::rpc::{NewJobRequest, Registration, WorkerInfo};
use videogrid_common::{
    DeviceType, EngineConfig, EvaluatorSpec, JobDescriptor, TableSample, Task, TaskSet,
};
use videogrid_engine::{builtin, EngineContext, EvaluatorInfo, EvaluatorRegistry, KernelRegistry};
use videogrid_master::{start_server as start_master, MasterState};
use videogrid_storage::{
    encode_column_blob, paths, read_all, read_database_metadata, write_all, FilesystemStorage,
    StorageBackend,
};
use videogrid_worker::{start_server as start_worker, MasterClient, WorkerState};

fn cluster_config() -> EngineConfig {
    EngineConfig {
        io_item_size: 2,
        ..EngineConfig::default()
    }
}

fn engine_context(extra_evaluators: &[(&str, &str)]) -> Arc<EngineContext> {
    let mut evaluators = EvaluatorRegistry::new();
    let mut kernels = KernelRegistry::new();
    builtin::register_builtins(&mut evaluators, &mut kernels).unwrap();
    for (name, output) in extra_evaluators {
        evaluators
            .register(EvaluatorInfo::new(*name, vec![(*output).to_string()]))
            .unwrap();
    }
    Arc::new(EngineContext::new(cluster_config(), evaluators, kernels))
}

fn seed_table(root: &std::path::Path, num_rows: i64) {
    let storage = FilesystemStorage::new(root).unwrap();
    let rows: Vec<Vec<u8>> = (0..num_rows).map(|i| format!("frame-{i}").into_bytes()).collect();
    write_all(
        &storage,
        &paths::table_column_path(0, 0, 0),
        &encode_column_blob(&rows),
    )
    .unwrap();
}

fn decode_task_set(num_rows: i64, evaluator: &str) -> TaskSet {
    TaskSet {
        tasks: vec![Task {
            samples: vec![TableSample {
                job_id: 0,
                table_id: 0,
                column_ids: vec![0],
                rows: (0..num_rows).collect(),
            }],
        }],
        evaluators: vec![EvaluatorSpec {
            name: evaluator.to_string(),
            device_type: DeviceType::Cpu,
            device_count: 1,
            kernel_args: Vec::new(),
            inputs: Vec::new(),
        }],
    }
}

async fn spawn_master(addr: &'static str, root: &std::path::Path, ctx: Arc<EngineContext>) {
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemStorage::new(root).unwrap());
    let state = MasterState::new(ctx, storage);
    tokio::spawn(async move {
        start_master(addr, state).await.unwrap();
    });
}

async fn spawn_registered_worker(
    addr: &'static str,
    master_addr: &str,
    root: &std::path::Path,
    ctx: Arc<EngineContext>,
) {
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemStorage::new(root).unwrap());
    let master = MasterClient::new(format!("http://{master_addr}"));
    let node_id = master.register_worker(addr).await.unwrap();
    let state = WorkerState::new(ctx, storage, master, node_id);
    tokio::spawn(async move {
        start_worker(addr, state).await.unwrap();
    });
}

#[tokio::test]
async fn job_runs_across_the_cluster_and_commits_metadata() {
    let dir = tempfile::tempdir().unwrap();
    seed_table(dir.path(), 5);

    spawn_master("127.0.0.1:19421", dir.path(), engine_context(&[])).await;
    sleep(Duration::from_millis(300)).await;
    spawn_registered_worker("127.0.0.1:19422", "127.0.0.1:19421", dir.path(), engine_context(&[]))
        .await;
    sleep(Duration::from_millis(300)).await;

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:19421/api/v1/jobs")
        .json(&NewJobRequest {
            job_name: "mean".to_string(),
            task_set: decode_task_set(5, builtin::DECODE_EVALUATOR),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let reply: serde_json::Value = response.json().await.unwrap();
    assert_eq!(reply["job_id"], 0);

    let storage = FilesystemStorage::new(dir.path()).unwrap();

    // Output rows cover the task's range across the 2/2/1 item split.
    for item_id in 0..3 {
        assert!(storage
            .exists(&paths::output_item_path(0, 0, item_id))
            .unwrap());
    }

    // Manifest and descriptor are committed.
    let meta = read_database_metadata(&storage).unwrap();
    assert_eq!(meta.peek_next_job_id(), 1);
    assert_eq!(meta.job_by_name("mean").unwrap().id, 0);

    let descriptor: JobDescriptor =
        serde_json::from_slice(&read_all(&storage, &paths::job_descriptor_path(0)).unwrap())
            .unwrap();
    assert_eq!(descriptor.name, "mean");
    assert_eq!(descriptor.num_nodes, 1);
    assert_eq!(descriptor.columns.len(), 1);
    assert_eq!(descriptor.columns[0].name, builtin::FRAME_COLUMN);

    // The worker left its profile artifact under the assigned job id.
    assert!(storage.exists(&paths::job_profiler_path(0, 0)).unwrap());
}

#[tokio::test]
async fn worker_failure_aborts_the_job_and_leaves_metadata_untouched() {
    let dir = tempfile::tempdir().unwrap();
    seed_table(dir.path(), 4);

    // The master knows the evaluator; the worker does not, so its NewJob
    // fails and the fan-in aborts the commit.
    spawn_master(
        "127.0.0.1:19423",
        dir.path(),
        engine_context(&[("mystery", "blob")]),
    )
    .await;
    sleep(Duration::from_millis(300)).await;
    spawn_registered_worker("127.0.0.1:19424", "127.0.0.1:19423", dir.path(), engine_context(&[]))
        .await;
    sleep(Duration::from_millis(300)).await;

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:19423/api/v1/jobs")
        .json(&NewJobRequest {
            job_name: "mystery-run".to_string(),
            task_set: decode_task_set(4, "mystery"),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    let storage = FilesystemStorage::new(dir.path()).unwrap();
    let meta = read_database_metadata(&storage).unwrap();
    assert_eq!(meta.peek_next_job_id(), 0, "no job id consumed");
    assert!(meta.job_by_name("mystery-run").is_none());
    assert!(!storage.exists(&paths::job_descriptor_path(0)).unwrap());
}

#[tokio::test]
async fn empty_worker_pool_still_commits_the_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    seed_table(dir.path(), 3);

    spawn_master("127.0.0.1:19425", dir.path(), engine_context(&[])).await;
    sleep(Duration::from_millis(300)).await;

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:19425/api/v1/jobs")
        .json(&NewJobRequest {
            job_name: "idle".to_string(),
            task_set: decode_task_set(3, builtin::DECODE_EVALUATOR),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let storage = FilesystemStorage::new(dir.path()).unwrap();
    let meta = read_database_metadata(&storage).unwrap();
    assert_eq!(meta.job_by_name("idle").unwrap().id, 0);
    assert!(storage.exists(&paths::job_descriptor_path(0)).unwrap());
    // No rows were processed: nothing pulled the cursor.
    assert!(!storage.exists(&paths::output_item_path(0, 0, 0)).unwrap());
}

#[tokio::test]
async fn registration_assigns_sequential_node_ids() {
    let dir = tempfile::tempdir().unwrap();
    spawn_master("127.0.0.1:19426", dir.path(), engine_context(&[])).await;
    sleep(Duration::from_millis(300)).await;

    let client = reqwest::Client::new();
    for expected in 0..3 {
        let reply: Registration = client
            .post("http://127.0.0.1:19426/api/v1/workers/register")
            .json(&WorkerInfo {
                address: format!("127.0.0.1:2{expected}"),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply.node_id, expected);
    }
}
