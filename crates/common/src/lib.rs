/// Common types shared by the videogrid master, workers, and engine
use serde::{Deserialize, Serialize};

mod config;
pub mod rpc;

pub use config::{ConfigError, EngineConfig};

/// Execution resource kind an evaluator runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Gpu,
}

/// A concrete execution resource on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_type: DeviceType,
    pub device_id: i32,
}

impl Device {
    /// The single CPU device of a node
    pub const CPU: Device = Device {
        device_type: DeviceType::Cpu,
        device_id: 0,
    };

    #[must_use]
    pub fn gpu(device_id: i32) -> Self {
        Self {
            device_type: DeviceType::Gpu,
            device_id,
        }
    }
}

/// One input column-set of a task: the upstream table and the row indices to read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSample {
    pub job_id: i32,
    pub table_id: i32,
    pub column_ids: Vec<i32>,
    pub rows: Vec<i64>,
}

/// A request to produce the rows of one output table by pulling its samples
/// through the evaluator chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub samples: Vec<TableSample>,
}

/// Reference from an evaluator to the columns of a previous evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorInput {
    pub evaluator_index: usize,
    pub columns: Vec<String>,
}

/// One stage of the evaluator chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorSpec {
    pub name: String,
    pub device_type: DeviceType,
    pub device_count: i32,
    #[serde(default)]
    pub kernel_args: Vec<u8>,
    #[serde(default)]
    pub inputs: Vec<EvaluatorInput>,
}

/// The full description of a job: tasks plus the evaluator chain they run through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSet {
    pub tasks: Vec<Task>,
    pub evaluators: Vec<EvaluatorSpec>,
}

/// Parameters the master sends to each worker for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    pub job_id: i32,
    pub job_name: String,
    pub task_set: TaskSet,
}

/// Column value type; output typing is inferred downstream, so committed
/// descriptors always carry `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: i32,
    pub name: String,
    pub column_type: ColumnType,
}

/// Persistent record of a completed job, written to the store on commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: i32,
    pub name: String,
    pub io_item_size: i64,
    pub work_item_size: i64,
    pub num_nodes: usize,
    pub columns: Vec<Column>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i32,
    pub name: String,
}

/// The database manifest: every committed job by name, with monotonic ids.
/// Mutated only by the master, which runs one job at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub next_job_id: i32,
    pub jobs: Vec<JobRecord>,
}

impl DatabaseMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next committed job will receive
    #[must_use]
    pub fn peek_next_job_id(&self) -> i32 {
        self.next_job_id
    }

    /// Allocate an id for `name` and record the job
    pub fn add_job(&mut self, name: &str) -> i32 {
        let id = self.next_job_id;
        self.next_job_id += 1;
        self.jobs.push(JobRecord {
            id,
            name: name.to_string(),
        });
        id
    }

    #[must_use]
    pub fn job_by_name(&self, name: &str) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.name == name)
    }
}
