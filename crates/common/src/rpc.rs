//! Request and response bodies shared by the master and worker services

use crate::TaskSet;
use serde::{Deserialize, Serialize};

/// Sent by a worker when it registers with the master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Address the master can reach this worker's job endpoint on
    pub address: String,
}

/// Master's reply to a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub node_id: i32,
}

/// Master's reply to a work request; `item_id` of −1 means the cursor is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoItemReply {
    pub item_id: i64,
}

/// Client request to start a job on the master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJobRequest {
    pub job_name: String,
    pub task_set: TaskSet,
}

/// Master's reply once a job has been committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJobReply {
    pub job_id: i32,
}
