//! Five-stage worker pipeline
//!
//! ```text
//! master ──next io item──► control loop
//!                              │ load-work entries
//!                              ▼
//!   [load × L] ──► [pre-eval × P] ──► [eval × P] ──► [post-eval × P] ──► [save × S] ──► store
//!       MPMC           MPMC            per-PU           per-PU              MPMC
//! ```
//!
//! Each stage is a pool of OS threads joined by bounded queues. The shared
//! load and initial-eval queues balance items across the pools; each PU owns
//! a private pre→eval and eval→post queue pair, so a PU's sub-pipeline is a
//! strict FIFO. Backpressure comes from the queue bounds plus the control
//! loop's in-flight cap, which keeps a slow PU from monopolising memory.
//!
//! Termination is a sentinel cascade: once the master's cursor is exhausted
//! the driver pushes exactly one `EndOfStream` per consumer thread into each
//! stage's input queue and joins that stage before terminating the next, so
//! no stage ever observes input after its producer has exited. Stage threads
//! exit on sentinel without forwarding; the driver owns every injection.

mod evaluate;
mod load;
mod post_evaluate;
mod pre_evaluate;
mod save;

use crate::context::EngineContext;
use crate::error::PipelineError;
use crate::kernel::{bind_kernels, BoundKernel};
use crate::planner::{plan_io_items, JobPlan};
use crate::profiler::{write_profiler_artifact, Profiler};
use crate::queue::{WorkQueue, WorkUnit};
use crate::work::{EvalWorkEntry, LoadWorkEntry};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use videogrid_common::{Device, DeviceType, JobParameters};
use videogrid_storage::{paths, StorageBackend};

/// Where the control loop pulls I/O item ids from
pub trait WorkSource: Send {
    /// Next item id to process, or −1 when the cursor is exhausted
    fn next_io_item(&mut self) -> Result<i64, PipelineError>;
}

/// Serves the whole item range in order; used for single-node runs and tests
pub struct LocalWorkSource {
    next: i64,
    total: i64,
}

impl LocalWorkSource {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            next: 0,
            total: total as i64,
        }
    }
}

impl WorkSource for LocalWorkSource {
    fn next_io_item(&mut self) -> Result<i64, PipelineError> {
        if self.next < self.total {
            let id = self.next;
            self.next += 1;
            Ok(id)
        } else {
            Ok(-1)
        }
    }
}

/// Item accounting at job completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub accepted_items: i64,
    pub retired_items: i64,
}

/// Execute one job's pipeline to completion and write the profile artifact.
///
/// Binding and planning failures surface before any thread starts. A failing
/// stage thread terminates alone; the cascade still drains the remaining
/// stages before the first error is returned.
pub fn run_job(
    ctx: &EngineContext,
    storage: Arc<dyn StorageBackend>,
    params: &JobParameters,
    node_id: i32,
    source: &mut dyn WorkSource,
) -> Result<JobReport, PipelineError> {
    let config = ctx.config();
    let bound = bind_kernels(ctx, &params.task_set.evaluators)?;
    let JobPlan {
        io_items,
        load_work,
    } = plan_io_items(&params.task_set, config)?;

    info!(
        job_id = params.job_id,
        job_name = %params.job_name,
        io_items = io_items.len(),
        "starting job pipeline"
    );

    let base_time = Instant::now();
    let io_items = Arc::new(io_items);
    let retired_items = Arc::new(AtomicI64::new(0));
    let work_item_size = config.work_item_size.max(1) as usize;
    let in_flight_limit = config.in_flight_limit().max(1);

    // The load queue has headroom for the sentinels so the control loop's
    // pushes never block while the in-flight cap holds.
    let load_queue: WorkQueue<LoadWorkEntry> =
        WorkQueue::bounded(in_flight_limit + config.load_workers_per_node);
    let initial_eval_queue: WorkQueue<EvalWorkEntry> = WorkQueue::bounded(in_flight_limit);
    let eval_queues: Vec<WorkQueue<EvalWorkEntry>> = (0..config.pus_per_node)
        .map(|_| WorkQueue::bounded(config.tasks_in_queue_per_pu))
        .collect();
    let post_queues: Vec<WorkQueue<EvalWorkEntry>> = (0..config.pus_per_node)
        .map(|_| WorkQueue::bounded(config.tasks_in_queue_per_pu))
        .collect();
    let save_queue: WorkQueue<EvalWorkEntry> = WorkQueue::bounded(in_flight_limit);

    let decode = bound[0].clone();
    let chain: Vec<BoundKernel> = bound[1..].to_vec();

    let load_handles: Vec<_> = (0..config.load_workers_per_node)
        .map(|worker_index| {
            let stage = load::LoadStage {
                worker_index,
                storage: storage.clone(),
                profiler: Profiler::new(base_time),
                input: load_queue.clone(),
                output: initial_eval_queue.clone(),
            };
            std::thread::spawn(move || load::run(stage))
        })
        .collect();

    let pre_handles: Vec<_> = (0..config.pus_per_node)
        .map(|pu| {
            let stage = pre_evaluate::PreEvaluateStage {
                pu,
                work_item_size,
                decode: decode.clone(),
                device: pu_device(&bound, pu),
                profiler: Profiler::new(base_time),
                input: initial_eval_queue.clone(),
                output: eval_queues[pu].clone(),
            };
            std::thread::spawn(move || pre_evaluate::run(stage))
        })
        .collect();

    let eval_handles: Vec<_> = (0..config.pus_per_node)
        .map(|pu| {
            let stage = evaluate::EvaluateStage {
                pu,
                work_item_size,
                chain: chain.clone(),
                profiler: Profiler::new(base_time),
                input: eval_queues[pu].clone(),
                output: post_queues[pu].clone(),
            };
            std::thread::spawn(move || evaluate::run(stage))
        })
        .collect();

    let post_handles: Vec<_> = (0..config.pus_per_node)
        .map(|pu| {
            let stage = post_evaluate::PostEvaluateStage {
                pu,
                io_items: io_items.clone(),
                warmup_size: config.warmup_size,
                profiler: Profiler::new(base_time),
                input: post_queues[pu].clone(),
                output: save_queue.clone(),
            };
            std::thread::spawn(move || post_evaluate::run(stage))
        })
        .collect();

    let save_handles: Vec<_> = (0..config.save_workers_per_node)
        .map(|worker_index| {
            let stage = save::SaveStage {
                worker_index,
                job_id: params.job_id,
                io_items: io_items.clone(),
                storage: storage.clone(),
                retired_items: retired_items.clone(),
                profiler: Profiler::new(base_time),
                input: save_queue.clone(),
            };
            std::thread::spawn(move || save::run(stage))
        })
        .collect();

    let start_time_ns = base_time.elapsed().as_nanos() as i64;

    // Pull work whenever the in-flight window has room; exit on cursor
    // exhaustion. Errors here still fall through to the cascade so the
    // stage threads drain.
    let mut accepted_items: i64 = 0;
    let mut first_error: Option<PipelineError> = None;
    loop {
        let in_flight = accepted_items - retired_items.load(Ordering::SeqCst);
        if in_flight >= in_flight_limit as i64 {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        match source.next_io_item() {
            Ok(id) if id < 0 => break,
            Ok(id) => match load_work.get(id as usize) {
                Some(entry) => {
                    if let Err(e) = load_queue.push(WorkUnit::Work(entry.clone())) {
                        first_error = Some(e.into());
                        break;
                    }
                    accepted_items += 1;
                }
                None => {
                    first_error = Some(PipelineError::WorkSource(format!(
                        "item id {id} outside the planned range"
                    )));
                    break;
                }
            },
            Err(e) => {
                first_error = Some(e);
                break;
            }
        }
    }

    // Sentinel cascade in pipeline order: terminate and join each stage
    // before its consumer, one sentinel per thread.
    let mut load_profilers = Vec::new();
    push_sentinels(&load_queue, config.load_workers_per_node, &mut first_error);
    join_stage("load", load_handles, &mut load_profilers, &mut first_error);

    let mut pre_profilers = Vec::new();
    push_sentinels(&initial_eval_queue, config.pus_per_node, &mut first_error);
    join_stage("pre-eval", pre_handles, &mut pre_profilers, &mut first_error);

    let mut eval_profilers = Vec::new();
    for queue in &eval_queues {
        push_sentinels(queue, 1, &mut first_error);
    }
    join_stage("eval", eval_handles, &mut eval_profilers, &mut first_error);

    let mut post_profilers = Vec::new();
    for queue in &post_queues {
        push_sentinels(queue, 1, &mut first_error);
    }
    join_stage("post-eval", post_handles, &mut post_profilers, &mut first_error);

    let mut save_profilers = Vec::new();
    push_sentinels(&save_queue, config.save_workers_per_node, &mut first_error);
    join_stage("save", save_handles, &mut save_profilers, &mut first_error);

    let end_time_ns = base_time.elapsed().as_nanos() as i64;

    if let Some(err) = first_error {
        return Err(err);
    }

    let retired = retired_items.load(Ordering::SeqCst);
    if retired != accepted_items {
        warn!(
            accepted = accepted_items,
            retired, "item accounting mismatch at job end"
        );
    }
    debug_assert_eq!(retired, accepted_items);

    write_profiler_artifact(
        storage.as_ref(),
        &paths::job_profiler_path(params.job_id, node_id),
        i64::from(node_id),
        start_time_ns,
        end_time_ns,
        &load_profilers,
        &pre_profilers,
        &eval_profilers,
        &post_profilers,
        &save_profilers,
    )?;

    info!(
        job_id = params.job_id,
        accepted = accepted_items,
        retired,
        "job pipeline complete"
    );
    Ok(JobReport {
        accepted_items,
        retired_items: retired,
    })
}

/// Device a PU's entries are staged on: the PU's slot in the first
/// device-typed evaluator's assignment, or the CPU for all-CPU chains
fn pu_device(bound: &[BoundKernel], pu: usize) -> Device {
    for kernel in bound {
        let devices = &kernel.config.devices;
        if !devices.is_empty() && devices.iter().any(|d| d.device_type == DeviceType::Gpu) {
            return devices[pu % devices.len()];
        }
    }
    Device::CPU
}

fn push_sentinels<T>(
    queue: &WorkQueue<T>,
    count: usize,
    first_error: &mut Option<PipelineError>,
) {
    for _ in 0..count {
        if let Err(e) = queue.push(WorkUnit::EndOfStream) {
            if first_error.is_none() {
                *first_error = Some(e.into());
            }
            return;
        }
    }
}

fn join_stage(
    stage: &'static str,
    handles: Vec<JoinHandle<Result<Profiler, PipelineError>>>,
    profilers: &mut Vec<Profiler>,
    first_error: &mut Option<PipelineError>,
) {
    for handle in handles {
        match handle.join() {
            Ok(Ok(profiler)) => profilers.push(profiler),
            Ok(Err(e)) => {
                error!(stage, error = %e, "stage thread failed");
                if first_error.is_none() {
                    *first_error = Some(e);
                }
            }
            Err(_) => {
                error!(stage, "stage thread panicked");
                if first_error.is_none() {
                    *first_error = Some(PipelineError::StageThreadPanicked { stage });
                }
            }
        }
    }
}
