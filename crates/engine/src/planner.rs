//! I/O item planner
//!
//! Slices a task set into I/O items and the matching load-work entries. The
//! output is a pure function of the task set and the engine constants: the
//! master and every worker plan independently and must agree byte for byte,
//! because the master allocates item ids while workers index the load-work
//! array by id.

use crate::error::PlanError;
use crate::work::{IoItem, LoadWorkEntry, SampleRows};
use videogrid_common::{EngineConfig, TaskSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub io_items: Vec<IoItem>,
    pub load_work: Vec<LoadWorkEntry>,
}

pub fn plan_io_items(task_set: &TaskSet, config: &EngineConfig) -> Result<JobPlan, PlanError> {
    let io_item_size = config.io_item_size;
    let warmup_size = config.warmup_size;

    let mut io_items = Vec::new();
    let mut load_work = Vec::new();

    for (table_id, task) in task_set.tasks.iter().enumerate() {
        let first = task.samples.first().ok_or_else(|| PlanError::MalformedTask {
            task: table_id,
            reason: "task has no samples".to_string(),
        })?;

        let rows_in_task = first.rows.len() as i64;
        if rows_in_task == 0 {
            return Err(PlanError::MalformedTask {
                task: table_id,
                reason: "task has no rows".to_string(),
            });
        }
        for (sample_idx, sample) in task.samples.iter().enumerate() {
            if sample.rows.len() as i64 != rows_in_task {
                return Err(PlanError::InconsistentSamples {
                    task: table_id,
                    reason: format!(
                        "sample {sample_idx} has {} rows, sample 0 has {rows_in_task}",
                        sample.rows.len()
                    ),
                });
            }
        }

        let mut item_id = 0i64;
        let mut allocated_rows = 0i64;
        while allocated_rows < rows_in_task {
            let rows_to_allocate = io_item_size.min(rows_in_task - allocated_rows);
            let start_row = allocated_rows;
            let end_row = allocated_rows + rows_to_allocate;

            io_items.push(IoItem {
                table_id: table_id as i32,
                item_id,
                start_row,
                end_row,
            });
            item_id += 1;

            // Extend each sample's window backwards for warmup context.
            let load_start = (start_row - warmup_size).max(0);
            let samples = task
                .samples
                .iter()
                .map(|sample| SampleRows {
                    job_id: sample.job_id,
                    table_id: sample.table_id,
                    column_ids: sample.column_ids.clone(),
                    rows: sample.rows[load_start as usize..end_row as usize].to_vec(),
                })
                .collect();
            load_work.push(LoadWorkEntry {
                io_item_index: io_items.len() - 1,
                samples,
            });

            allocated_rows += rows_to_allocate;
        }
    }

    Ok(JobPlan { io_items, load_work })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use videogrid_common::{Task, TableSample};

    fn task_with_rows(rows: Vec<i64>) -> Task {
        Task {
            samples: vec![TableSample {
                job_id: 0,
                table_id: 0,
                column_ids: vec![0],
                rows,
            }],
        }
    }

    fn set_of(tasks: Vec<Task>) -> TaskSet {
        TaskSet {
            tasks,
            evaluators: Vec::new(),
        }
    }

    fn config(io_item_size: i64, warmup_size: i64) -> EngineConfig {
        EngineConfig {
            io_item_size,
            warmup_size,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn items_partition_the_row_range_exactly_once() {
        let task_set = set_of(vec![task_with_rows((0..10).collect())]);
        let plan = plan_io_items(&task_set, &config(3, 0)).unwrap();

        assert_eq!(plan.io_items.len(), 4);
        let mut covered = Vec::new();
        for (idx, item) in plan.io_items.iter().enumerate() {
            assert_eq!(item.item_id, idx as i64);
            assert!(item.end_row - item.start_row <= 3);
            covered.extend(item.start_row..item.end_row);
        }
        assert_eq!(covered, (0..10).collect::<Vec<_>>());
        let distinct: BTreeSet<i64> = covered.into_iter().collect();
        assert_eq!(distinct.len(), 10);
    }

    #[test]
    fn small_task_yields_single_item() {
        let task_set = set_of(vec![task_with_rows(vec![5, 6, 7])]);
        let plan = plan_io_items(&task_set, &config(64, 0)).unwrap();
        assert_eq!(plan.io_items.len(), 1);
        assert_eq!(plan.io_items[0].start_row, 0);
        assert_eq!(plan.io_items[0].end_row, 3);
        assert_eq!(plan.load_work[0].samples[0].rows, vec![5, 6, 7]);
    }

    #[test]
    fn item_ids_restart_per_task() {
        let task_set = set_of(vec![
            task_with_rows((0..4).collect()),
            task_with_rows((0..3).collect()),
        ]);
        let plan = plan_io_items(&task_set, &config(2, 0)).unwrap();

        let ids: Vec<(i32, i64)> = plan
            .io_items
            .iter()
            .map(|i| (i.table_id, i.item_id))
            .collect();
        assert_eq!(ids, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        // Entry indices match positions in the flat item array.
        for (idx, entry) in plan.load_work.iter().enumerate() {
            assert_eq!(entry.io_item_index, idx);
        }
    }

    #[test]
    fn warmup_prepends_context_rows_with_clamp_at_zero() {
        let task_set = set_of(vec![task_with_rows(vec![10, 11, 12, 13])]);
        let plan = plan_io_items(&task_set, &config(2, 1)).unwrap();

        // First item starts at row 0: the clamp keeps the window non-negative.
        assert_eq!(plan.load_work[0].samples[0].rows, vec![10, 11]);
        // Second item carries one extra context row ahead of its range.
        assert_eq!(plan.load_work[1].samples[0].rows, vec![11, 12, 13]);
    }

    #[test]
    fn planning_is_deterministic() {
        let task_set = set_of(vec![
            task_with_rows((0..17).collect()),
            task_with_rows((100..123).collect()),
        ]);
        let cfg = config(4, 2);
        assert_eq!(
            plan_io_items(&task_set, &cfg).unwrap(),
            plan_io_items(&task_set, &cfg).unwrap()
        );
    }

    #[test]
    fn empty_samples_and_empty_rows_are_malformed() {
        let no_samples = set_of(vec![Task { samples: Vec::new() }]);
        assert!(matches!(
            plan_io_items(&no_samples, &config(2, 0)),
            Err(PlanError::MalformedTask { task: 0, .. })
        ));

        let no_rows = set_of(vec![task_with_rows(Vec::new())]);
        assert!(matches!(
            plan_io_items(&no_rows, &config(2, 0)),
            Err(PlanError::MalformedTask { task: 0, .. })
        ));
    }

    #[test]
    fn mismatched_sample_row_counts_are_inconsistent() {
        let mut task = task_with_rows(vec![0, 1, 2]);
        task.samples.push(TableSample {
            job_id: 0,
            table_id: 1,
            column_ids: vec![0],
            rows: vec![0, 1],
        });
        assert!(matches!(
            plan_io_items(&set_of(vec![task]), &config(2, 0)),
            Err(PlanError::InconsistentSamples { task: 0, .. })
        ));
    }
}
