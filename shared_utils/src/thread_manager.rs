//! Worker pool
//!
//! A fixed-size rayon pool runs one transcode task per work item. Tasks share
//! nothing mutable: each receives its item plus whatever read-only snapshot
//! the caller captured in the task closure.

use crate::batch::WorkItem;
use crate::conversion_types::TaskResult;
use crate::errors::{ConfigError, EncodeError, Result};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

/// Turns the CLI's concurrency request into a worker count.
///
/// An explicit request wins and must be at least 1. Otherwise `use_all_cores`
/// picks the number of logical CPUs, and the fallback is a single worker.
pub fn resolve_concurrency(
    requested: Option<usize>,
    use_all_cores: bool,
) -> std::result::Result<usize, ConfigError> {
    match requested {
        Some(0) => Err(ConfigError::InvalidConcurrency(0)),
        Some(n) => Ok(n),
        None if use_all_cores => Ok(num_cpus::get().max(1)),
        None => Ok(1),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `task` once per item on `concurrency` workers and blocks until every
/// item has a result.
///
/// Results come back in item order. A failing or panicking task only fails
/// its own item; the rest of the batch keeps going.
pub fn run_batch<F>(items: &[WorkItem], concurrency: usize, task: F) -> Result<Vec<TaskResult>>
where
    F: Fn(&WorkItem) -> TaskResult + Sync,
{
    if concurrency == 0 {
        return Err(ConfigError::InvalidConcurrency(0).into());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("transcode-worker-{}", i))
        .build()?;

    info!(
        items = items.len(),
        workers = concurrency,
        "Dispatching batch"
    );

    let results = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                panic::catch_unwind(AssertUnwindSafe(|| task(item))).unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(
                        input = %item.input_path.display(),
                        panic = %message,
                        "Transcode task panicked"
                    );
                    TaskResult::failed(
                        item.input_path.clone(),
                        EncodeError::Panicked(message).to_string(),
                    )
                })
            })
            .collect()
    });

    Ok(results)
}
