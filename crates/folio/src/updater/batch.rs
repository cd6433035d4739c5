//! Concurrent batch updates.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use time::OffsetDateTime;

use super::{BatchItem, BatchResult, FileUpdater, LockMode, UpdateReport};
use crate::error::UpdateError;
use crate::request::UpdateRequest;

type Slot = Option<Result<UpdateReport, UpdateError>>;

impl FileUpdater {
    /// Applies many changes, each through the full update pipeline.
    ///
    /// Items are independent: one failing does not stop the others. Items
    /// run concurrently on scoped worker threads, bounded by the available
    /// parallelism; updates to the same file still serialise on its lock.
    /// Results are reported in submission order and every applied item is
    /// recorded in history under the batch's shared identifier.
    pub fn batch_update(&self, requests: Vec<UpdateRequest>) -> BatchResult {
        let batch_id = self.next_batch_id();
        let total = requests.len();
        let workers = thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(total);
        tracing::info!(
            target: "folio::updater",
            batch_id = %batch_id,
            items = total,
            workers,
            "batch update starting"
        );

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Slot>> = Mutex::new((0..total).map(|_| None).collect());
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| self.drain(&requests, &next, &slots, &batch_id)));
            }
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!(
                        target: "folio::updater",
                        batch_id = %batch_id,
                        "batch worker panicked"
                    );
                }
            }
        });

        let slots = slots.into_inner().unwrap_or_else(PoisonError::into_inner);
        let results: Vec<BatchItem> = requests
            .into_iter()
            .zip(slots)
            .map(|(request, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    Err(UpdateError::WorkerPanicked {
                        path: request.target_file().to_path_buf(),
                    })
                });
                BatchItem { request, outcome }
            })
            .collect();

        let result = BatchResult::new(batch_id, results);
        tracing::info!(
            target: "folio::updater",
            batch_id = %result.batch_id,
            succeeded = result.succeeded,
            failed = result.failed,
            "batch update finished"
        );
        result
    }

    /// Worker loop: claims the next unclaimed item until none remain.
    fn drain(
        &self,
        requests: &[UpdateRequest],
        next: &AtomicUsize,
        slots: &Mutex<Vec<Slot>>,
        batch_id: &str,
    ) {
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(request) = requests.get(index) else {
                break;
            };
            let outcome = self.run_update(request, LockMode::Acquire, Some(batch_id));
            let mut guard = slots.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = guard.get_mut(index) {
                *slot = Some(outcome);
            }
        }
    }

    fn next_batch_id(&self) -> String {
        let sequence = self.batch_sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        format!("batch-{nanos}-{sequence}")
    }
}
