//! Concurrent batch execution.
//!
//! Every item with a usable key runs in its own tokio task. Tasks share the
//! store handle and one deadline, and return their own result; `join_all`
//! puts each result back at the index of the item that produced it, so the
//! output lines up with the input whatever order the tasks finish in.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use super::item::{BatchItem, BatchKind, BatchOutcome, ItemResult};
use crate::error::StoreError;
use crate::store::BlobStore;

/// Error reported for items whose key is blank.
pub const EMPTY_KEY_ERROR: &str = "empty object key";

/// Error reported for upload items without a payload.
pub const MISSING_PAYLOAD_ERROR: &str = "missing payload";

/// Runs batches of store operations against one bucket.
pub struct BatchExecutor<S: BlobStore> {
    store: Arc<S>,
    bucket: String,
}

impl<S: BlobStore> Clone for BatchExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bucket: self.bucket.clone(),
        }
    }
}

impl<S: BlobStore + 'static> BatchExecutor<S> {
    /// Create an executor for `bucket`.
    pub fn new(store: Arc<S>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Bucket this executor targets.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Execute every item and wait for all of them.
    ///
    /// Items never fail the batch: store errors, timeouts and task panics all
    /// end up in the matching [`ItemResult`]. `results[i]` always describes
    /// `items[i]`.
    pub async fn run(
        &self,
        kind: BatchKind,
        items: Vec<BatchItem>,
        deadline: Instant,
    ) -> BatchOutcome {
        let started = std::time::Instant::now();
        let total = items.len();

        let mut skipped = 0usize;
        let slots: Vec<Slot> = items
            .into_iter()
            .map(|item| {
                if item.is_blank() {
                    skipped += 1;
                    Slot::Done(ItemResult::failed("", item.correlation_id, EMPTY_KEY_ERROR))
                } else {
                    let key = item.key.clone();
                    let correlation_id = item.correlation_id.clone();
                    let store = Arc::clone(&self.store);
                    let bucket = self.bucket.clone();
                    let handle = tokio::spawn(async move {
                        execute(store.as_ref(), &bucket, kind, item, deadline).await
                    });
                    Slot::Running {
                        key,
                        correlation_id,
                        handle,
                    }
                }
            })
            .collect();

        let results: Vec<ItemResult> = join_all(slots.into_iter().map(Slot::finish)).await;

        let outcome = BatchOutcome { kind, results };

        for failure in outcome.failures() {
            warn!(
                kind = %kind,
                bucket = %self.bucket,
                key = %failure.key,
                error = failure.error.as_deref().unwrap_or(""),
                "Batch item failed"
            );
        }

        info!(
            kind = %kind,
            bucket = %self.bucket,
            total,
            failed = outcome.failed_count(),
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        outcome
    }
}

/// Per-item state between launch and join.
enum Slot {
    Done(ItemResult),
    Running {
        key: String,
        correlation_id: Option<String>,
        handle: JoinHandle<ItemResult>,
    },
}

impl Slot {
    async fn finish(self) -> ItemResult {
        match self {
            Slot::Done(result) => result,
            Slot::Running {
                key,
                correlation_id,
                handle,
            } => match handle.await {
                Ok(result) => result,
                Err(e) => ItemResult::failed(key, correlation_id, format!("task failed: {}", e)),
            },
        }
    }
}

/// Run one item under the batch deadline.
async fn execute<S: BlobStore + ?Sized>(
    store: &S,
    bucket: &str,
    kind: BatchKind,
    item: BatchItem,
    deadline: Instant,
) -> ItemResult {
    let BatchItem {
        key,
        correlation_id,
        payload,
        content_type,
    } = item;

    match kind {
        BatchKind::Fetch => match timeout_at(deadline, store.fetch(bucket, &key)).await {
            Ok(Ok(object)) => {
                let content_type = object.meta.content_type_or_default().to_string();
                ItemResult::fetched(key, correlation_id, object.data, content_type)
            }
            Ok(Err(e)) => ItemResult::failed(key, correlation_id, e.to_string()),
            Err(_) => timed_out(key, correlation_id),
        },

        BatchKind::Upload => {
            let Some(payload) = payload else {
                return ItemResult::failed(key, correlation_id, MISSING_PAYLOAD_ERROR);
            };
            match timeout_at(deadline, store.put(bucket, &key, payload, &content_type)).await {
                Ok(Ok(())) => ItemResult::succeeded(key, correlation_id),
                Ok(Err(e)) => ItemResult::failed(key, correlation_id, e.to_string()),
                Err(_) => timed_out(key, correlation_id),
            }
        }

        BatchKind::Delete => match timeout_at(deadline, store.delete(bucket, &key)).await {
            Ok(Ok(())) => ItemResult::succeeded(key, correlation_id),
            Ok(Err(StoreError::NotFound(_))) => ItemResult::already_absent(key, correlation_id),
            Ok(Err(e)) => ItemResult::failed(key, correlation_id, e.to_string()),
            Err(_) => timed_out(key, correlation_id),
        },
    }
}

fn timed_out(key: String, correlation_id: Option<String>) -> ItemResult {
    ItemResult::failed(key, correlation_id, StoreError::Timeout.to_string())
}

// =============================================================================
// Tests
// =============================================================================
