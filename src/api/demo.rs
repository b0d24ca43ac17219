//! Simulated workloads behind the demo endpoints.

use std::time::Duration;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::info;

use crate::cache::{AsyncMemo, QueryParams};
use crate::queue::{Task, TaskHandler};

/// Boxed operation behind [`SlowLookup`].
pub type LookupFn = Box<dyn Fn(QueryParams) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Memoized slow lookup served by `GET /cache`.
pub type SlowLookup = AsyncMemo<QueryParams, Value, LookupFn>;

/// Handler of the `pdf_queue` demo queue: pretends to process a document for
/// `work`, failing with "bad input" when the task carries no text.
pub fn pdf_handler(work: Duration) -> TaskHandler {
    TaskHandler::non_blocking(move |task: Task| async move {
        let user = task.kwarg_str("user_id").unwrap_or("unknown").to_string();
        let text = task.kwarg_str("text").unwrap_or_default();
        if text.trim().is_empty() {
            return Err(anyhow!("bad input"));
        }

        info!(task_id = %task.id, user = %user, "Processing document");
        tokio::time::sleep(work).await;
        Ok(())
    })
}

/// The slow operation the cache endpoint memoizes.
pub fn slow_lookup(work: Duration) -> LookupFn {
    Box::new(move |params: QueryParams| {
        async move {
            tokio::time::sleep(work).await;
            let text = params.get("text").cloned().unwrap_or_default();
            Ok(Value::String(format!("Cache {}", text)))
        }
        .boxed()
    })
}
