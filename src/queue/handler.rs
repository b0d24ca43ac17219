//! Task handlers, tagged by how they must be run.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::task::Task;

type BlockingFn = dyn Fn(Task) -> anyhow::Result<()> + Send + Sync;
type NonBlockingFn = dyn Fn(Task) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// The function a queue runs for each task.
///
/// `Blocking` handlers run on the queue's bounded blocking pool so they never
/// stall the async workers; `NonBlocking` handlers are awaited inline.
#[derive(Clone)]
pub enum TaskHandler {
    Blocking(Arc<BlockingFn>),
    NonBlocking(Arc<NonBlockingFn>),
}

impl TaskHandler {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(Task) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        TaskHandler::Blocking(Arc::new(f))
    }

    pub fn non_blocking<F, Fut>(f: F) -> Self
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        TaskHandler::NonBlocking(Arc::new(move |task| f(task).boxed()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskHandler::Blocking(_) => "blocking",
            TaskHandler::NonBlocking(_) => "non_blocking",
        }
    }
}

impl std::fmt::Debug for TaskHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TaskHandler").field(&self.kind()).finish()
    }
}

/// Message carried by a panic payload, when it is a string.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extracts_payload() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 1");

        let caught = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(7_u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "non-string panic payload");
    }
}
