use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Run a future, turning a panic into `Err(panic_message)`.
///
/// Spawned loader and poller tasks wrap their bodies in this so a panic is
/// reported back over the event channel instead of silently killing the task
/// and leaving its owner waiting forever.
pub(crate) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
