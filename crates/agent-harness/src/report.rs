//! Progress Reporting
//!
//! Sinks notified with a tool's display name right before the tool runs.
//! The wrapper awaits the report, so a report always precedes the work it
//! describes.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

/// Receives human-readable tool activity labels
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, display_name: &str);
}

/// Reporter that drops every label
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReporter;

#[async_trait]
impl ProgressReporter for NoopReporter {
    async fn report(&self, _display_name: &str) {}
}

/// Reporter backed by an async closure
pub struct FnReporter<F>(F);

#[async_trait]
impl<F, Fut> ProgressReporter for FnReporter<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn report(&self, display_name: &str) {
        (self.0)(display_name.to_string()).await;
    }
}

/// Wrap an async closure as a reporter
pub fn reporter_fn<F, Fut>(f: F) -> Arc<dyn ProgressReporter>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnReporter(f))
}

/// Forwards labels to a channel, e.g. the task writing to a websocket.
/// A closed receiver is logged and otherwise ignored.
#[async_trait]
impl ProgressReporter for UnboundedSender<String> {
    async fn report(&self, display_name: &str) {
        if self.send(display_name.to_string()).is_err() {
            tracing::debug!(display_name, "Progress receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_fn_reporter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = reporter_fn(move |name| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().unwrap().push(name) }
        });

        reporter.report("Listing files").await;
        reporter.report("Reading file a.txt").await;

        assert_eq!(*seen.lock().unwrap(), ["Listing files", "Reading file a.txt"]);
    }

    #[tokio::test]
    async fn test_channel_reporter() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report("Creating GitHub link").await;
        assert_eq!(rx.recv().await.as_deref(), Some("Creating GitHub link"));

        drop(rx);
        tx.report("ignored").await;
    }
}
