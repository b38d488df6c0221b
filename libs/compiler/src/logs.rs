//! Log-tailing harness.
//!
//! Workload discovery calls into [`LogCallbacks`] from many tasks at once.
//! [`LogTail`] turns every callback into a message on one channel, and the
//! matching [`TailWriter`] is the only thing that touches the output sinks.

use colored::Colorize;
use regex::Regex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// One line of output from one workload container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub workload: String,
    pub container: String,
    pub message: String,
}

impl LogEvent {
    /// `<workload>:<container> <message>` plus a newline.
    pub fn format(&self) -> String {
        let message = self.message.trim_end_matches(['\r', '\n']);
        format!("{}:{} {}\n", self.workload, self.container, message)
    }
}

/// Callbacks invoked by a workload discovery implementation.
///
/// Implementations must tolerate concurrent calls.
pub trait LogCallbacks: Send + Sync {
    /// A matching workload container appeared. Returning false skips it.
    fn on_enter(&self, workload: &str, container: &str) -> bool;

    /// A log line arrived from an included container.
    fn on_event(&self, event: LogEvent);

    /// A previously included container went away.
    fn on_exit(&self, workload: &str, container: &str);

    /// Tailing one container failed. Never fatal to the session.
    fn on_error(&self, workload: &str, container: &str, err: &(dyn std::error::Error + Send + Sync));
}

#[derive(Debug)]
enum TailMessage {
    Line(String),
    Notice(String),
}

/// [`LogCallbacks`] that filters containers and queues formatted output.
#[derive(Debug)]
pub struct LogTail {
    filters: Vec<Regex>,
    quiet: bool,
    tx: mpsc::UnboundedSender<TailMessage>,
}

impl LogTail {
    /// Create a tail and the writer that drains it.
    ///
    /// With no filters every container matches. A filter matches when it
    /// matches either the workload or the container name.
    pub fn new(filters: Vec<Regex>, quiet: bool) -> (Self, TailWriter) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { filters, quiet, tx }, TailWriter { rx })
    }

    fn matches(&self, workload: &str, container: &str) -> bool {
        self.filters.is_empty()
            || self
                .filters
                .iter()
                .any(|r| r.is_match(workload) || r.is_match(container))
    }

    fn notice(&self, text: String) {
        let _ = self.tx.send(TailMessage::Notice(text));
    }
}

impl LogCallbacks for LogTail {
    fn on_enter(&self, workload: &str, container: &str) -> bool {
        if !self.matches(workload, container) {
            return false;
        }
        if !self.quiet {
            self.notice(format!(
                "{}\n",
                format!("==> Detected container {workload}:{container}").yellow()
            ));
        }
        true
    }

    fn on_event(&self, event: LogEvent) {
        let _ = self.tx.send(TailMessage::Line(event.format()));
    }

    fn on_exit(&self, workload: &str, container: &str) {
        if !self.quiet {
            self.notice(format!(
                "{}\n",
                format!("==> Leaving container {workload}:{container}").yellow()
            ));
        }
    }

    fn on_error(&self, workload: &str, container: &str, err: &(dyn std::error::Error + Send + Sync)) {
        tracing::warn!(workload, container, error = %err, "log tail failed");
        self.notice(format!(
            "{}\n",
            format!("==> Warning: Error while tailing container {workload}:{container}: {err}")
                .red()
        ));
    }
}

/// Single consumer for a [`LogTail`]: lines go to `out`, notices to `err`.
#[derive(Debug)]
pub struct TailWriter {
    rx: mpsc::UnboundedReceiver<TailMessage>,
}

impl TailWriter {
    /// Drain until every [`LogTail`] handle is dropped or a sink fails.
    pub async fn run(
        &mut self,
        out: &mut (dyn AsyncWrite + Send + Unpin),
        err: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::io::Result<()> {
        while let Some(message) = self.rx.recv().await {
            Self::write(message, out, err).await?;
        }
        Ok(())
    }

    /// Write whatever is already queued without waiting for more.
    pub async fn drain(
        &mut self,
        out: &mut (dyn AsyncWrite + Send + Unpin),
        err: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::io::Result<()> {
        while let Ok(message) = self.rx.try_recv() {
            Self::write(message, out, err).await?;
        }
        Ok(())
    }

    async fn write<'a>(
        message: TailMessage,
        out: &'a mut (dyn AsyncWrite + Send + Unpin),
        err: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::io::Result<()> {
        let (sink, text) = match message {
            TailMessage::Line(line) => (out, line),
            TailMessage::Notice(text) => (err, text),
        };
        sink.write_all(text.as_bytes()).await?;
        sink.flush().await
    }
}
