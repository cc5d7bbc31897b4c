use crate::config::LaunchSpec;
use crate::error::{SpawnError, TerminateError};
use crate::event::{EventLevel, EventSink};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Owns the supervised child and nothing else.
///
/// A handle is opaque outside the implementing crate: the only thing callers
/// can do with it is give it back to [`terminate`](ProcessSupervisor::terminate),
/// which consumes it.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    type Handle: Send;

    /// Start `spec` as a new OS process.
    async fn spawn(&self, spec: &LaunchSpec) -> Result<Self::Handle, SpawnError>;

    /// Forcefully kill the child. Returns once the kill has been issued; the
    /// exit is not awaited.
    async fn terminate(&self, handle: Self::Handle) -> Result<(), TerminateError>;

    /// Name used in logs.
    fn platform_name(&self) -> &'static str;
}

/// Which pipe a line of child output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn level(self) -> EventLevel {
        match self {
            OutputStream::Stdout => EventLevel::Info,
            OutputStream::Stderr => EventLevel::Warning,
        }
    }
}

const MAX_LINE_LENGTH: usize = 16 * 1024;

/// Copy `io` into `sink` one line at a time until EOF.
///
/// The pipe is read to the end no matter what: closing it early would kill
/// the child with SIGPIPE on its next write.
pub async fn forward_output<R: AsyncRead + Unpin>(
    io: R,
    stream: OutputStream,
    label: &str,
    sink: &dyn EventSink,
) {
    let mut frames = FramedRead::new(io, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    // FramedRead yields one `None` after a decode error before reading on.
    let mut resume_after_error = false;
    loop {
        match frames.next().await {
            None if resume_after_error => resume_after_error = false,
            None => return,
            Some(Ok(line)) if line.trim().is_empty() => {}
            Some(Ok(line)) => sink.record(stream.level(), &format!("[{label}] {line}")),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                // The codec skips to the next newline on its own.
                tracing::warn!(%label, ?stream, max = MAX_LINE_LENGTH, "dropped over-long output line");
                resume_after_error = true;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(%label, ?stream, "stopped forwarding child output: {e}");
                let mut io = frames.into_inner();
                if let Err(e) = tokio::io::copy(&mut io, &mut tokio::io::sink()).await {
                    tracing::debug!(%label, ?stream, "draining child output failed: {e}");
                }
                return;
            }
        }
    }
}

/// Take the child's piped stdout/stderr and forward each on its own task.
pub fn spawn_output_forwarders(child: &mut Child, label: &str, sink: Arc<dyn EventSink>) {
    if let Some(stdout) = child.stdout.take() {
        let sink = sink.clone();
        let label = label.to_string();
        tokio::spawn(async move {
            forward_output(stdout, OutputStream::Stdout, &label, sink.as_ref()).await;
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            forward_output(stderr, OutputStream::Stderr, &label, sink.as_ref()).await;
        });
    }
}
