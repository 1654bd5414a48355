use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::core::config::ENV_LOG;

/// Capacity of the log fan-out channel feeding `/api/logs`.
pub(crate) const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Writes every formatted line to stdout and to the broadcast channel.
#[derive(Clone)]
pub(crate) struct SseMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for SseMakeWriter {
    type Writer = SseWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SseWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct SseWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for SseWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).trim_end().to_string();
        if !msg.is_empty() {
            let _ = self.sender.send(msg); // no subscribers is fine
        }
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Picks the filter directive: explicit config first, then `CUBEWISE_LOG`,
/// then `RUST_LOG`, then `info`.
pub(crate) fn filter_directive(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_LOG).ok())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Installs the global subscriber. `suppress_stdout` keeps stdout clean for
/// commands that print machine-readable output.
pub(crate) fn init(
    configured: Option<&str>,
    suppress_stdout: bool,
) -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
    let filter = EnvFilter::try_new(filter_directive(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(SseMakeWriter {
            sender: log_tx.clone(),
            suppress_stdout,
        })
        .finish();
    // A second init (tests, repeated commands) keeps the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
    log_tx
}
