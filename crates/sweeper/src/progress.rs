//! Transfer progress reporting.
//!
//! On an interactive terminal every update moves an `indicatif` bar. When
//! output goes to a log file, updates become `tracing` lines emitted at most
//! once per [`LOG_INTERVAL`], plus the final one.

use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Minimum delay between two progress lines in non-interactive output.
pub const LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Receives `(bytes_done, bytes_total)` updates during a transfer.
///
/// Called once per chunk, so implementations must be cheap.
pub trait ProgressSink: Send + Sync {
    fn update(&self, done: u64, total: Option<u64>);

    /// Transfer is over (successfully or not).
    fn finish(&self) {}
}

/// Rate limiter for log-based progress.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true (and rearms) when at least `interval` passed since the
    /// last accepted call. The first call is always accepted.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

enum Output {
    Bar(ProgressBar),
    Log(Mutex<Throttle>),
}

/// Default sink: bar on a terminal, throttled log lines otherwise.
pub struct TransferProgress {
    label: String,
    output: Output,
}

impl TransferProgress {
    /// Pick the output mode from whether stderr is a terminal.
    pub fn new(label: impl Into<String>) -> Self {
        if std::io::stderr().is_terminal() {
            Self::bar(label)
        } else {
            Self::log(label, LOG_INTERVAL)
        }
    }

    pub fn bar(label: impl Into<String>) -> Self {
        let label = label.into();
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>12} [{bar:25.cyan/dim}] {bytes}/{total_bytes} {bytes_per_sec}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(label.clone());
        Self {
            label,
            output: Output::Bar(bar),
        }
    }

    pub fn log(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            output: Output::Log(Mutex::new(Throttle::new(interval))),
        }
    }
}

impl ProgressSink for TransferProgress {
    fn update(&self, done: u64, total: Option<u64>) {
        match &self.output {
            Output::Bar(bar) => {
                if let Some(total) = total {
                    bar.set_length(total);
                }
                bar.set_position(done);
            }
            Output::Log(throttle) => {
                let last = total.is_some_and(|t| done >= t);
                let ready = throttle
                    .lock()
                    .map(|mut t| t.ready(Instant::now()))
                    .unwrap_or(true);
                if !(ready || last) {
                    return;
                }
                match total {
                    Some(total) if total > 0 => info!(
                        "{}: {}/{} bytes ({:.0}%)",
                        self.label,
                        done,
                        total,
                        done as f64 * 100.0 / total as f64
                    ),
                    _ => info!("{}: {} bytes", self.label, done),
                }
            }
        }
    }

    fn finish(&self) {
        if let Output::Bar(bar) = &self.output {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_first_call_passes() {
        let mut throttle = Throttle::new(Duration::from_secs(60));
        assert!(throttle.ready(Instant::now()));
    }

    #[test]
    fn test_throttle_blocks_within_interval() {
        let mut throttle = Throttle::new(Duration::from_secs(60));
        let start = Instant::now();
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_secs(1)));
        assert!(!throttle.ready(start + Duration::from_secs(59)));
        assert!(throttle.ready(start + Duration::from_secs(60)));
        assert!(!throttle.ready(start + Duration::from_secs(61)));
    }

    #[test]
    fn test_log_sink_accepts_high_frequency_updates() {
        let sink = TransferProgress::log("a.zip", LOG_INTERVAL);
        for done in (0..=1_000_000u64).step_by(8192) {
            sink.update(done, Some(1_000_000));
        }
        sink.update(1_000_000, Some(1_000_000));
        sink.update(10, None);
        sink.finish();
    }
}
