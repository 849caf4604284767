//! Upload progress reporting.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One progress observation from a running upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// SACP: chunks acknowledged so far out of the planned count.
    Chunks { sent: u32, total: u32 },
    /// HTTP: body bytes handed to the transport.
    Bytes { sent: u64, total: Option<u64> },
}

impl Progress {
    /// Completion ratio in `0.0..=1.0`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            Progress::Chunks { sent, total } if total > 0 => Some(f64::from(sent) / f64::from(total)),
            Progress::Bytes {
                sent,
                total: Some(total),
            } if total > 0 => Some(sent as f64 / total as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.fraction(), self) {
            (Some(ratio), _) => write!(f, "{:.1}%", ratio * 100.0),
            (None, Progress::Bytes { sent, .. }) => write!(f, "{sent} bytes"),
            (None, Progress::Chunks { sent, .. }) => write!(f, "{sent} chunks"),
        }
    }
}

/// Callback receiving progress observations.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Byte counter that forwards to a callback at a bounded rate.
///
/// The final observation (sent == total) is always delivered.
pub(crate) struct ByteProgress {
    sent: u64,
    total: Option<u64>,
    interval: Duration,
    last: Option<Instant>,
    callback: Option<ProgressFn>,
}

impl ByteProgress {
    pub(crate) fn new(total: Option<u64>, interval: Duration, callback: Option<ProgressFn>) -> Self {
        Self {
            sent: 0,
            total,
            interval,
            last: None,
            callback,
        }
    }

    /// Record `n` more bytes sent.
    pub(crate) fn advance(&mut self, n: u64) {
        self.sent += n;
        let Some(callback) = &self.callback else {
            return;
        };

        let finished = self.total.is_some_and(|t| self.sent >= t);
        let due = self.last.is_none_or(|t| t.elapsed() >= self.interval);
        if finished || due {
            self.last = Some(Instant::now());
            callback(Progress::Bytes {
                sent: self.sent,
                total: self.total,
            });
        }
    }
}
