//! One-shot shutdown guard and shutdown reasons.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Why the controller is shutting down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The shared cancellation token fired (signal or external request).
    Cancelled,
    /// `count == data_size` was observed.
    Completed,
    /// The consecutive event-fetch failure limit was reached.
    ErrorLimit,
    /// The control row could not be read.
    ControlReadFailed,
    /// Startup did not complete.
    StartupFailed,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ShutdownReason::Cancelled => "cancelled",
            ShutdownReason::Completed => "completed",
            ShutdownReason::ErrorLimit => "error limit reached",
            ShutdownReason::ControlReadFailed => "control read failed",
            ShutdownReason::StartupFailed => "startup failed",
        };
        f.write_str(reason)
    }
}

/// Lets exactly one caller run the shutdown sequence.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    fired: AtomicBool,
}

impl ShutdownGuard {
    /// Create an unfired guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the first caller only.
    pub fn begin(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    /// True once any caller has begun shutdown.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
