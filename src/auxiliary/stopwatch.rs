//! Wall-clock timing of named stages.

use std::time::{Duration, Instant};

use log;

/// A running timer for a named stage of a computation.
///
/// The elapsed time is logged at debug level when the timer is stopped.
#[derive(Debug)]
pub(crate) struct StopWatch {
    name: &'static str,
    start: Instant,
}

impl StopWatch {
    /// Starts timing stage `name`.
    pub(crate) fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stops the timer, logs the elapsed time and returns it.
    pub(crate) fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        log::debug!("{}: {:.3e} s", self.name, elapsed.as_secs_f64());
        elapsed
    }
}
