use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy::prelude::*;
use serde_json::{json, Value};

/// Host-side answer to "is the type universe being rebuilt right now?".
pub trait BuildStatus: Send + Sync {
    fn is_rebuilding(&self) -> bool;
}

/// Flag owned by the host; clone the handle to flip it from build tooling.
#[derive(Clone, Default)]
pub struct AtomicBuildStatus(Arc<AtomicBool>);

impl AtomicBuildStatus {
    pub fn set_rebuilding(&self, rebuilding: bool) {
        self.0.store(rebuilding, Ordering::SeqCst);
    }
}

impl BuildStatus for AtomicBuildStatus {
    fn is_rebuilding(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reports a rebuild while the marker file exists (hot-reload tooling touches
/// it before swapping modules and removes it afterwards).
pub struct MarkerFileBuildStatus {
    marker: PathBuf,
}

impl MarkerFileBuildStatus {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl BuildStatus for MarkerFileBuildStatus {
    fn is_rebuilding(&self) -> bool {
        self.marker.exists()
    }
}

/// Outcome of [`CompilationGate::await_stable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateWait {
    pub waited: bool,
    pub completed: bool,
    pub elapsed_seconds: f64,
}

impl GateWait {
    pub fn timed_out(&self) -> bool {
        self.waited && !self.completed
    }

    pub fn message(&self) -> String {
        match (self.waited, self.completed) {
            (false, _) => "No compilation in progress".to_string(),
            (true, true) => format!(
                "Waited {:.2}s for compilation to finish",
                self.elapsed_seconds
            ),
            (true, false) => format!(
                "Compilation still running after {:.2}s; continuing with the current types",
                self.elapsed_seconds
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "waitedForCompilation": self.waited,
            "compilationCompleted": self.completed,
            "waitTimeSeconds": self.elapsed_seconds,
            "message": self.message(),
        })
    }
}

/// Longest wait any single command may ask for.
pub const MAX_WAIT_SECONDS: f64 = 600.0;

/// Caller-supplied wait clamped to `[0, MAX_WAIT_SECONDS]`; non-finite input
/// means no wait.
pub fn wait_budget(max_wait_seconds: f64) -> Duration {
    if !max_wait_seconds.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(max_wait_seconds.clamp(0.0, MAX_WAIT_SECONDS))
}

#[derive(Resource, Clone)]
pub struct CompilationGate {
    status: Arc<dyn BuildStatus>,
    poll_interval: Duration,
    last_seen_rebuilding: Arc<AtomicBool>,
}

impl CompilationGate {
    pub fn new(status: Arc<dyn BuildStatus>, poll_interval: Duration) -> Self {
        Self {
            status,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            last_seen_rebuilding: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_rebuilding(&self) -> bool {
        let rebuilding = self.status.is_rebuilding();
        self.last_seen_rebuilding
            .fetch_or(rebuilding, Ordering::SeqCst);
        rebuilding
    }

    /// Blocks the calling thread until the host stops rebuilding or
    /// `max_wait_seconds` elapses. Never fails: a timeout is reported through
    /// `completed: false`.
    pub fn await_stable(&self, max_wait_seconds: f64) -> GateWait {
        if !self.is_rebuilding() {
            return GateWait {
                waited: false,
                completed: true,
                elapsed_seconds: 0.0,
            };
        }

        let max_wait = wait_budget(max_wait_seconds);
        let started = Instant::now();
        info!(
            "[Bridge gate] Host is rebuilding, waiting up to {:.2}s",
            max_wait.as_secs_f64()
        );
        loop {
            let elapsed = started.elapsed();
            if !self.status.is_rebuilding() {
                return GateWait {
                    waited: true,
                    completed: true,
                    elapsed_seconds: elapsed.as_secs_f64(),
                };
            }
            if elapsed >= max_wait {
                warn!(
                    "[Bridge gate] Compilation still running after {:.2}s",
                    elapsed.as_secs_f64()
                );
                return GateWait {
                    waited: true,
                    completed: false,
                    elapsed_seconds: elapsed.as_secs_f64(),
                };
            }
            std::thread::sleep(self.poll_interval.min(max_wait - elapsed));
        }
    }

    /// True once per rebuild: when a rebuild was observed earlier and the host
    /// is now stable again. Used to drop cached type resolutions.
    pub fn take_finished_rebuild(&self) -> bool {
        let rebuilding = self.status.is_rebuilding();
        let was = self.last_seen_rebuilding.swap(rebuilding, Ordering::SeqCst);
        was && !rebuilding
    }
}
