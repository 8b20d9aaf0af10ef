//! Periodic driver around the reconciler
//!
//! [`Scheduler::step`] runs exactly one cycle: start marker, reconcile, end
//! marker. [`Scheduler::run`] repeats `step` forever, sleeping for the
//! configured interval after each cycle completes, so a slow cycle delays the
//! next start by its own duration plus the interval.
//!
//! The sleep goes through the [`Sleeper`] trait so tests can drive the loop
//! without waiting on real time.

use crate::error::Result;
use crate::reconcile::Reconciler;
use crate::sink::EventSink;
use crate::types::{CycleReport, SyncEvent};
use humantime::format_duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Blocking pause between cycles
pub trait Sleeper: Send + Sync {
    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`
///
/// Process termination signals end the sleep along with the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs reconciliation cycles on a fixed interval
///
/// # Examples
///
/// ```rust,no_run
/// use foldersync::{Reconciler, Scheduler, TracingSink};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = Arc::new(TracingSink::new());
/// let reconciler = Reconciler::new("./source", "./replica", sink.clone());
/// let scheduler = Scheduler::new(reconciler, sink, Duration::from_secs(30));
///
/// // Only returns on a fatal error
/// scheduler.run()?;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler<S: Sleeper = ThreadSleeper> {
    reconciler: Reconciler,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    sleeper: S,
    cancel: Option<Arc<AtomicBool>>,
}

impl<S: Sleeper> std::fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("reconciler", &self.reconciler)
            .field("interval", &self.interval)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Scheduler<ThreadSleeper> {
    /// Create a scheduler that sleeps on the current thread
    pub fn new(reconciler: Reconciler, sink: Arc<dyn EventSink>, interval: Duration) -> Self {
        Self {
            reconciler,
            sink,
            interval,
            sleeper: ThreadSleeper,
            cancel: None,
        }
    }
}

impl<S: Sleeper> Scheduler<S> {
    /// Replace the sleeper, e.g. with a fake clock in tests
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Scheduler<T> {
        Scheduler {
            reconciler: self.reconciler,
            sink: self.sink,
            interval: self.interval,
            sleeper,
            cancel: self.cancel,
        }
    }

    /// Stop [`Scheduler::run`] once `flag` is set
    ///
    /// The flag is checked after each sleep, never in the middle of a cycle.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Pause between the end of one cycle and the start of the next
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The wrapped reconciler
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run one cycle without sleeping
    ///
    /// Logs the start marker, reconciles, and logs the end marker. A fatal
    /// reconcile error is logged as an abort and returned.
    pub fn step(&self) -> Result<CycleReport> {
        let start = Instant::now();
        self.sink.emit(&SyncEvent::CycleStarted);

        let report = self.reconciler.reconcile().map_err(|e| {
            self.sink.emit(&SyncEvent::Aborted(e.to_string()));
            e
        })?;

        self.sink.emit(&SyncEvent::CycleFinished);
        debug!(
            "Cycle finished in {} ({} changes, {} failures)",
            format_duration(truncate_to_millis(start.elapsed())),
            report.mutation_count(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Run cycles until a fatal error or cancellation
    ///
    /// Without a cancellation flag this only returns on error.
    #[instrument(skip(self), fields(interval = ?self.interval))]
    pub fn run(&self) -> Result<()> {
        debug!(
            "Mirroring {} -> {} every {}",
            self.reconciler.source_root().display(),
            self.reconciler.replica_root().display(),
            format_duration(self.interval)
        );

        loop {
            self.step()?;
            self.sleeper.sleep(self.interval);

            if self.is_cancelled() {
                debug!("Scheduler cancelled");
                return Ok(());
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

fn truncate_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::sink::MemorySink;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    /// Records requested sleeps and cancels after a fixed number of them
    struct FakeSleeper {
        slept: Arc<Mutex<Vec<Duration>>>,
        cancel_after: usize,
        cancel: Arc<AtomicBool>,
        on_sleep: Box<dyn Fn(usize) + Send + Sync>,
    }

    impl Sleeper for FakeSleeper {
        fn sleep(&self, duration: Duration) {
            let mut slept = self.slept.lock();
            slept.push(duration);
            (self.on_sleep)(slept.len());
            if slept.len() >= self.cancel_after {
                self.cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    fn fake(
        cancel_after: usize,
        cancel: Arc<AtomicBool>,
        on_sleep: impl Fn(usize) + Send + Sync + 'static,
    ) -> (FakeSleeper, Arc<Mutex<Vec<Duration>>>) {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let sleeper = FakeSleeper {
            slept: slept.clone(),
            cancel_after,
            cancel,
            on_sleep: Box::new(on_sleep),
        };
        (sleeper, slept)
    }

    #[test]
    fn test_step_emits_markers_around_actions() {
        let source = TempDir::new().unwrap();
        let replica = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), "hello").unwrap();

        let sink = Arc::new(MemorySink::new());
        let reconciler = Reconciler::new(source.path(), replica.path(), sink.clone());
        let scheduler = Scheduler::new(reconciler, sink.clone(), Duration::from_secs(60));

        let report = scheduler.step().unwrap();
        assert_eq!(report.mutation_count(), 1);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SyncEvent::CycleStarted);
        assert!(matches!(events[1], SyncEvent::Action(_)));
        assert_eq!(events[2], SyncEvent::CycleFinished);
    }

    #[test]
    fn test_run_sleeps_interval_between_cycles() {
        let source = TempDir::new().unwrap();
        let replica = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let cancel = Arc::new(AtomicBool::new(false));

        // Each sleep adds a new source file for the following cycle to pick up
        let source_path = source.path().to_path_buf();
        let (sleeper, slept) = fake(3, cancel.clone(), move |n| {
            fs::write(source_path.join(format!("file{}.txt", n)), "x").unwrap();
        });

        let reconciler = Reconciler::new(source.path(), replica.path(), sink.clone());
        Scheduler::new(reconciler, sink.clone(), Duration::from_secs(7))
            .with_sleeper(sleeper)
            .with_cancellation(cancel)
            .run()
            .unwrap();

        assert_eq!(*slept.lock(), vec![Duration::from_secs(7); 3]);
        let starts = sink
            .events()
            .iter()
            .filter(|e| **e == SyncEvent::CycleStarted)
            .count();
        assert_eq!(starts, 3);
        assert!(replica.path().join("file1.txt").exists());
        assert!(replica.path().join("file2.txt").exists());
        // Written during the last sleep, after which the loop was cancelled
        assert!(!replica.path().join("file3.txt").exists());
    }

    #[test]
    fn test_run_stops_on_fatal_error() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("source");
        fs::create_dir(&source).unwrap();
        let sink = Arc::new(MemorySink::new());
        let cancel = Arc::new(AtomicBool::new(false));

        let doomed = source.clone();
        let (sleeper, slept) = fake(10, cancel.clone(), move |_| {
            fs::remove_dir_all(&doomed).unwrap();
        });

        let reconciler = Reconciler::new(&source, root.path().join("replica"), sink.clone());
        let err = Scheduler::new(reconciler, sink.clone(), Duration::from_secs(1))
            .with_sleeper(sleeper)
            .with_cancellation(cancel)
            .run()
            .unwrap_err();

        assert!(matches!(err, SyncError::SourceNotFound(_)));
        assert_eq!(slept.lock().len(), 1);
        let last = sink.events().pop().unwrap();
        assert!(matches!(last, SyncEvent::Aborted(_)));
        assert!(last.to_string().starts_with("Synchronization aborted: "));
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_run_startup_line_is_debug_only() {
        let source = TempDir::new().unwrap();
        let replica = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let (sleeper, _slept) = fake(1, cancel.clone(), |_| {});

        let reconciler = Reconciler::new(source.path(), replica.path(), sink.clone());
        Scheduler::new(reconciler, sink.clone(), Duration::from_secs(5))
            .with_sleeper(sleeper)
            .with_cancellation(cancel)
            .run()
            .unwrap();

        assert!(logs_contain("Mirroring"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Mirroring")).all(|l| l.contains("DEBUG")) {
                true => Ok(()),
                false => Err("startup line logged above DEBUG".to_string()),
            }
        });
        assert!(!sink.messages().iter().any(|m| m.contains("Mirroring")));
    }
}
