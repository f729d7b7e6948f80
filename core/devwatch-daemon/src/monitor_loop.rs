use devwatch_core::{MonitorSession, TickOutcome, USER_INTERRUPT_REASON};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown sequence ran, whether or not the OS command succeeded.
    ShutdownSequenceRan,
    /// The shutdown sequence panicked partway through.
    ShutdownIncomplete,
    Interrupted,
}

/// Drives `session` until the shutdown sequence runs or `interrupted` is set.
///
/// The first tick waits `warm_up` so the CPU counters primed at session
/// construction cover a usable window. A tick that errors or panics is
/// logged and the loop carries on after the usual sleep.
pub fn run(
    session: &mut MonitorSession,
    interval: Duration,
    warm_up: Duration,
    interrupted: &AtomicBool,
) -> LoopExit {
    if sleep_unless_interrupted(warm_up, interrupted) {
        return stop(session);
    }

    loop {
        if interrupted.load(Ordering::SeqCst) {
            return stop(session);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| session.tick())) {
            Ok(Ok(TickOutcome::ShutdownIncomplete)) => {
                tracing::error!("Shutdown sequence did not finish; shutdown may not be scheduled");
                return LoopExit::ShutdownIncomplete;
            }
            Ok(Ok(outcome)) if outcome.is_terminal() => {
                if let TickOutcome::ShutdownTriggered(result) = &outcome {
                    tracing::info!(
                        shutdown_issued = result.issued,
                        repos_committed = result.git.repos_committed,
                        backup_ok = result.backup.success,
                        "Shutdown sequence finished"
                    );
                }
                return LoopExit::ShutdownSequenceRan;
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "Error in main loop"),
            Err(payload) => tracing::error!(panic = %panic_message(&*payload), "Tick panicked"),
        }

        if sleep_unless_interrupted(interval, interrupted) {
            return stop(session);
        }
    }
}

fn stop(session: &mut MonitorSession) -> LoopExit {
    tracing::info!("Shutdown requested by user");
    session.stop(USER_INTERRUPT_REASON);
    LoopExit::Interrupted
}

/// Sleeps for `duration` in short slices. Returns true if interrupted.
pub fn sleep_unless_interrupted(duration: Duration, interrupted: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
