//! The per-tick controller.
//!
//! `MonitorSession` owns every piece of state the daemon carries between
//! polls. The binary only drives it: call [`MonitorSession::start`], then
//! [`MonitorSession::tick`] once per interval until it reports that the
//! shutdown sequence ran.

use crate::accumulator::{IdleAccumulator, TickDecision};
use crate::capture::{ScreenCapture, ScrotCapture};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::evaluator::{ActivitySignal, Evaluator, Verdict};
use crate::probes::ProbeSet;
use crate::recorder::{record_details, ActivityRecorder, JsonlRecorder};
use crate::sequencer::{ShutdownOutcome, ShutdownSequencer};
use devwatch_events::{DaemonStartDetails, DaemonStopDetails, EventType};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

pub const USER_INTERRUPT_REASON: &str = "user_interrupt";

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Active {
        signals: Vec<ActivitySignal>,
    },
    Idle {
        consecutive: u64,
        elapsed: Duration,
    },
    /// The idle threshold was crossed and the shutdown sequence has run.
    ShutdownTriggered(ShutdownOutcome),
    /// The idle threshold was crossed but the shutdown sequence panicked
    /// before finishing. The shutdown command may not have been issued.
    ShutdownIncomplete,
    /// The session already shut down; nothing was sampled.
    Finished,
}

impl TickOutcome {
    /// True when the loop driving this session should exit.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TickOutcome::ShutdownTriggered(_)
                | TickOutcome::ShutdownIncomplete
                | TickOutcome::Finished
        )
    }
}

pub struct MonitorSession {
    config: Config,
    probes: ProbeSet,
    evaluator: Evaluator,
    accumulator: IdleAccumulator,
    recorder: Box<dyn ActivityRecorder>,
    runner: Rc<dyn CommandRunner>,
    capture: Box<dyn ScreenCapture>,
    sequence_completed: bool,
}

impl MonitorSession {
    pub fn new(
        config: Config,
        probes: ProbeSet,
        recorder: Box<dyn ActivityRecorder>,
        runner: Rc<dyn CommandRunner>,
        capture: Box<dyn ScreenCapture>,
    ) -> Self {
        let accumulator = IdleAccumulator::new(config.idle_threshold());
        Self {
            config,
            probes,
            evaluator: Evaluator::new(),
            accumulator,
            recorder,
            runner,
            capture,
            sequence_completed: false,
        }
    }

    /// A session wired to the real host: system probes, the JSONL activity
    /// log, `scrot` screenshots and real subprocesses.
    pub fn system(config: Config) -> Self {
        let runner: Rc<dyn CommandRunner> = Rc::new(SystemCommandRunner);
        let probes = ProbeSet::system(&config, Rc::clone(&runner));
        let recorder = JsonlRecorder::new(config.activity_log_path(), config.user.clone());
        let capture = ScrotCapture::new(&config, Rc::clone(&runner));
        Self::new(
            config,
            probes,
            Box::new(recorder),
            runner,
            Box::new(capture),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn accumulator(&self) -> &IdleAccumulator {
        &self.accumulator
    }

    pub fn start(&mut self) {
        tracing::info!(
            user = %self.config.user,
            projects_root = %self.config.projects_root.display(),
            check_interval = self.config.poll_interval_secs,
            idle_shutdown_minutes = self.config.idle_shutdown_minutes,
            cpu_idle_threshold = self.config.cpu_idle_threshold,
            log_file = %self.config.activity_log_path().display(),
            dry_run = self.config.dry_run,
            "Starting activity monitor"
        );
        record_details(
            &mut *self.recorder,
            EventType::DaemonStart,
            &DaemonStartDetails {
                check_interval: Some(self.config.poll_interval_secs),
                idle_shutdown_minutes: Some(self.config.idle_shutdown_minutes),
                cpu_idle_threshold: Some(self.config.cpu_idle_threshold),
                projects_root: Some(self.config.projects_root.display().to_string()),
                dry_run: Some(self.config.dry_run),
            },
        );
    }

    pub fn stop(&mut self, reason: &str) {
        tracing::info!(reason, "Activity monitor stopping");
        record_details(
            &mut *self.recorder,
            EventType::DaemonStop,
            &DaemonStopDetails {
                reason: Some(reason.to_string()),
            },
        );
    }

    /// Samples once without touching idle state or the activity log.
    pub fn check(&mut self) -> Verdict {
        self.evaluator.evaluate(&self.config, &mut self.probes)
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.accumulator.is_finished() {
            return Ok(self.after_shutdown());
        }

        let verdict = self.evaluator.evaluate(&self.config, &mut self.probes);
        let decision = self
            .accumulator
            .record(verdict.is_active, self.config.poll_interval());

        match decision {
            TickDecision::Active => {
                self.on_active(&verdict)?;
                Ok(TickOutcome::Active {
                    signals: verdict.signals,
                })
            }
            TickDecision::Idle {
                consecutive,
                elapsed,
            } => {
                tracing::info!(
                    idle_minutes = %format!("{:.1}", elapsed.as_secs_f64() / 60.0),
                    threshold_minutes = self.config.idle_shutdown_minutes,
                    consecutive,
                    "Idle"
                );
                Ok(TickOutcome::Idle {
                    consecutive,
                    elapsed,
                })
            }
            TickDecision::Shutdown { elapsed } => {
                tracing::warn!(
                    idle_minutes = self.config.idle_shutdown_minutes,
                    "Idle threshold reached"
                );
                let config = &self.config;
                let runner = &*self.runner;
                let recorder = &mut *self.recorder;
                let sequence = panic::catch_unwind(AssertUnwindSafe(|| {
                    ShutdownSequencer::new(config, runner, recorder).run(elapsed)
                }));
                match sequence {
                    Ok(outcome) => {
                        self.sequence_completed = true;
                        Ok(TickOutcome::ShutdownTriggered(outcome))
                    }
                    Err(_) => {
                        tracing::error!("Shutdown sequence panicked before finishing");
                        Ok(TickOutcome::ShutdownIncomplete)
                    }
                }
            }
            TickDecision::Finished => Ok(self.after_shutdown()),
        }
    }

    fn after_shutdown(&self) -> TickOutcome {
        if self.sequence_completed {
            TickOutcome::Finished
        } else {
            TickOutcome::ShutdownIncomplete
        }
    }

    fn on_active(&mut self, verdict: &Verdict) -> Result<()> {
        let details = serde_json::to_value(&verdict.evidence).map_err(|source| CoreError::Json {
            context: "serializing tick evidence".to_string(),
            source,
        })?;
        self.recorder.record(EventType::ActivityDetected, details);

        match self.capture.capture() {
            Ok(path) => tracing::debug!(path = %path.display(), "Screenshot captured"),
            Err(err) => tracing::debug!(error = %err, "Screenshot skipped"),
        }

        let evidence = &verdict.evidence;
        tracing::info!(
            cpu = %format!("{:.1}%", evidence.cpu_usage),
            processes = evidence.process_count,
            modified_files = evidence.modified_files,
            signals = ?verdict.signals,
            "Active"
        );
        Ok(())
    }
}
