//! # devwatch-core
//!
//! Decides whether a developer workstation is in use and, after a sustained
//! idle period, runs the pre-shutdown backup sequence and powers the machine
//! off.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │   probes     │──▶│ evaluator  │──▶│ idle accumulator │──▶│ shutdown sequencer│
//! │ (fallible)   │   │ (OR vote)  │   │ (tick counter)   │   │ git → backup → off│
//! └──────────────┘   └────────────┘   └──────────────────┘   └───────────────────┘
//!         │                 │                                          │
//!         └── CommandRunner ┴──────────── ActivityRecorder (JSONL) ────┘
//! ```
//!
//! [`MonitorSession`] ties the pieces together; the daemon binary calls
//! [`MonitorSession::tick`] once per poll interval.
//!
//! ## Failure model
//!
//! - A probe that fails contributes its neutral value and is logged at debug
//!   level.
//! - A repository that cannot be committed is recorded and skipped.
//! - A failed or timed-out backup is recorded; the shutdown still happens.
//! - Every subprocess carries a timeout, so no single call stalls the idle
//!   clock.

pub mod accumulator;
pub mod capture;
pub mod command;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod probes;
pub mod recorder;
pub mod sequencer;
pub mod session;

pub use accumulator::{IdleAccumulator, IdlePhase, TickDecision};
pub use capture::{ScreenCapture, ScrotCapture};
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use config::Config;
pub use devwatch_events::TickEvidence;
pub use error::{CoreError, Result};
pub use evaluator::{ActivitySignal, Evaluator, Verdict};
pub use probes::{Probe, ProbeSet};
pub use recorder::{ActivityRecorder, JsonlRecorder, MemoryRecorder};
pub use sequencer::{ShutdownOutcome, ShutdownSequencer};
pub use session::{MonitorSession, TickOutcome, USER_INTERRUPT_REASON};
