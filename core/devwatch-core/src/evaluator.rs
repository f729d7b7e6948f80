//! Per-tick activity classification.
//!
//! All probes are read independently, then the tick is active if any single
//! signal is positive. There is no weighting: missing real activity costs an
//! unwanted shutdown, an extra active tick costs nothing.

use crate::config::Config;
use crate::probes::{NetCounters, ProbeSet, ProcessSample};
use devwatch_events::{TickEvidence, MAX_SAMPLE_FILES};
use serde::Serialize;
use std::fmt;

/// Process names that count as activity regardless of CPU usage.
pub const TRANSFER_TOOLS: &[&str] = &["scp", "sftp", "rsync", "ftp", "curl", "wget"];

/// Per-process CPU percentage above which a process counts as busy.
pub const PROCESS_CPU_FLOOR: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    Cpu,
    SshSession,
    ModifiedFiles,
    BusyProcess,
    PhysicalInput,
}

impl fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivitySignal::Cpu => "cpu",
            ActivitySignal::SshSession => "ssh_session",
            ActivitySignal::ModifiedFiles => "modified_files",
            ActivitySignal::BusyProcess => "busy_process",
            ActivitySignal::PhysicalInput => "physical_input",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_active: bool,
    pub signals: Vec<ActivitySignal>,
    pub evidence: TickEvidence,
    #[serde(skip)]
    pub net_counters: Option<NetCounters>,
    #[serde(skip)]
    pub keystroke_total: Option<u64>,
}

pub fn is_interesting_process(process: &ProcessSample) -> bool {
    process.cpu_percent > PROCESS_CPU_FLOOR || TRANSFER_TOOLS.contains(&process.name.as_str())
}

/// Samples every probe once and classifies the tick.
///
/// `previous_net` and `previous_keys` are the snapshots returned by the
/// previous call; deltas are zero when either side is missing.
pub fn evaluate(
    config: &Config,
    probes: &mut ProbeSet,
    previous_net: Option<NetCounters>,
    previous_keys: Option<u64>,
) -> Verdict {
    let current_net = probes.network.read();
    let net_delta = match (current_net, previous_net) {
        (Some(current), Some(previous)) => current.delta_since(&previous),
        _ => NetCounters::default(),
    };

    let cpu_usage = probes.cpu.read();

    let x11_idle_ms = probes.input_idle.read();
    let window_ms = config.poll_interval_secs.saturating_mul(1000);

    let current_keys = probes.keystrokes.read();
    let keystroke_count = match (current_keys, previous_keys) {
        (Some(current), Some(previous)) => current.saturating_sub(previous),
        _ => 0,
    };

    let processes = probes.processes.read();
    let active_processes: Vec<String> = processes
        .iter()
        .filter(|process| is_interesting_process(process))
        .map(|process| process.name.clone())
        .collect();

    let ssh_sessions = probes.ssh_sessions.read();
    let recent_commits = probes.git_activity.read();
    let modified = probes.modified_files.read();

    let evidence = TickEvidence {
        net_sent_bytes: net_delta.bytes_sent,
        net_recv_bytes: net_delta.bytes_recv,
        cpu_usage,
        x11_idle_ms,
        user_active_physically: x11_idle_ms < window_ms,
        keystroke_count,
        keyboard_active: keystroke_count > 0,
        process_count: processes.len(),
        active_processes,
        ssh_sessions,
        recent_commits,
        modified_files: modified.len(),
        files: modified.into_iter().take(MAX_SAMPLE_FILES).collect(),
    };

    let signals = classify(config, &evidence);
    Verdict {
        is_active: !signals.is_empty(),
        signals,
        evidence,
        net_counters: current_net.or(previous_net),
        keystroke_total: current_keys.or(previous_keys),
    }
}

/// Signals that mark this evidence as activity, in a fixed order.
pub fn classify(config: &Config, evidence: &TickEvidence) -> Vec<ActivitySignal> {
    let mut signals = Vec::new();
    if evidence.cpu_usage > config.cpu_idle_threshold {
        signals.push(ActivitySignal::Cpu);
    }
    if evidence.ssh_sessions > 0 {
        signals.push(ActivitySignal::SshSession);
    }
    if evidence.modified_files > 0 {
        signals.push(ActivitySignal::ModifiedFiles);
    }
    if !evidence.active_processes.is_empty() {
        signals.push(ActivitySignal::BusyProcess);
    }
    if evidence.user_active_physically {
        signals.push(ActivitySignal::PhysicalInput);
    }
    signals
}

/// Holds the counter snapshots carried between ticks.
#[derive(Debug, Default)]
pub struct Evaluator {
    previous_net: Option<NetCounters>,
    previous_keys: Option<u64>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, config: &Config, probes: &mut ProbeSet) -> Verdict {
        let verdict = evaluate(config, probes, self.previous_net, self.previous_keys);
        self.previous_net = verdict.net_counters;
        self.previous_keys = verdict.keystroke_total;
        verdict
    }
}
