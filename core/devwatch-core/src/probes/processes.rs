use super::Probe;
use crate::error::{CoreError, Result};
use serde::Serialize;
use sysinfo::{System, Uid, Users};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
}

/// Processes owned by the monitored user.
///
/// Per-process CPU usage is only meaningful from the second refresh onward,
/// so the `System` handle lives as long as the probe.
pub struct ProcessProbe {
    user: String,
    uid: Option<Uid>,
    system: System,
}

impl ProcessProbe {
    pub fn new(user: &str) -> Self {
        let mut system = System::new();
        system.refresh_processes();
        Self {
            user: user.to_string(),
            uid: None,
            system,
        }
    }

    fn resolve_uid(&mut self) -> Result<Uid> {
        if let Some(uid) = &self.uid {
            return Ok(uid.clone());
        }
        let users = Users::new_with_refreshed_list();
        let uid = users
            .iter()
            .find(|user| user.name() == self.user)
            .map(|user| user.id().clone())
            .ok_or_else(|| CoreError::probe("processes", format!("unknown user {}", self.user)))?;
        self.uid = Some(uid.clone());
        Ok(uid)
    }
}

impl Probe for ProcessProbe {
    type Output = Vec<ProcessSample>;

    fn name(&self) -> &'static str {
        "processes"
    }

    fn sample(&mut self) -> Result<Vec<ProcessSample>> {
        let uid = self.resolve_uid()?;
        self.system.refresh_processes();
        let mut samples: Vec<ProcessSample> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| process.user_id() == Some(&uid))
            .map(|(pid, process)| ProcessSample {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                cpu_percent: process.cpu_usage(),
            })
            .collect();
        samples.sort_by_key(|sample| sample.pid);
        Ok(samples)
    }

    fn neutral(&self) -> Vec<ProcessSample> {
        Vec::new()
    }
}
