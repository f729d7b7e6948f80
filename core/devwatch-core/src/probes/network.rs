use super::Probe;
use crate::error::{CoreError, Result};
use serde::Serialize;
use sysinfo::Networks;

/// Cumulative byte counters summed over every interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl NetCounters {
    /// Bytes moved since `previous`. Counter resets (interface removed,
    /// wraparound) clamp to zero rather than underflowing.
    pub fn delta_since(&self, previous: &NetCounters) -> NetCounters {
        NetCounters {
            bytes_sent: self.bytes_sent.saturating_sub(previous.bytes_sent),
            bytes_recv: self.bytes_recv.saturating_sub(previous.bytes_recv),
        }
    }
}

pub struct NetworkProbe {
    networks: Networks,
}

impl NetworkProbe {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for NetworkProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for NetworkProbe {
    type Output = Option<NetCounters>;

    fn name(&self) -> &'static str {
        "network"
    }

    fn sample(&mut self) -> Result<Option<NetCounters>> {
        self.networks.refresh_list();
        self.networks.refresh();
        if self.networks.iter().next().is_none() {
            return Err(CoreError::probe("network", "no interfaces reported"));
        }
        let counters = self
            .networks
            .iter()
            .fold(NetCounters::default(), |acc, (_name, data)| NetCounters {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
            });
        Ok(Some(counters))
    }

    fn neutral(&self) -> Option<NetCounters> {
        None
    }
}
