// Proxy candidate pool and health prober
//
// Liveness is volatile, so this is a point-in-time check per chain build:
// nothing is cached, and a failed probe is "not usable", never an error.

use rand::seq::SliceRandom;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// One candidate egress address plus the result of its most recent probe.
#[derive(Debug, Clone)]
pub struct ProxyCandidate {
    pub address: String,
    pub last_checked_at: Option<SystemTime>,
    pub last_known_usable: bool,
}

impl ProxyCandidate {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_checked_at: None,
            last_known_usable: false,
        }
    }

    fn checked(address: &str, usable: bool) -> Self {
        Self {
            address: address.to_string(),
            last_checked_at: Some(SystemTime::now()),
            last_known_usable: usable,
        }
    }
}

/// Probes candidates by issuing a lightweight HTTP request through each one
/// as egress, with a bounded timeout.
pub struct ProxyProber {
    probe_url: String,
    timeout: Duration,
}

impl ProxyProber {
    pub fn new(probe_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe_url: probe_url.into(),
            timeout,
        }
    }

    /// Reachability check for a single address. Any failure mode (bad proxy
    /// URL, client build error, timeout, non-success status) is "not usable".
    async fn probe(&self, address: &str) -> bool {
        let proxy = match reqwest::Proxy::all(address) {
            Ok(p) => p,
            Err(e) => {
                debug!("invalid proxy address {}: {}", address, e);
                return false;
            }
        };
        let client = match reqwest::Client::builder()
            .timeout(self.timeout)
            .proxy(proxy)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                debug!("failed to build probe client for {}: {}", address, e);
                return false;
            }
        };
        match client.get(&self.probe_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("probe through {} failed: {}", address, e);
                false
            }
        }
    }

    /// First usable candidate from a shuffled copy of the pool, or `None` if
    /// every candidate fails or times out. Shuffling spreads load across a
    /// rotating set instead of hammering the same address on every call.
    pub async fn find_usable(&self, pool: &[ProxyCandidate]) -> Option<ProxyCandidate> {
        let mut shuffled: Vec<&ProxyCandidate> = pool.iter().collect();
        shuffled.shuffle(&mut rand::rng());

        for candidate in shuffled {
            if self.probe(&candidate.address).await {
                debug!("proxy {} is usable", candidate.address);
                return Some(ProxyCandidate::checked(&candidate.address, true));
            }
        }
        None
    }

    /// Probe every candidate. Diagnostic path only, never used while building
    /// a chain.
    pub async fn survey_all(&self, pool: &[ProxyCandidate]) -> Vec<(ProxyCandidate, bool)> {
        let mut results = Vec::with_capacity(pool.len());
        for candidate in pool {
            let usable = self.probe(&candidate.address).await;
            results.push((ProxyCandidate::checked(&candidate.address, usable), usable));
        }
        results
    }
}
