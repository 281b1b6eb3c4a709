// src/reaper.rs
//! Grim reaper: primary-only periodic liveness sweep.

use crate::discovery::Membership;
use crate::transport::client::MtlsClient;
use rand::Rng;
use std::time::Duration;

/// Periodic loop: sleep uniform random 0-20s, probe every peer other
/// than self, evict any whose body came back empty. Only ever run on
/// the primary.
pub async fn run_grim_reaper(membership: Membership, client: MtlsClient, self_name: String) {
    loop {
        let delay_secs = rand::thread_rng().gen_range(0..=20);
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;

        let members = membership.snapshot().await;
        let mut dead = Vec::new();
        for (name, info) in &members {
            if name == &self_name {
                continue;
            }
            let probe_url = format!("{}/", info.base_url.trim_end_matches('/'));
            let body = client.get_bytes(&probe_url).await;
            // "body length < 1 means dead" deliberately conflates any
            // transport/TLS failure with an empty response.
            if body.is_empty() {
                dead.push(name.clone());
            }
        }

        if !dead.is_empty() {
            tracing::info!(evicted = ?dead, "grim reaper evicting unreachable peers");
            membership.remove_many(&dead).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoadStats, MemoryStats, NurseryControlState, NurseryInfo, SwapStats};

    fn info(name: &str, base_url: &str) -> NurseryInfo {
        NurseryInfo {
            name: name.into(),
            base_url: base_url.into(),
            port: 8989,
            state: NurseryControlState::Up,
            processes: 0,
            cores: 1,
            speed_mhz: 1000,
            memory: MemoryStats::default(),
            swap: SwapStats::default(),
            load: LoadStats::default(),
        }
    }

    #[tokio::test]
    async fn sweep_never_probes_self() {
        // Regression guard for the "every peer other than self" rule;
        // a self-probe against a Nursery's own mTLS port from inside
        // its own reaper loop would deadlock the connection pool under
        // load, so this is asserted at the membership-filtering layer.
        let m = Membership::new();
        m.upsert(info("primary", "https://primary:8989")).await;
        m.upsert(info("b", "https://b:8989")).await;
        let snapshot = m.snapshot().await;
        let probed: Vec<_> = snapshot.keys().filter(|n| n.as_str() != "primary").collect();
        assert_eq!(probed, vec!["b"]);
    }
}
