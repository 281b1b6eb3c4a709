// src/discovery.rs
//! Heartbeat emitter, collector, and reader; the membership map they
//! share.
//!
//! Callers that need to iterate the whole map (the reaper, the control
//! fan-out) get a cloned snapshot instead of a callback run under a
//! held write lock, avoiding a re-entrancy hazard: snapshot-then-release
//! instead of holding the lock across caller-supplied work.

use crate::model::{NurseryControlState, NurseryInfo, NurseryInfoMap};
use crate::transport::client::MtlsClient;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::RwLock;

/// Shared, lock-guarded membership cache. Exactly one copy is
/// authoritative (the primary's); every node, primary included, keeps
/// one of these for its own `GET /heartbeat` responses.
#[derive(Clone)]
pub struct Membership {
    map: Arc<RwLock<NurseryInfoMap>>,
}

impl Default for Membership {
    fn default() -> Self {
        Self::new()
    }
}

impl Membership {
    pub fn new() -> Self {
        Self { map: Arc::new(RwLock::new(NurseryInfoMap::new())) }
    }

    /// Snapshot the whole map under the read lock, then release it —
    /// never hold the lock across a caller-supplied callback.
    pub async fn snapshot(&self) -> NurseryInfoMap {
        self.map.read().await.clone()
    }

    /// Heartbeat ingest on the primary: upsert by Name; an empty Name
    /// is ignored.
    pub async fn upsert(&self, info: NurseryInfo) {
        if !info.is_named() {
            return;
        }
        self.map.write().await.insert(info.name.clone(), info);
    }

    /// Heartbeat response assimilation on a secondary: replace the
    /// local cache only with a non-empty map.
    pub async fn replace_if_nonempty(&self, new_map: NurseryInfoMap) {
        if new_map.is_empty() {
            return;
        }
        *self.map.write().await = new_map;
    }

    /// Reaper eviction: bulk-delete marked entries after a sweep.
    pub async fn remove_many(&self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let mut guard = self.map.write().await;
        for name in names {
            guard.remove(name);
        }
    }

    pub async fn remove(&self, name: &str) {
        self.map.write().await.remove(name);
    }
}

/// Sample local host stats for a heartbeat payload.
pub fn sample_host_stats(sys: &mut System) -> (u32, u64, crate::model::MemoryStats, crate::model::SwapStats, crate::model::LoadStats) {
    sys.refresh_memory();
    sys.refresh_cpu();

    let cores = sys.cpus().len() as u32;
    let speed_mhz = sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);

    let total = sys.total_memory();
    let used = sys.used_memory();
    let memory = crate::model::MemoryStats {
        total,
        used,
        percent_used: if total > 0 { used as f32 / total as f32 * 100.0 } else { 0.0 },
    };

    let swap_total = sys.total_swap();
    let swap_used = sys.used_swap();
    let swap = crate::model::SwapStats {
        total: swap_total,
        used: swap_used,
        percent_used: if swap_total > 0 { swap_used as f32 / swap_total as f32 * 100.0 } else { 0.0 },
    };

    let load = System::load_average();
    let load = crate::model::LoadStats { one: load.one, five: load.five, fifteen: load.fifteen };

    (cores, speed_mhz, memory, swap, load)
}

/// Heartbeat emitter background task: runs on every node, primary
/// included (the primary's own heartbeats populate its map too).
pub async fn run_heartbeat_emitter(
    membership: Membership,
    client: MtlsClient,
    self_name: String,
    self_base_url: String,
    self_port: u16,
    primary_url: String,
    is_primary: bool,
    state: Arc<RwLock<NurseryControlState>>,
    processes: Arc<std::sync::atomic::AtomicU32>,
) {
    let mut sys = System::new();
    loop {
        let delay_secs = rand::thread_rng().gen_range(0..=10);
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;

        let (cores, speed_mhz, memory, swap, load) = sample_host_stats(&mut sys);
        let info = NurseryInfo {
            name: self_name.clone(),
            base_url: self_base_url.clone(),
            port: self_port,
            state: *state.read().await,
            processes: processes.load(std::sync::atomic::Ordering::Relaxed),
            cores,
            speed_mhz,
            memory,
            swap,
            load,
        };

        let url = format!("{}/heartbeat", primary_url.trim_end_matches('/'));
        let response_bytes = client.post_json(&url, &info).await;
        if response_bytes.is_empty() {
            tracing::debug!("heartbeat to {url} produced no response");
            continue;
        }
        let remote_map: NurseryInfoMap = match serde_json::from_slice(&response_bytes) {
            Ok(map) => map,
            Err(e) => {
                tracing::debug!("failed to decode heartbeat response: {e}");
                continue;
            }
        };

        if !is_primary {
            membership.replace_if_nonempty(remote_map).await;
        }
    }
}

fn wants_json(req: &Request) -> bool {
    req.headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("json"))
        .unwrap_or(false)
}

fn respond_map(map: &NurseryInfoMap, wants_json: bool) -> Response {
    if wants_json {
        axum::Json(map).into_response()
    } else {
        let mut body = String::from("<html><body><table>");
        for (name, info) in map {
            body.push_str(&format!(
                "<tr><td>{name}</td><td>{}</td><td>{}</td></tr>",
                info.base_url, info.state
            ));
        }
        body.push_str("</table></body></html>");
        ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
    }
}

/// `GET /heartbeat` — return the local cached map.
pub async fn handle_get_heartbeat(membership: Membership, req: Request) -> Response {
    let json = wants_json(&req);
    let map = membership.snapshot().await;
    respond_map(&map, json)
}

/// `POST /heartbeat` — primary-side collector: upsert and return the
/// full authoritative map.
pub async fn handle_post_heartbeat(membership: Membership, req: Request) -> Response {
    let bytes = match axum::body::to_bytes(req.into_body(), 1024 * 1024).await {
        Ok(b) => b,
        Err(_) => return (StatusCode::BAD_REQUEST, "failed to read body").into_response(),
    };
    let info: NurseryInfo = match serde_json::from_slice(&bytes) {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!("malformed heartbeat body: {e}");
            return (StatusCode::BAD_REQUEST, "malformed NurseryInfo body").into_response();
        }
    };
    membership.upsert(info).await;
    let map = membership.snapshot().await;
    axum::Json(map).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoadStats, MemoryStats, SwapStats};

    fn sample_info(name: &str) -> NurseryInfo {
        NurseryInfo {
            name: name.into(),
            base_url: format!("https://{name}:8989"),
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
    async fn upsert_with_empty_name_is_ignored() {
        let m = Membership::new();
        let mut info = sample_info("");
        info.name.clear();
        m.upsert(info).await;
        assert!(m.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_registration_round_trip() {
        let m = Membership::new();
        m.upsert(sample_info("b")).await;
        let snap = m.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key("b"));
    }

    #[tokio::test]
    async fn secondary_ignores_empty_response_map() {
        let m = Membership::new();
        m.upsert(sample_info("b")).await;
        m.replace_if_nonempty(NurseryInfoMap::new()).await;
        // still has "b": an empty response must never wipe the cache
        assert!(m.snapshot().await.contains_key("b"));
    }

    #[tokio::test]
    async fn reaper_eviction_removes_named_entries() {
        let m = Membership::new();
        m.upsert(sample_info("b")).await;
        m.upsert(sample_info("c")).await;
        m.remove_many(&["b".to_string()]).await;
        let snap = m.snapshot().await;
        assert!(!snap.contains_key("b"));
        assert!(snap.contains_key("c"));
    }
}
