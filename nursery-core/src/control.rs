// src/control.rs
//! Per-node lifecycle state machine, fan-out to peers, and the
//! kill-gating shutdown sequence.
//!
//! `kill` does not just flip the state: it spawns a watcher that waits
//! for the in-flight action count to reach zero (bounded by a grace
//! period) before signalling graceful shutdown, draining outstanding
//! action runs the way a long-running daemon drains its worker pool
//! before exiting.

use crate::discovery::Membership;
use crate::model::{
    build_federation_state_map, NurseryControlState, NurseryState, FEDERATION_ROW_NAME,
};
use crate::transport::client::MtlsClient;
use axum::extract::{Path, Request};
use axum::response::{IntoResponse, Response};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// This node's control state, guarded the same way as the membership
/// map: `set`/`get` are the only mutators/accessors.
#[derive(Clone)]
pub struct ControlState {
    state: Arc<RwLock<NurseryControlState>>,
    in_flight: Arc<AtomicU32>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(NurseryControlState::Up)),
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    pub async fn get(&self) -> NurseryControlState {
        *self.state.read().await
    }

    pub async fn set(&self, target: NurseryControlState) {
        *self.state.write().await = target;
    }

    pub fn processes(&self) -> u32 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn in_flight_handle(&self) -> Arc<AtomicU32> {
        self.in_flight.clone()
    }

    /// Shared handle to the underlying state lock, for background tasks
    /// (the heartbeat emitter) that need to read it without going
    /// through `get`/`set` on every tick.
    pub fn state_handle(&self) -> Arc<RwLock<NurseryControlState>> {
        self.state.clone()
    }

    /// RAII guard an action run holds for its lifetime, so `Processes`
    /// and the kill-gate both see accurate counts.
    pub fn begin_action(&self) -> ActionRunGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActionRunGuard { counter: self.in_flight.clone() }
    }
}

pub struct ActionRunGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for ActionRunGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared state a control handler needs: who am I, who else is out
/// there, and how do I reach them.
#[derive(Clone)]
pub struct ControlContext {
    pub self_name: String,
    pub self_base_url: String,
    pub membership: Membership,
    pub control: ControlState,
    pub client: MtlsClient,
    pub shutdown_handle: axum_server::Handle,
    pub kill_grace_period: Duration,
}

/// `GET /control` — the FederationStateMap derived from the local view
/// of membership, plus the synthesized "Federation" row (its Processes
/// is the sum across all peers).
pub async fn handle_get_control(ctx: ControlContext, _req: Request) -> Response {
    let members = ctx.membership.snapshot().await;
    let self_state = ctx.control.get().await;
    let map = build_federation_state_map(&members, &ctx.self_name, self_state);
    axum::Json(map).into_response()
}

/// `PUT /control/<target>` — change this Nursery's state; `kill`
/// schedules an orderly shutdown after the response is served.
pub async fn handle_put_control(
    ctx: ControlContext,
    Path(target): Path<String>,
) -> Response {
    let Some(new_state) = NurseryControlState::parse(&target) else {
        tracing::warn!("ignoring unrecognized control target '{target}'");
        return respond_with_current_state(&ctx).await;
    };

    ctx.control.set(new_state).await;
    tracing::info!(node = %ctx.self_name, target = %new_state, "control transition applied");

    if new_state == NurseryControlState::Kill {
        spawn_kill_gate(ctx.clone());
    }

    respond_with_current_state(&ctx).await
}

/// `PUT /control/all/<target>` — fan out to every known peer other than
/// self sequentially, then apply the change locally.
pub async fn handle_put_control_all(
    ctx: ControlContext,
    Path(target): Path<String>,
) -> Response {
    let members = ctx.membership.snapshot().await;
    for (name, info) in &members {
        if name == &ctx.self_name {
            continue;
        }
        let url = format!("{}/control/{target}", info.base_url.trim_end_matches('/'));
        let _ = ctx.client.put_json(&url, &serde_json::json!({})).await;
    }

    if let Some(new_state) = NurseryControlState::parse(&target) {
        ctx.control.set(new_state).await;
        tracing::info!(node = %ctx.self_name, target = %new_state, "federation-wide control transition applied");
        if new_state == NurseryControlState::Kill {
            spawn_kill_gate(ctx.clone());
        }
    } else {
        tracing::warn!("ignoring unrecognized federation-wide control target '{target}'");
    }

    respond_with_current_state(&ctx).await
}

async fn respond_with_current_state(ctx: &ControlContext) -> Response {
    let members = ctx.membership.snapshot().await;
    let self_state = ctx.control.get().await;
    let mut map = build_federation_state_map(&members, &ctx.self_name, self_state);
    map.insert(
        ctx.self_name.clone(),
        NurseryState {
            base_url: ctx.self_base_url.clone(),
            url_modifier: String::new(),
            state: self_state,
            processes: ctx.control.processes(),
        },
    );
    if let Some(fed) = map.get_mut(FEDERATION_ROW_NAME) {
        fed.state = self_state;
    }
    axum::Json(map).into_response()
}

/// Wait for the running action count to reach zero (bounded by a grace
/// period), then trigger graceful shutdown of the mTLS server.
fn spawn_kill_gate(ctx: ControlContext) {
    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        loop {
            if ctx.control.processes() == 0 {
                break;
            }
            if started.elapsed() >= ctx.kill_grace_period {
                tracing::warn!(
                    "kill grace period elapsed with {} action(s) still running; shutting down anyway",
                    ctx.control.processes()
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        tracing::info!("draining complete, shutting down");
        ctx.shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_gate_waits_for_in_flight_actions_to_drain() {
        let control = ControlState::new();
        let guard = control.begin_action();
        assert_eq!(control.processes(), 1);
        drop(guard);
        assert_eq!(control.processes(), 0);
    }

    #[test]
    fn unrecognized_target_does_not_panic() {
        assert_eq!(NurseryControlState::parse("sleeping"), None);
    }
}
