// src/node.rs
//! Node bootstrap: wire trust material, transport, discovery, control,
//! the reaper, and actions together for one Nursery process.
//!
//! Load config, build shared state, spawn background tasks, serve
//! until killed.

use crate::actions::{self, RunHandle};
use crate::config::NurseryConfig;
use crate::control::{self, ControlContext, ControlState};
use crate::discovery::{self, Membership};
use crate::error::{Error, Result};
use crate::model::ActionConfig;
use crate::transport::client::MtlsClient;
use crate::transport::server::{self, serve_mtls, Webserver};
use axum::extract::{Path, Request};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Everything a request handler needs, cheaply `Clone`-able (an `Arc`
/// per field or an already-`Clone` wrapper, flattened since each piece
/// has its own internal locking already).
#[derive(Clone)]
pub struct NodeState {
    pub config: Arc<NurseryConfig>,
    pub membership: Membership,
    pub control: ControlState,
    pub client: MtlsClient,
    pub shutdown_handle: axum_server::Handle,
}

impl NodeState {
    fn control_ctx(&self) -> ControlContext {
        ControlContext {
            self_name: self.config.name.clone(),
            self_base_url: self.config.base_url.clone(),
            membership: self.membership.clone(),
            control: self.control.clone(),
            client: self.client.clone(),
            shutdown_handle: self.shutdown_handle.clone(),
            kill_grace_period: Duration::from_secs(30),
        }
    }
}

/// Load certs/keys off disk and build this node's mTLS client.
fn build_client(config: &NurseryConfig) -> Result<MtlsClient> {
    let cert = std::fs::read(&config.server_cert_path)
        .map_err(|e| Error::Trust(format!("failed to read server cert: {e}")))?;
    let key = std::fs::read(&config.key_path)
        .map_err(|e| Error::Trust(format!("failed to read server key: {e}")))?;
    let ca = std::fs::read(&config.ca_cert_path)
        .map_err(|e| Error::Trust(format!("failed to read CA cert: {e}")))?;
    MtlsClient::new(&cert, &key, &ca)
}

fn build_router(state: NodeState) -> axum::Router {
    let mut server: Webserver<NodeState> = Webserver::new(state);

    server
        .describe_route("/", "Nursery root", true)
        .describe_route("/heartbeat", "Federation membership heartbeat", true)
        .describe_route("/control", "This Nursery's control state", true)
        .describe_route("/control/all", "Federation-wide control fan-out", false)
        .describe_route("/action", "Action catalog", true)
        .describe_route("/action/output", "Action run output", true);

    server.get("/", |s: NodeState, _req: Request| async move {
        if s.config.html_dir.as_os_str().is_empty() {
            return (StatusCode::OK, "nursery").into_response();
        }
        crate::transport::serve_static_file(&s.config.html_dir, "index.html").await
    });

    server.get("/heartbeat", |s: NodeState, req: Request| async move {
        discovery::handle_get_heartbeat(s.membership, req).await
    });
    server.post("/heartbeat", |s: NodeState, req: Request| async move {
        discovery::handle_post_heartbeat(s.membership, req).await
    });

    server.get("/control", |s: NodeState, req: Request| async move {
        control::handle_get_control(s.control_ctx(), req).await
    });
    server.get("/action", |s: NodeState, _req: Request| async move {
        let list = actions::scan_catalog(&s.config.actions_dir);
        axum::Json(list).into_response()
    });

    server.into_router()
}

/// Build the full axum router. The route tree above handles the fixed
/// prefixes (and the descriptive default-listing/404 fallback); this
/// extra axum layer resolves the `:param` segments the tree can't
/// express directly (`/control/<target>`, `/action/<name>`,
/// `/action/output/...`). Each is registered with `any()` rather than a
/// single method, so a mismatched verb reaches the handler (and gets the
/// `?method=`-override, 404-not-405 treatment `dispatch` gives the fixed
/// paths above) instead of axum's own built-in 405.
pub fn router(state: NodeState) -> axum::Router {
    let base = build_router(state.clone());

    axum::Router::new()
        .merge(base)
        .route(
            "/favicon.ico",
            axum::routing::get({
                let state = state.clone();
                move || {
                    let state = state.clone();
                    async move {
                        crate::transport::serve_static_file(&state.config.html_dir, "favicon.ico").await
                    }
                }
            }),
        )
        .route(
            "/static/*path",
            axum::routing::get({
                let state = state.clone();
                move |Path(path): Path<String>| {
                    let state = state.clone();
                    async move { crate::transport::serve_static_file(&state.config.html_dir, &path).await }
                }
            }),
        )
        .route(
            "/control/all/:target",
            axum::routing::any({
                let state = state.clone();
                move |Path(target): Path<String>, req: Request| {
                    let state = state.clone();
                    async move {
                        match server::effective_method(&req) {
                            Method::PUT => {
                                control::handle_put_control_all(state.control_ctx(), Path(target)).await
                            }
                            m => server::method_not_found("/control/all/:target", &m),
                        }
                    }
                }
            }),
        )
        .route(
            "/control/:target",
            axum::routing::any({
                let state = state.clone();
                move |Path(target): Path<String>, req: Request| {
                    let state = state.clone();
                    async move {
                        match server::effective_method(&req) {
                            Method::PUT => control::handle_put_control(state.control_ctx(), Path(target)).await,
                            m => server::method_not_found("/control/:target", &m),
                        }
                    }
                }
            }),
        )
        .route(
            "/action/:name",
            axum::routing::any({
                let state = state.clone();
                move |Path(name): Path<String>, req: Request| {
                    let state = state.clone();
                    async move { action_name_handler(state, name, req).await }
                }
            }),
        )
        .route(
            "/action/output",
            axum::routing::any({
                let state = state.clone();
                move |req: Request| {
                    let state = state.clone();
                    async move { output_handler(state, None, None, None, req).await }
                }
            }),
        )
        .route(
            "/action/output/:action",
            axum::routing::any({
                let state = state.clone();
                move |Path(action): Path<String>, req: Request| {
                    let state = state.clone();
                    async move { output_handler(state, Some(action), None, None, req).await }
                }
            }),
        )
        .route(
            "/action/output/:action/:run",
            axum::routing::any({
                let state = state.clone();
                move |Path((action, run)): Path<(String, String)>, req: Request| {
                    let state = state.clone();
                    async move { output_handler(state, Some(action), Some(run), None, req).await }
                }
            }),
        )
        .route(
            "/action/output/:action/:run/:file",
            axum::routing::any({
                let state = state.clone();
                move |Path((action, run, file)): Path<(String, String, String)>, req: Request| {
                    let state = state.clone();
                    async move {
                        match server::effective_method(&req) {
                            Method::GET => get_output_file(state, action, run, file).await,
                            Method::DELETE => {
                                delete_output_and_redirect(state, Some(action), Some(run), Some(file)).await
                            }
                            m => server::method_not_found("/action/output/:action/:run/:file", &m),
                        }
                    }
                }
            }),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// `GET`/`POST /action/:name` — share one registration so a `?method=`
/// override or a mismatched verb both land here instead of axum's 405.
async fn action_name_handler(state: NodeState, name: String, req: Request) -> Response {
    match server::effective_method(&req) {
        Method::GET => get_action_description(state, name).await,
        Method::POST => {
            let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
                Ok(bytes) => bytes,
                Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            };
            let cfg: ActionConfig = match serde_json::from_slice(&body) {
                Ok(cfg) => cfg,
                Err(e) => {
                    return (StatusCode::BAD_REQUEST, format!("invalid action config: {e}")).into_response()
                }
            };
            post_action_run(state, name, cfg).await
        }
        m => server::method_not_found("/action/:name", &m),
    }
}

/// `GET`/`DELETE /action/output[/:action[/:run]]` — the three shallower
/// cascading-output depths; the deepest (`.../:file`) is handled inline
/// in `router` since `GET` there serves a file, not a listing.
async fn output_handler(
    state: NodeState,
    action: Option<String>,
    run: Option<String>,
    file: Option<String>,
    req: Request,
) -> Response {
    match server::effective_method(&req) {
        Method::GET => get_output_listing(state, action, run).await,
        Method::DELETE => delete_output_and_redirect(state, action, run, file).await,
        m => server::method_not_found("/action/output", &m),
    }
}

async fn get_action_description(state: NodeState, name: String) -> Response {
    let list = actions::scan_catalog(&state.config.actions_dir);
    match list.get(&name) {
        Some(desc) => axum::Json(desc).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown action '{name}'")).into_response(),
    }
}

async fn post_action_run(state: NodeState, name: String, cfg: ActionConfig) -> Response {
    let RunHandle { run_id, .. } = match actions::run_action(
        &state.config.actions_dir,
        &state.config.work_dir.join("output"),
        &state.control,
        &name,
        &cfg,
    )
    .await
    {
        Ok(handle) => handle,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    Redirect::to(&format!("/action/output/{name}/{run_id}")).into_response()
}

async fn get_output_listing(
    state: NodeState,
    action: Option<String>,
    run: Option<String>,
) -> Response {
    let output_dir = state.config.work_dir.join("output");
    let entries = match (&action, &run) {
        (None, _) => actions::list_runs(&output_dir, None),
        (Some(a), None) => actions::list_runs(&output_dir, Some(a)),
        (Some(a), Some(r)) => actions::list_run_files(&output_dir, a, r),
    };
    axum::Json(entries).into_response()
}

async fn get_output_file(state: NodeState, action: String, run: String, file: String) -> Response {
    let path = state.config.work_dir.join("output").join(&action).join(&run).join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "file not found").into_response(),
    }
}

async fn delete_output_and_redirect(
    state: NodeState,
    action: Option<String>,
    run: Option<String>,
    file: Option<String>,
) -> Response {
    let output_dir = state.config.work_dir.join("output");
    if let Err(e) = actions::delete_output(
        &output_dir,
        action.as_deref(),
        run.as_deref(),
        file.as_deref(),
    )
    .await
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    // 303 back to the parent list.
    let parent = match (action, run, file) {
        (None, _, _) => "/action/output".to_string(),
        (Some(_), None, _) => "/action/output".to_string(),
        (Some(a), Some(_), None) => format!("/action/output/{a}"),
        (Some(a), Some(r), Some(_)) => format!("/action/output/{a}/{r}"),
    };
    Redirect::to(&parent).into_response()
}

/// Wire one Nursery together and serve it until killed: build state,
/// launch background heartbeat/reaper loops, serve the mTLS surface.
pub async fn run_node(config: NurseryConfig) -> Result<()> {
    config.validate()?;
    let client = build_client(&config)?;
    let membership = Membership::new();
    let control = ControlState::new();
    let shutdown_handle = axum_server::Handle::new();

    let is_primary = config.is_primary();
    tracing::info!(
        name = %config.name,
        primary = is_primary,
        "starting Nursery node"
    );

    let state = NodeState {
        config: Arc::new(config.clone()),
        membership: membership.clone(),
        control: control.clone(),
        client: client.clone(),
        shutdown_handle: shutdown_handle.clone(),
    };

    tokio::spawn(discovery::run_heartbeat_emitter(
        membership.clone(),
        client.clone(),
        config.name.clone(),
        config.base_url.clone(),
        config.port,
        config.primary_url.clone(),
        is_primary,
        control.state_handle(),
        control.in_flight_handle(),
    ));

    if is_primary {
        tokio::spawn(crate::reaper::run_grim_reaper(
            membership.clone(),
            client.clone(),
            config.name.clone(),
        ));
    }

    let bind_addr: std::net::SocketAddr = format!("{}:{}", config.interface, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid interface/port: {e}")))?;

    let server_cert = std::fs::read(&config.server_cert_path)
        .map_err(|e| Error::Trust(format!("failed to read server cert: {e}")))?;
    let server_key = std::fs::read(&config.key_path)
        .map_err(|e| Error::Trust(format!("failed to read server key: {e}")))?;
    let ca_cert = std::fs::read(&config.ca_cert_path)
        .map_err(|e| Error::Trust(format!("failed to read CA cert: {e}")))?;

    let app = router(state);
    serve_mtls(app, bind_addr, &server_cert, &server_key, &ca_cert, shutdown_handle).await
}
