// src/transport/server.rs
//! mTLS server: mandatory client-cert verification, the hierarchical
//! route tree, and the `?method=` / `Accept` dispatch rules.
//!
//! axum + `axum-server`/rustls wiring with `AllowAnyAuthenticatedClient`
//! for mandatory client certs; a thin `Webserver` builder registers
//! per-path handlers and a single dispatch fallback walks the prefix
//! tree instead of relying on axum's own declarative path table.

use super::router::{RouteMatch, RouteTree};
use crate::error::{Error, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, PrivateKey, RootCertStore, ServerConfig as RustlsServerConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
pub type Handler<S> = Arc<dyn Fn(S, Request) -> HandlerFuture + Send + Sync>;

/// Builder for the Federation's hierarchical-prefix-tree webserver.
pub struct Webserver<S: Clone + Send + Sync + 'static> {
    routes: RouteTree<Handler<S>>,
    state: S,
}

impl<S: Clone + Send + Sync + 'static> Webserver<S> {
    pub fn new(state: S) -> Self {
        Self { routes: RouteTree::new(), state }
    }

    /// Two-step registration step 1: create/describe a node.
    pub fn describe_route(&mut self, path: &str, desc: &str, visible: bool) -> &mut Self {
        self.routes.describe_route(path, desc, visible);
        self
    }

    /// Two-step registration step 2: attach a method-specific handler.
    pub fn add_handler<F, Fut>(&mut self, path: &str, method: Method, handler: F) -> &mut Self
    where
        F: Fn(S, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let wrapped: Handler<S> = Arc::new(move |s, req| Box::pin(handler(s, req)));
        self.routes.add_handler(path, method, wrapped);
        self
    }

    pub fn get<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(S, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.add_handler(path, Method::GET, handler)
    }

    pub fn post<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(S, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.add_handler(path, Method::POST, handler)
    }

    pub fn put<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(S, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.add_handler(path, Method::PUT, handler)
    }

    pub fn delete<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(S, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.add_handler(path, Method::DELETE, handler)
    }

    pub fn into_router(self) -> Router {
        let shared = Arc::new(DispatchState { routes: self.routes, state: self.state });
        Router::new()
            .fallback(dispatch::<S>)
            .with_state(shared)
    }
}

struct DispatchState<S> {
    routes: RouteTree<Handler<S>>,
    state: S,
}

/// Single dispatcher behind every path: resolves the effective method
/// (the `method` query param overrides the HTTP verb), finds the route,
/// and falls back to a content-negotiated listing or a descriptive 404.
async fn dispatch<S: Clone + Send + Sync + 'static>(
    State(shared): State<Arc<DispatchState<S>>>,
    req: Request,
) -> Response {
    let path = req.uri().path().to_string();
    let effective_method = effective_method(&req);
    let wants_json = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("json"))
        .unwrap_or(false);

    match shared.routes.find_route(&path) {
        RouteMatch::Full(node) => {
            if let Some(handler) = node.handler(&effective_method) {
                handler(shared.state.clone(), req).await
            } else if effective_method == Method::GET {
                default_listing(node.full_path.as_str(), node.visible_children(), wants_json)
            } else {
                not_found(&format!(
                    "{path} has no handler for method {effective_method}"
                ))
            }
        }
        RouteMatch::Partial(err) => not_found(&format!(
            "no route below {path}: matched {}/{} segments, stopped at '{}'",
            err.num_parts_found, err.num_parts, err.cur_prefix
        )),
    }
}

fn default_listing<'a, H: 'a>(
    full_path: &str,
    children: impl Iterator<Item = &'a super::router::RouteNode<H>>,
    wants_json: bool,
) -> Response {
    let entries: Vec<(String, String)> = children
        .map(|c| (c.full_path.clone(), c.description.clone()))
        .collect();

    if wants_json {
        axum::Json(entries.into_iter().collect::<std::collections::HashMap<_, _>>())
            .into_response()
    } else {
        let mut body = format!("<html><body><h1>{full_path}</h1><ul>");
        for (path, desc) in entries {
            body.push_str(&format!("<li><a href=\"{path}\">{path}</a> - {desc}</li>"));
        }
        body.push_str("</ul></body></html>");
        ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
    }
}

/// An unknown or unhandled method on a known route is a 404 with a
/// descriptive body, deliberately not 405.
fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, message.to_string()).into_response()
}

/// Resolve the effective method for a request: a `?method=` query param
/// overrides the HTTP verb actually used, the same override `dispatch`
/// honors for the fixed-path routes. Routes carrying axum `:param`
/// segments apply this themselves to get the same override behavior
/// `dispatch` gives the fixed paths.
pub fn effective_method(req: &Request) -> Method {
    let query_override = req.uri().query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "method")
            .map(|(_, v)| v.to_string())
    });
    query_override
        .and_then(|m| m.to_uppercase().parse::<Method>().ok())
        .unwrap_or_else(|| req.method().clone())
}

/// A method with no handler on a known `:param` route: 404, matching
/// `dispatch`'s "unrecognized method is a 404, not a 405" rule.
pub fn method_not_found(path: &str, method: &Method) -> Response {
    not_found(&format!("{path} has no handler for method {method}"))
}

/// Bind and serve `router` over TLS 1.2+, requiring a client cert that
/// chains to `ca_pem`.
pub async fn serve_mtls(
    router: Router,
    bind_addr: SocketAddr,
    server_cert_pem: &[u8],
    server_key_pem: &[u8],
    ca_pem: &[u8],
    handle: axum_server::Handle,
) -> Result<()> {
    let cert_chain = rustls_pemfile::certs(&mut &server_cert_pem[..])
        .map_err(|e| Error::Transport(format!("bad server cert PEM: {e}")))?
        .into_iter()
        .map(Certificate)
        .collect::<Vec<_>>();

    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut &server_key_pem[..])
        .map_err(|e| Error::Transport(format!("bad server key PEM: {e}")))?;
    if keys.is_empty() {
        return Err(Error::Transport("server key PEM contained no PKCS#8 keys".into()));
    }
    let key = PrivateKey(keys.remove(0));

    let mut roots = RootCertStore::empty();
    for der in rustls_pemfile::certs(&mut &ca_pem[..])
        .map_err(|e| Error::Transport(format!("bad CA cert PEM: {e}")))?
    {
        roots
            .add(&Certificate(der))
            .map_err(|e| Error::Transport(format!("failed to trust CA cert: {e}")))?;
    }
    let verifier = AllowAnyAuthenticatedClient::new(roots);

    let tls_config = RustlsServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(Arc::new(verifier))
        .with_single_cert(cert_chain, key)
        .map_err(|e| Error::Transport(format!("invalid server cert/key pair: {e}")))?;

    let rustls_config = axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(tls_config));

    axum_server::bind_rustls(bind_addr, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|e| Error::Transport(format!("mTLS server error: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(method: Method, uri: &str) -> Request {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn effective_method_defaults_to_the_http_verb() {
        let req = request(Method::GET, "/control/one");
        assert_eq!(effective_method(&req), Method::GET);
    }

    #[test]
    fn effective_method_honors_the_query_override() {
        let req = request(Method::GET, "/control/one?method=PUT");
        assert_eq!(effective_method(&req), Method::PUT);
    }

    #[test]
    fn effective_method_ignores_an_unparseable_override() {
        let req = request(Method::POST, "/control/one?method=not-a-method");
        assert_eq!(effective_method(&req), Method::POST);
    }
}

/// Serve static assets (index, favicon, `/static/*`) straight from
/// disk; a specialized GET registered like any other route.
pub async fn serve_static_file(dir: &std::path::Path, rel_path: &str) -> Response {
    let target = dir.join(rel_path.trim_start_matches('/'));
    match tokio::fs::read(&target).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(bytes))
            .unwrap_or_else(|_| not_found("failed to build static response")),
        Err(_) => not_found(&format!("static asset not found: {rel_path}")),
    }
}
