// src/transport/mod.rs
//! Mutually-authenticated transport.

pub mod client;
pub mod router;
pub mod server;

pub use client::MtlsClient;
pub use router::{PartialRouteError, RouteMatch, RouteNode, RouteTree};
pub use server::{serve_mtls, serve_static_file, Handler, HandlerFuture, Webserver};
