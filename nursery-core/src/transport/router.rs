// src/transport/router.rs
//! Hierarchical prefix route tree.
//!
//! A hand-rolled router, not `axum::Router`'s path-table matcher:
//! `describe_route` builds nodes, `add_handler` attaches per-method
//! handlers, and `find_route` returns either a full match or a partial
//! match reporting how many segments resolved. The generic `H` handler
//! type keeps this module pure and unit-testable without pulling in
//! axum; [`super::server`] instantiates it with a boxed async handler.

use axum::http::Method;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRouteError {
    pub num_parts_found: usize,
    pub num_parts: usize,
    pub cur_prefix: String,
}

pub enum RouteMatch<'a, H> {
    Full(&'a RouteNode<H>),
    Partial(PartialRouteError),
}

pub struct RouteNode<H> {
    pub prefix: String,
    pub full_path: String,
    pub description: String,
    pub visible: bool,
    children: HashMap<String, RouteNode<H>>,
    handlers: HashMap<Method, H>,
}

impl<H> RouteNode<H> {
    fn new(prefix: &str, full_path: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            full_path: full_path.to_string(),
            description: String::new(),
            visible: false,
            children: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn visible_children(&self) -> impl Iterator<Item = &RouteNode<H>> {
        self.children.values().filter(|c| c.visible)
    }

    pub fn handler(&self, method: &Method) -> Option<&H> {
        self.handlers.get(method)
    }
}

pub struct RouteTree<H> {
    root: RouteNode<H>,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl<H> Default for RouteTree<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> RouteTree<H> {
    pub fn new() -> Self {
        Self { root: RouteNode::new("", "/") }
    }

    /// Create (or update) the route node at `path`, filling in any
    /// missing intermediate nodes along the way.
    pub fn describe_route(&mut self, path: &str, desc: &str, visible: bool) {
        let parts = split_path(path);
        let mut node = &mut self.root;
        let mut built = String::new();
        for part in &parts {
            built.push('/');
            built.push_str(part);
            node = node
                .children
                .entry(part.to_string())
                .or_insert_with(|| RouteNode::new(part, &built));
        }
        node.description = desc.to_string();
        node.visible = visible;
    }

    /// Attach a method handler to an already-described route.
    pub fn add_handler(&mut self, path: &str, method: Method, handler: H) -> bool {
        if let Some(node) = self.find_mut(path) {
            node.handlers.insert(method, handler);
            true
        } else {
            false
        }
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut RouteNode<H>> {
        let parts = split_path(path);
        let mut node = &mut self.root;
        for part in &parts {
            node = node.children.get_mut(*part)?;
        }
        Some(node)
    }

    /// Walk the tree by path segment; return the fully-matched route or
    /// a partial-route error describing how many segments matched.
    pub fn find_route(&self, path: &str) -> RouteMatch<'_, H> {
        let parts = split_path(path);
        let mut node = &self.root;
        for (idx, part) in parts.iter().enumerate() {
            match node.children.get(*part) {
                Some(child) => node = child,
                None => {
                    return RouteMatch::Partial(PartialRouteError {
                        num_parts_found: idx,
                        num_parts: parts.len(),
                        cur_prefix: part.to_string(),
                    });
                }
            }
        }
        RouteMatch::Full(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_route_reports_matched_depth() {
        let mut tree: RouteTree<()> = RouteTree::new();
        tree.describe_route("/a/b", "b", true);

        match tree.find_route("/a/b/c") {
            RouteMatch::Partial(err) => {
                assert_eq!(err.num_parts_found, 2);
                assert_eq!(err.num_parts, 3);
                assert_eq!(err.cur_prefix, "c");
            }
            RouteMatch::Full(_) => panic!("expected a partial match"),
        }
    }

    #[test]
    fn full_route_resolves_described_node() {
        let mut tree: RouteTree<()> = RouteTree::new();
        tree.describe_route("/heartbeat", "heartbeat map", true);

        match tree.find_route("/heartbeat") {
            RouteMatch::Full(node) => assert_eq!(node.full_path, "/heartbeat"),
            RouteMatch::Partial(_) => panic!("expected a full match"),
        }
    }

    #[test]
    fn root_path_matches_root_node() {
        let tree: RouteTree<()> = RouteTree::new();
        match tree.find_route("/") {
            RouteMatch::Full(node) => assert_eq!(node.full_path, "/"),
            RouteMatch::Partial(_) => panic!("expected the root to match"),
        }
    }

    #[test]
    fn handler_attaches_only_to_described_routes() {
        let mut tree: RouteTree<i32> = RouteTree::new();
        assert!(!tree.add_handler("/nope", Method::GET, 1));
        tree.describe_route("/control", "control", true);
        assert!(tree.add_handler("/control", Method::GET, 1));
    }
}
