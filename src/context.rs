// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Shared context for the operator controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the Kubernetes client
//! - reflector stores for `Node`s and `ControlPlaneNode`s
//! - the in-memory embedded registry mirror
//! - its own requeue rate limiter
//! - operator settings resolved from flags
//!
//! The stores give watch mappers and reconcilers in-memory lookups without API queries.

use crate::crd::ControlPlaneNode;
use crate::labels::is_control_plane;
use crate::node_services::Images;
use crate::reconcilers::retry::RateLimiter;
use crate::registry::SharedRegistry;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::sync::Arc;

/// Operator settings resolved from command-line flags and environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorSettings {
    /// Namespace of the registry secrets
    pub registry_namespace: String,
    /// Namespace of the control-plane config and PKI secrets
    pub control_plane_namespace: String,
    /// Name of the control-plane config secret
    pub config_secret: String,
    /// Name of the control-plane PKI secret
    pub pki_secret: String,
    /// Static pod images
    pub images: Images,
}

/// Shared controller context.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub stores: Stores,
    pub settings: OperatorSettings,
    /// In-memory mirror of CA, users, HTTP secret and node certificates
    pub registry: SharedRegistry,
    /// Requeue delays of this controller
    pub rate_limiter: Arc<RateLimiter>,
}

impl Context {
    /// Copy of this context with a fresh rate limiter, for a second controller.
    #[must_use]
    pub fn with_own_rate_limiter(&self) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::default()),
            ..self.clone()
        }
    }
}

/// Reflector stores shared by the controllers.
#[derive(Clone)]
pub struct Stores {
    pub nodes: Store<Node>,
    pub control_plane_nodes: Store<ControlPlaneNode>,
}

/// A control-plane node with a known internal IP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterNodeAddress {
    pub name: String,
    pub internal_ip: String,
}

/// First `InternalIP` address of a node.
#[must_use]
pub fn node_internal_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|address| address.type_ == "InternalIP")
        .map(|address| address.address.clone())
}

/// Whether a node carries the control-plane role label.
#[must_use]
pub fn is_master(node: &Node) -> bool {
    is_control_plane(node.labels())
}

impl Stores {
    /// Control-plane nodes with their internal IP, sorted by name.
    ///
    /// Nodes without an internal IP yet are skipped; they are picked up once
    /// the kubelet reports an address.
    #[must_use]
    pub fn master_nodes(&self) -> Vec<MasterNodeAddress> {
        let mut nodes: Vec<MasterNodeAddress> = self
            .nodes
            .state()
            .iter()
            .filter(|node| is_master(node))
            .filter_map(|node| {
                let internal_ip = node_internal_ip(node)?;
                Some(MasterNodeAddress {
                    name: node.name_any(),
                    internal_ip,
                })
            })
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Names of every control-plane node, addressable or not.
    #[must_use]
    pub fn master_node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .state()
            .iter()
            .filter(|node| is_master(node))
            .map(|node| node.name_any())
            .collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn get_node(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes
            .state()
            .iter()
            .find(|node| node.name_any() == name)
            .cloned()
    }

    #[must_use]
    pub fn get_control_plane_node(&self, name: &str) -> Option<Arc<ControlPlaneNode>> {
        self.control_plane_nodes
            .state()
            .iter()
            .find(|cpn| cpn.name_any() == name)
            .cloned()
    }

    /// `ControlPlaneNode`s whose `Node` is gone or is no longer a master.
    #[must_use]
    pub fn orphan_control_plane_nodes(&self) -> Vec<String> {
        let masters = self.master_node_names();
        let mut orphans: Vec<String> = self
            .control_plane_nodes
            .state()
            .iter()
            .map(|cpn| cpn.name_any())
            .filter(|name| !masters.contains(name))
            .collect();
        orphans.sort();
        orphans
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
