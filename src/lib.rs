// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # sysreg - Embedded Registry Control Plane for Kubernetes
//!
//! sysreg manages the system registry that runs on every control-plane node
//! of a cluster. It is made of three processes sharing this library:
//!
//! - **Operator** (`sysreg`): leader-elected controllers that keep the
//!   registry PKI, users and per-node configuration in sync and publish one
//!   [`crd::ControlPlaneNode`] per master node
//! - **Node agent** (`sysreg-node-agent`): applies its node's
//!   `ControlPlaneNode` to the host filesystem and reports readiness
//! - **Modules watcher** (`sysreg-modules-watcher`): scans module registries
//!   and publishes documentation of every release channel
//!
//! ## Modules
//!
//! - [`crd`] - `ControlPlaneNode` and the consumed `ModuleConfig`
//! - [`reconcilers`] - registry and control-plane node reconciliation
//! - [`controllers`] - controller wiring and reflectors
//! - [`registry`] - in-memory registry state and the node rollout plan
//! - [`node_services`] - per-node services payload and static pod manifest
//! - [`pki`], [`users`], [`checksum`] - material and checksums behind the payload
//! - [`agent`] - node-local apply loop
//! - [`watcher`] - registry modules watcher and documentation sender
//!
//! ## Example
//!
//! ```rust,no_run
//! use sysreg::checksum::sha256_hex;
//!
//! let version = sha256_hex(b"payload");
//! assert_eq!(version.len(), 64);
//! ```

pub mod agent;
pub mod checksum;
pub mod cli;
pub mod constants;
pub mod context;
pub mod controllers;
pub mod crd;
pub mod errors;
pub mod labels;
pub mod leader;
pub mod metrics;
pub mod migrations;
pub mod node_services;
pub mod pki;
pub mod reconcilers;
pub mod registry;
pub mod server;
pub mod settings;
pub mod status_reasons;
pub mod telemetry;
pub mod users;
pub mod watcher;

#[cfg(test)]
mod crd_tests;
#[cfg(test)]
mod errors_tests;
