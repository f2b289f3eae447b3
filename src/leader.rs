// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Lease-based leader election.
//!
//! Only the leader runs the reconcilers. Non-leaders keep serving health and
//! metrics and keep their caches warm. Losing the lease ends the leader's work
//! with an error so the process restarts and re-enters the election.

use crate::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_NAME, DEFAULT_LEASE_RENEW_DEADLINE_SECS,
};
use crate::metrics;
use anyhow::{Context as _, Result};
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use std::future::Future;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lease parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    pub namespace: String,
    pub lease_name: String,
    /// Holder identity, usually the pod name
    pub identity: String,
    pub lease_duration_secs: u64,
    pub renew_deadline_secs: u64,
}

impl LeaderElectionConfig {
    #[must_use]
    pub fn new(namespace: &str, identity: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            lease_name: DEFAULT_LEASE_NAME.to_string(),
            identity: identity.to_string(),
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
            renew_deadline_secs: DEFAULT_LEASE_RENEW_DEADLINE_SECS,
        }
    }

    /// Grace period before expiry during which the holder renews.
    #[must_use]
    pub fn grace_secs(&self) -> u64 {
        self.lease_duration_secs
            .saturating_sub(self.renew_deadline_secs)
            .max(1)
    }
}

/// Wait until `leader` turns true; `false` when `shutdown` fired first.
async fn wait_for_leadership(
    leader: &mut watch::Receiver<bool>,
    shutdown: &CancellationToken,
) -> Result<bool> {
    while !*leader.borrow_and_update() {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(false),
            changed = leader.changed() => changed.context("Lease manager stopped")?,
        }
    }
    Ok(true)
}

/// Resolve once `leader` turns false or its sender is gone.
async fn wait_for_loss(leader: &mut watch::Receiver<bool>) {
    loop {
        if leader.changed().await.is_err() || !*leader.borrow_and_update() {
            return;
        }
    }
}

/// Run `work` while holding the lease.
///
/// `work` receives a child of `shutdown` and is expected to return once it is
/// cancelled. The lease is released on return.
///
/// # Errors
///
/// Returns an error if the lease cannot be managed, leadership is lost, or
/// `work` fails.
pub async fn run_leader_elected<F, Fut>(
    client: Client,
    config: LeaderElectionConfig,
    shutdown: CancellationToken,
    work: F,
) -> Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!(
        lease = %config.lease_name,
        namespace = %config.namespace,
        identity = %config.identity,
        "Starting leader election"
    );

    let manager = LeaseManagerBuilder::new(client, &config.lease_name)
        .with_namespace(&config.namespace)
        .with_identity(&config.identity)
        .with_duration(config.lease_duration_secs)
        .with_grace(config.grace_secs())
        .build()
        .await
        .context("Failed to create lease manager")?;
    let (mut leader, lease_task) = manager.watch().await;

    let result = if wait_for_leadership(&mut leader, &shutdown).await? {
        info!(identity = %config.identity, "Acquired leadership");
        metrics::record_leader_elected(&config.identity);

        let work_token = shutdown.child_token();
        let outcome = tokio::select! {
            result = work(work_token.clone()) => result,
            () = wait_for_loss(&mut leader) => {
                warn!(identity = %config.identity, "Lost leadership");
                work_token.cancel();
                Err(anyhow::anyhow!("Leadership lost"))
            }
        };
        metrics::record_leader_lost(&config.identity);
        outcome
    } else {
        Ok(())
    };

    drop(leader);
    match lease_task.await {
        Ok(Ok(_)) => info!(lease = %config.lease_name, "Released lease"),
        Ok(Err(e)) => warn!(lease = %config.lease_name, error = %e, "Failed to release lease"),
        Err(e) => warn!(lease = %config.lease_name, error = %e, "Lease task panicked"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = LeaderElectionConfig::new("d8-system", "pod-a");
        assert_eq!(config.lease_duration_secs, 15);
        assert_eq!(config.renew_deadline_secs, 10);
        assert_eq!(config.grace_secs(), 5);
        assert_eq!(config.lease_name, "system-registry-manager");
    }

    #[test]
    fn test_grace_is_at_least_one_second() {
        let config = LeaderElectionConfig {
            renew_deadline_secs: 30,
            ..LeaderElectionConfig::new("ns", "id")
        };
        assert_eq!(config.grace_secs(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_leadership_returns_on_acquire() {
        let (tx, mut rx) = watch::channel(false);
        let token = CancellationToken::new();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tx.send(true).unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        });

        assert!(wait_for_leadership(&mut rx, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_leadership_stops_on_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        let token = CancellationToken::new();
        token.cancel();

        assert!(!wait_for_leadership(&mut rx, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_loss() {
        let (tx, mut rx) = watch::channel(true);
        rx.borrow_and_update();
        tokio::spawn(async move {
            tx.send(true).unwrap();
            tx.send(false).unwrap();
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), wait_for_loss(&mut rx))
            .await
            .unwrap();
    }
}
