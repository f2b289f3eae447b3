// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Registry modules watcher.
//!
//! Scans module registries on an interval and publishes documentation of
//! every release channel to the documentation backends.

use anyhow::{bail, Context as _, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysreg::cli::ServerArgs;
use sysreg::constants::{DEFAULT_SCAN_INTERVAL, SHUTDOWN_GRACE_SECS};
use sysreg::server::{metrics_router, serve};
use sysreg::telemetry::init_logging;
use sysreg::watcher::cache::Cache;
use sysreg::watcher::client::RegistryClient;
use sysreg::watcher::docker_config::DockerConfig;
use sysreg::watcher::oci::{build_http_client, OciClientOptions, OciRegistryClient};
use sysreg::watcher::scanner::Scanner;
use sysreg::watcher::sender::DocsSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Registry modules watcher.
#[derive(Parser, Debug)]
#[command(name = "sysreg-modules-watcher", version, about)]
struct Cli {
    /// Time between scans
    #[arg(long = "interval", env = "INTERVAL_UPDATE", default_value = DEFAULT_SCAN_INTERVAL, value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Module repositories to watch, e.g. `registry.example.com/deckhouse/modules`
    #[arg(long = "watch-registries", env = "WATCH_REGISTRIES", value_delimiter = ',', required = true)]
    watch_registries: Vec<String>,

    /// Docker config JSON with registry credentials
    #[arg(long = "registry-auths", env = "REGISTRY_AUTHS")]
    registry_auths: Option<PathBuf>,

    /// Registry scheme
    #[arg(long = "scheme", env = "REGISTRY_SCHEME", default_value = "https", value_parser = ["http", "https"])]
    scheme: String,

    /// Accept any registry TLS certificate
    #[arg(long = "tls-skip-verify", env = "TLS_SKIP_VERIFY", action = ArgAction::SetTrue)]
    tls_skip_verify: bool,

    /// Documentation backends as `host:port`
    #[arg(long = "backends", env = "DOCS_BACKENDS", value_delimiter = ',', required = true)]
    backends: Vec<String>,

    #[command(flatten)]
    server: ServerArgs,
}

impl Cli {
    fn options(&self) -> OciClientOptions {
        OciClientOptions {
            insecure_http: self.scheme == "http",
            tls_skip_verify: self.tls_skip_verify,
        }
    }

    fn docker_config(&self) -> Result<DockerConfig> {
        let Some(path) = &self.registry_auths else {
            return Ok(DockerConfig::default());
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read registry auths {}", path.display()))?;
        DockerConfig::parse(&bytes)
    }

    fn clients(&self) -> Result<Vec<Arc<dyn RegistryClient>>> {
        let options = self.options();
        let http = build_http_client(&options).context("Failed to build registry HTTP client")?;
        let auths = self.docker_config()?;
        Ok(self
            .watch_registries
            .iter()
            .map(|repository| repository.trim())
            .filter(|repository| !repository.is_empty())
            .map(|repository| {
                let credentials = auths.credentials_for(repository).cloned();
                if credentials.is_none() {
                    warn!(registry = %repository, "No credentials found, using anonymous access");
                }
                Arc::new(OciRegistryClient::new(
                    http.clone(),
                    repository,
                    credentials,
                    &options,
                )) as Arc<dyn RegistryClient>
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.server.log_level.as_deref());
    info!(
        registries = ?cli.watch_registries,
        backends = ?cli.backends,
        interval = %humantime::format_duration(cli.interval),
        "Starting modules watcher"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal, stopping");
        signal_token.cancel();
    });
    #[cfg(unix)]
    {
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut terminate) = signal(SignalKind::terminate()) {
                terminate.recv().await;
                info!("Received SIGTERM, stopping");
                signal_token.cancel();
            }
        });
    }

    let fatal = Arc::new(AtomicBool::new(false));
    let on_fatal = {
        let fatal = Arc::clone(&fatal);
        let shutdown = shutdown.clone();
        Arc::new(move |object: &str| {
            error!(object = %object, "CRITICAL: image extraction keeps panicking, stopping");
            fatal.store(true, Ordering::SeqCst);
            shutdown.cancel();
        })
    };

    let scanner = Scanner::new(cli.clients()?, Arc::new(Cache::new()), on_fatal);
    let sender = DocsSender::new().context("Failed to build documentation HTTP client")?;

    let exporter = tokio::spawn(serve(
        cli.server.exporter_address,
        metrics_router(),
        shutdown.clone(),
    ));

    sysreg::watcher::run(&scanner, &sender, &cli.backends, cli.interval, shutdown.clone()).await;
    shutdown.cancel();

    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), exporter)
        .await
        .is_err()
    {
        warn!("Metrics server did not stop within the grace period");
    }

    if fatal.load(Ordering::SeqCst) {
        bail!("Modules watcher stopped after repeated extraction panics");
    }
    Ok(())
}
