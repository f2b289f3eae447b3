// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Documentation sender.
//!
//! Delivers documentation tasks to every backend in task order, then asks
//! each backend that accepted at least one task to rebuild the site.
//!
//! - create: `POST /api/v1/doc/{module}/{version}?channels=a,b` with the tar bundle
//! - delete: `DELETE /api/v1/doc/{module}?channels=a,b`
//! - build: `POST /api/v1/build`

use super::{DocumentationTask, TaskKind};
use crate::constants::{DOCS_API_BUILD_PATH, DOCS_API_DOC_PATH, HTTP_REQUEST_TIMEOUT_SECS};
use crate::errors::SenderError;
use crate::metrics::record_sender_request;
use crate::reconcilers::retry::{http_backoff, is_retryable_http_status, ExponentialBackoff};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, Method};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Produces a fresh backoff for every request.
pub type BackoffFactory = Arc<dyn Fn() -> ExponentialBackoff + Send + Sync>;

/// Base URL of a backend given as `host:port` or a full URL.
#[must_use]
pub fn backend_url(backend: &str) -> String {
    let backend = backend.trim_end_matches('/');
    if backend.starts_with("http://") || backend.starts_with("https://") {
        backend.to_string()
    } else {
        format!("http://{backend}")
    }
}

/// Request path of a task, including the channel query.
#[must_use]
pub fn task_path(task: &DocumentationTask) -> String {
    let channels = task.release_channels.join(",");
    match task.kind {
        TaskKind::Create => format!(
            "{DOCS_API_DOC_PATH}/{}/{}?channels={channels}",
            task.module, task.version
        ),
        TaskKind::Delete => format!("{DOCS_API_DOC_PATH}/{}?channels={channels}", task.module),
    }
}

pub struct DocsSender {
    http: HttpClient,
    backoff: BackoffFactory,
}

impl DocsSender {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            backoff: Arc::new(http_backoff),
        })
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffFactory) -> Self {
        self.backoff = backoff;
        self
    }

    /// Deliver `tasks` to every backend.
    ///
    /// A failing task does not stop the remaining tasks or backends.
    /// Cancelling `shutdown` abandons the remaining deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::Cancelled`] on shutdown, otherwise the last
    /// delivery error after all backends were processed.
    pub async fn send(
        &self,
        backends: &[String],
        tasks: &[DocumentationTask],
        shutdown: &CancellationToken,
    ) -> Result<(), SenderError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let mut last_error = None;
        for backend in backends {
            let base = backend_url(backend);
            let mut delivered = 0usize;

            for task in tasks {
                let (method, operation) = match task.kind {
                    TaskKind::Create => (Method::POST, "upload"),
                    TaskKind::Delete => (Method::DELETE, "delete"),
                };
                let body = (task.kind == TaskKind::Create).then(|| task.tar_file.clone());
                match self
                    .request(backend, &base, method, &task_path(task), body, shutdown)
                    .await
                {
                    Ok(()) => {
                        record_sender_request(backend, operation, true);
                        delivered += 1;
                    }
                    Err(e @ SenderError::Cancelled { .. }) => {
                        warn!(backend = %backend, "Documentation delivery cancelled");
                        return Err(e);
                    }
                    Err(e) => {
                        record_sender_request(backend, operation, false);
                        error!(
                            backend = %backend,
                            module = %task.module,
                            version = %task.version,
                            kind = %task.kind,
                            error = %e,
                            "Failed to deliver documentation task"
                        );
                        last_error = Some(e);
                    }
                }
            }

            if delivered == 0 {
                continue;
            }
            match self
                .request(backend, &base, Method::POST, DOCS_API_BUILD_PATH, None, shutdown)
                .await
            {
                Ok(()) => {
                    record_sender_request(backend, "build", true);
                    info!(backend = %backend, tasks = delivered, "Documentation build requested");
                }
                Err(e @ SenderError::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    record_sender_request(backend, "build", false);
                    error!(backend = %backend, error = %e, "Failed to request documentation build");
                    last_error = Some(e);
                }
            }
        }

        last_error.map_or(Ok(()), Err)
    }

    /// One request with retries on 429, 5xx and transport errors.
    async fn request(
        &self,
        backend: &str,
        base: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        shutdown: &CancellationToken,
    ) -> Result<(), SenderError> {
        let url = format!("{base}{path}");
        let cancelled = || SenderError::Cancelled {
            backend: backend.to_string(),
            path: path.to_string(),
        };
        let mut backoff = (self.backoff)();
        let start_time = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/x-tar")
                    .body(body.clone());
            }

            let response = tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(cancelled()),
                response = request.send() => response,
            };
            let error = match response {
                Ok(response) if response.status().is_success() => {
                    if attempt > 1 {
                        debug!(
                            method = %method,
                            url = %url,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            "Documentation request succeeded after retries"
                        );
                    }
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    let error = SenderError::UnexpectedStatus {
                        backend: backend.to_string(),
                        path: path.to_string(),
                        status: status.as_u16(),
                    };
                    if !is_retryable_http_status(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => SenderError::Transport {
                    backend: backend.to_string(),
                    reason: e.to_string(),
                },
            };

            if let Some(duration) = backoff.next_backoff() {
                warn!(
                    method = %method,
                    url = %url,
                    attempt = attempt,
                    retry_after = ?duration,
                    error = %error,
                    "Retryable documentation request error, will retry"
                );
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return Err(cancelled()),
                    () = tokio::time::sleep(duration) => {}
                }
            } else {
                return Err(SenderError::RetriesExhausted {
                    backend: backend.to_string(),
                    path: path.to_string(),
                    attempts: attempt,
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "sender_tests.rs"]
mod sender_tests;
