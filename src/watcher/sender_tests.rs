// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use super::super::*;
    use wiremock::matchers::{body_bytes, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_backoff() -> BackoffFactory {
        Arc::new(|| {
            ExponentialBackoff::new(
                Duration::from_millis(1),
                Duration::from_millis(5),
                Some(Duration::from_millis(200)),
                2.0,
                0.0,
            )
        })
    }

    fn sender() -> DocsSender {
        DocsSender::new().unwrap().with_backoff(fast_backoff())
    }

    fn task(kind: TaskKind, channels: &[&str]) -> DocumentationTask {
        DocumentationTask {
            registry: "TestReg".to_string(),
            module: "TestModule".to_string(),
            version: "1.0.0".to_string(),
            release_channels: channels.iter().map(|c| (*c).to_string()).collect(),
            tar_file: if kind == TaskKind::Create {
                b"test".to_vec()
            } else {
                Vec::new()
            },
            kind,
        }
    }

    fn backend(server: &MockServer) -> Vec<String> {
        vec![server.address().to_string()]
    }

    #[test]
    fn test_backend_url() {
        assert_eq!(backend_url("docs-builder:8081"), "http://docs-builder:8081");
        assert_eq!(backend_url("https://docs.example.com/"), "https://docs.example.com");
    }

    #[test]
    fn test_task_paths() {
        assert_eq!(
            task_path(&task(TaskKind::Create, &["alpha", "beta"])),
            "/api/v1/doc/TestModule/1.0.0?channels=alpha,beta"
        );
        assert_eq!(
            task_path(&task(TaskKind::Delete, &["stable"])),
            "/api/v1/doc/TestModule?channels=stable"
        );
    }

    #[tokio::test]
    async fn test_create_uploads_bundle_and_builds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/doc/TestModule/1.0.0"))
            .and(query_param("channels", "alpha,beta"))
            .and(body_bytes(b"test".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/build"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        sender()
            .send(
                &backend(&server),
                &[task(TaskKind::Create, &["alpha", "beta"])],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_task() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/doc/TestModule"))
            .and(query_param("channels", "alpha"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/build"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        sender()
            .send(
                &backend(&server),
                &[task(TaskKind::Delete, &["alpha"])],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/doc/TestModule/1.0.0"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/doc/TestModule/1.0.0"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/build"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        sender()
            .send(
                &backend(&server),
                &[task(TaskKind::Create, &["alpha"])],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_client_errors_fail_immediately_and_skip_build() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/build"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = sender()
            .send(
                &backend(&server),
                &[task(TaskKind::Delete, &["alpha"])],
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SenderError::UnexpectedStatus { status: 404, .. }
        ));
    }

    #[tokio::test]
    async fn test_persistent_failure_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = sender()
            .send(
                &backend(&server),
                &[task(TaskKind::Create, &["alpha"])],
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            SenderError::RetriesExhausted { attempts, path, .. } => {
                assert!(attempts > 1);
                assert!(path.starts_with("/api/v1/doc/TestModule/1.0.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_block_others() {
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&healthy)
            .await;
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&broken)
            .await;

        let backends = vec![broken.address().to_string(), healthy.address().to_string()];
        let result = sender()
            .send(&backends, &[task(TaskKind::Create, &["alpha"])], &CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let slow = DocsSender::new().unwrap().with_backoff(Arc::new(|| {
            ExponentialBackoff::new(
                Duration::from_secs(30),
                Duration::from_secs(60),
                Some(Duration::from_secs(300)),
                2.0,
                0.0,
            )
        }));
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            slow.send(&backend(&server), &[task(TaskKind::Create, &["alpha"])], &shutdown),
        )
        .await
        .expect("send must return promptly after shutdown")
        .unwrap_err();
        assert!(matches!(err, SenderError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_send_skips_build() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = sender()
            .send(&backend(&server), &[task(TaskKind::Create, &["alpha"])], &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_no_tasks_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        sender()
            .send(&backend(&server), &[], &CancellationToken::new())
            .await
            .unwrap();
    }
}
