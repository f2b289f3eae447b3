// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(Box::new(kube::error::ErrorResponse {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
            metadata: None,
            details: None,
        }))
    }

    #[test]
    fn test_no_proxy_message() {
        assert_eq!(
            NodeServicesError::NoProxyWithoutProxy.to_string(),
            "NoProxy should be empty when HTTP and HTTPS are empty"
        );
    }

    #[test]
    fn test_node_services_status_reasons() {
        assert_eq!(
            NodeServicesError::NoProxyWithoutProxy.status_reason(),
            "InvalidProxyEnvs"
        );
        assert_eq!(NodeServicesError::ModeUndefined.status_reason(), "ModeUndefined");
        assert_eq!(NodeServicesError::ModeAmbiguous.status_reason(), "ModeAmbiguous");
    }

    #[test]
    fn test_pki_missing_key_message() {
        let error = PkiError::MissingKey {
            secret: "registry-pki".to_string(),
            key: "registry-ca.crt".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Missing key 'registry-ca.crt' in secret 'registry-pki'"
        );
    }

    #[test]
    fn test_pki_missing_san_message() {
        let error = PkiError::MissingSan {
            what: "auth.crt".to_string(),
            host: "10.0.0.1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Certificate auth.crt is missing required SAN '10.0.0.1'"
        );
    }

    #[test]
    fn test_scan_error_messages() {
        let missing = ScanError::VersionFileMissing {
            file: "version.json".to_string(),
        };
        assert_eq!(missing.to_string(), "version.json not found in release image");

        let invalid = ScanError::VersionInvalid {
            file: "version.json".to_string(),
            reason: "empty version".to_string(),
        };
        assert_eq!(invalid.to_string(), "Invalid version.json: empty version");
    }

    #[test]
    fn test_sender_error_message() {
        let error = SenderError::UnexpectedStatus {
            backend: "docs:8080".to_string(),
            path: "/api/v1/build".to_string(),
            status: 500,
        };
        assert_eq!(
            error.to_string(),
            "Documentation backend docs:8080 returned HTTP 500 for /api/v1/build"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
        assert!(!is_not_found(&api_error(500)));
    }

    #[test]
    fn test_is_conflict() {
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(404)));
    }

    #[test]
    fn test_truncate_label_counts_runes() {
        let long = "é".repeat(100);
        let label = truncate_label(&long, 64);
        assert_eq!(label.chars().count(), 64);

        assert_eq!(truncate_label("short", 64), "short");
    }
}
