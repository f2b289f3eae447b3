// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Global constants for the sysreg operator, node agent and modules watcher.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group of the `ControlPlaneNode` CRD
pub const API_GROUP: &str = "control-plane.deckhouse.io";

/// API version of the `ControlPlaneNode` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Kind name for `ControlPlaneNode` resource
pub const KIND_CONTROL_PLANE_NODE: &str = "ControlPlaneNode";

/// Kind name for the consumed `ModuleConfig` resource
pub const KIND_MODULE_CONFIG: &str = "ModuleConfig";

/// Name of the `ModuleConfig` that toggles the embedded registry
pub const REGISTRY_MODULE_CONFIG_NAME: &str = "system-registry";

/// Settings key removed from `ModuleConfig` settings before consumption
pub const IMAGES_OVERRIDE_KEY: &str = "imagesOverride";

// ============================================================================
// Namespaces and Secret Names
// ============================================================================

/// Namespace holding registry and control-plane secrets
pub const DEFAULT_REGISTRY_NAMESPACE: &str = "d8-system";

/// Namespace holding the cloud provider cluster configuration
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Secret with the registry CA and auth-token key pairs
pub const REGISTRY_PKI_SECRET: &str = "registry-pki";

/// Secret with shared registry secrets (HTTP secret)
pub const REGISTRY_SECRETS_SECRET: &str = "registry-secrets";

/// Prefix of per-user registry secrets (`registry-user-<role>`)
pub const REGISTRY_USER_SECRET_PREFIX: &str = "registry-user-";

/// Prefix of per-node secrets (`registry-node-<name>-...`)
pub const REGISTRY_NODE_SECRET_PREFIX: &str = "registry-node-";

/// Suffix of per-node PKI secrets (`registry-node-<name>-pki`)
pub const REGISTRY_NODE_PKI_SUFFIX: &str = "-pki";

/// Suffix of per-node services payload secrets (`registry-node-<name>-services`)
pub const REGISTRY_NODE_SERVICES_SUFFIX: &str = "-services";

/// Control-plane manager configuration secret
pub const DEFAULT_CONFIG_SECRET: &str = "control-plane-manager-config";

/// Control-plane PKI secret
pub const DEFAULT_PKI_SECRET: &str = "d8-pki";

/// Key holding the node services payload in its secret
pub const NODE_SERVICES_PAYLOAD_KEY: &str = "config.yaml";

// ============================================================================
// Secret Data Keys
// ============================================================================

/// Registry CA certificate key in `registry-pki`
pub const KEY_REGISTRY_CA_CERT: &str = "registry-ca.crt";

/// Registry CA private key in `registry-pki`
pub const KEY_REGISTRY_CA_KEY: &str = "registry-ca.key";

/// Auth token certificate key in `registry-pki`
pub const KEY_AUTH_TOKEN_CERT: &str = "auth-token.crt";

/// Auth token private key in `registry-pki`
pub const KEY_AUTH_TOKEN_KEY: &str = "auth-token.key";

/// User name key in `registry-user-*`
pub const KEY_USER_NAME: &str = "name";

/// Plaintext password key in `registry-user-*`
pub const KEY_USER_PASSWORD: &str = "password";

/// Bcrypt hash key in `registry-user-*`
pub const KEY_USER_PASSWORD_HASH: &str = "passwordHash";

/// Auth certificate key in per-node PKI secrets
pub const KEY_NODE_AUTH_CERT: &str = "auth.crt";

/// Auth private key in per-node PKI secrets
pub const KEY_NODE_AUTH_KEY: &str = "auth.key";

/// Distribution certificate key in per-node PKI secrets
pub const KEY_NODE_DISTRIBUTION_CERT: &str = "distribution.crt";

/// Distribution private key in per-node PKI secrets
pub const KEY_NODE_DISTRIBUTION_KEY: &str = "distribution.key";

/// HTTP shared secret key in `registry-secrets`
pub const KEY_HTTP_SECRET: &str = "http";

/// Kubeadm input key in the control-plane config secret
pub const KEY_KUBEADM_CONFIG: &str = "kubeadm-config.yaml";

/// Suffix of component manifest templates in the control-plane config secret
pub const MANIFEST_TEMPLATE_SUFFIX: &str = ".yaml.tpl";

/// Prefix of extra files in the control-plane config secret
pub const EXTRA_FILE_PREFIX: &str = "extra-file-";

/// Key of the cloud provider cluster configuration document
pub const KEY_CLUSTER_CONFIGURATION: &str = "cloud-provider-cluster-configuration.yaml";

// ============================================================================
// PKI Constants
// ============================================================================

/// Common name of the registry CA
pub const REGISTRY_CA_CN: &str = "embedded-registry-ca";

/// Common name of the auth token certificate
pub const AUTH_TOKEN_CN: &str = "embedded-registry-auth-token";

/// Common name of per-node auth certificates
pub const NODE_AUTH_CERT_CN: &str = "embedded-registry-auth";

/// Common name of per-node distribution certificates
pub const NODE_DISTRIBUTION_CERT_CN: &str = "embedded-registry-distribution";

/// In-cluster registry service DNS name, always present in node certificate SANs
pub const REGISTRY_SERVICE_DNS: &str = "embedded-registry.d8-system.svc";

/// Validity of generated CA certificates (10 years)
pub const CA_VALIDITY_DAYS: i64 = 3650;

/// Validity of generated leaf certificates (10 years)
pub const LEAF_VALIDITY_DAYS: i64 = 3650;

/// Bcrypt cost for registry user password hashes
pub const BCRYPT_COST: u32 = 10;

/// Length of generated registry user passwords
pub const PASSWORD_LENGTH: usize = 32;

/// Length of the generated HTTP shared secret
pub const HTTP_SECRET_LENGTH: usize = 32;

// ============================================================================
// Control-Plane Components
// ============================================================================

/// Components whose manifests are checksummed, in reporting order
pub const CONTROL_PLANE_COMPONENTS: [&str; 4] = [
    "etcd",
    "kube-apiserver",
    "kube-controller-manager",
    "kube-scheduler",
];

/// Manifest argument prefix marking a referenced file
pub const KUBERNETES_FILE_REFERENCE: &str = "=/etc/kubernetes/";

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue interval when required inputs (secrets) are not available yet (5 minutes)
pub const MISSING_INPUT_REQUEUE_SECS: u64 = 300;

/// Resync interval of a node whose agent reports the current spec as applied (5 minutes)
pub const READY_REQUEUE_SECS: u64 = 300;

/// Requeue interval while a node is still applying its spec (30 seconds)
pub const NOT_READY_REQUEUE_SECS: u64 = 30;

/// Per-item rate limiter base delay (100 milliseconds)
pub const RATE_LIMIT_BASE_DELAY_MILLIS: u64 = 100;

/// Per-item rate limiter maximum delay (3 seconds)
pub const RATE_LIMIT_MAX_DELAY_SECS: u64 = 3;

/// Global token bucket refill rate (requests per second)
pub const RATE_LIMIT_BUCKET_QPS: f64 = 1.0;

/// Global token bucket burst size
pub const RATE_LIMIT_BUCKET_BURST: f64 = 1.0;

/// Attempts made by `retry_on_conflict` before surfacing the conflict
pub const CONFLICT_RETRY_ATTEMPTS: u32 = 5;

/// Debounce window applied to controller triggers (1 second)
pub const CONTROLLER_DEBOUNCE_SECS: u64 = 1;

/// Maximum concurrent reconciles per controller
pub const MAX_CONCURRENT_RECONCILES: u16 = 1;

/// Time allowed for reflector caches to sync before the process gives up (3 minutes)
pub const CACHE_SYNC_TIMEOUT_SECS: u64 = 180;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election renew deadline (10 seconds)
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 10;

/// Default lease name
pub const DEFAULT_LEASE_NAME: &str = "system-registry-manager";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Grace period for HTTP servers on shutdown (10 seconds)
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Field manager used for patches
pub const FIELD_MANAGER: &str = "sysreg";

/// Reporter name on published Kubernetes events
pub const EVENT_REPORTER: &str = "system-registry-manager";

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Default health server address
pub const DEFAULT_HEALTH_ADDRESS: &str = "0.0.0.0:8080";

/// Default metrics server address
pub const DEFAULT_METRICS_ADDRESS: &str = "127.0.0.1:8081";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Liveness endpoint path
pub const HEALTHZ_PATH: &str = "/healthz";

/// Readiness endpoint path
pub const READYZ_PATH: &str = "/readyz";

// ============================================================================
// Node Agent Constants
// ============================================================================

/// Default health server address of the node agent
pub const DEFAULT_AGENT_HEALTH_ADDRESS: &str = "127.0.0.1:8097";

/// Delay before the node agent retries a failed apply
pub const AGENT_RETRY_INTERVAL_SECS: u64 = 10;

/// PKI directory relative to the agent root
pub const DEFAULT_PKI_DIR: &str = "etc/kubernetes/system-registry/pki";

/// Kubelet static pod manifest directory relative to the agent root
pub const DEFAULT_MANIFESTS_DIR: &str = "etc/kubernetes/manifests";

/// Control-plane configuration directory relative to the agent root
pub const DECKHOUSE_CONFIG_DIR: &str = "etc/kubernetes/deckhouse";

/// Static pod manifest file name
pub const STATIC_POD_MANIFEST_FILE: &str = "system-registry.yaml";

/// Mode of written PKI files
pub const PKI_FILE_MODE: u32 = 0o600;

/// Mode of the PKI directory
pub const PKI_DIR_MODE: u32 = 0o700;

/// Mode of written configuration files
pub const CONFIG_FILE_MODE: u32 = 0o644;

/// Distribution (registry) container listen port
pub const DISTRIBUTION_PORT: u16 = 5001;

/// Auth container listen port
pub const AUTH_PORT: u16 = 5051;

/// Registry services configuration directory relative to the agent root
pub const DEFAULT_SERVICES_CONFIG_DIR: &str = "etc/kubernetes/system-registry/config";

/// Host directory backing registry storage
pub const REGISTRY_DATA_HOST_DIR: &str = "/opt/deckhouse/registry";

/// Name of the registry static pod
pub const STATIC_POD_NAME: &str = "system-registry";

/// PKI mount path inside registry containers
pub const PKI_MOUNT_PATH: &str = "/system_registry_pki";

/// Configuration mount path inside registry containers
pub const CONFIG_MOUNT_PATH: &str = "/config";

/// Storage mount path inside the distribution container
pub const DATA_MOUNT_PATH: &str = "/data";

/// Distribution configuration file name
pub const DISTRIBUTION_CONFIG_FILE: &str = "distribution.yaml";

/// Auth configuration file name
pub const AUTH_CONFIG_FILE: &str = "auth.yaml";

/// Mirrorer configuration file name
pub const MIRRORER_CONFIG_FILE: &str = "mirrorer.yaml";

/// Token issuer shared by the auth and distribution containers
pub const TOKEN_ISSUER: &str = "Registry server";

/// Token service name shared by the auth and distribution containers
pub const TOKEN_SERVICE: &str = "Docker registry";

/// Token lifetime in seconds
pub const TOKEN_EXPIRATION_SECS: u64 = 900;

/// Static pod annotation carrying the applied node services version
pub const NODE_SERVICES_VERSION_ANNOTATION: &str = "control-plane.deckhouse.io/node-services-version";

// ============================================================================
// Modules Watcher Constants
// ============================================================================

/// Default scan interval (`INTERVAL_UPDATE`)
pub const DEFAULT_SCAN_INTERVAL: &str = "24h";

/// Release channels recognized by the watcher
pub const RELEASE_CHANNELS: [&str; 5] = ["alpha", "beta", "early-access", "rock-solid", "stable"];

/// Documentation directory prefixes kept from module images
pub const DOCS_DIRECTORIES: [&str; 4] = ["docs/", "openapi/", "openapi/conversions/", "crds/"];

/// Version file inside release images
pub const VERSION_FILE: &str = "version.json";

/// Module definition file inside module images
pub const MODULE_DEFINITION_FILE: &str = "module.yaml";

/// Maximum rune count of error labels on watcher metrics
pub const ERROR_LABEL_MAX_RUNES: usize = 64;

/// Consecutive extraction panics on one object before the fatal callback fires
pub const EXTRACTION_PANIC_THRESHOLD: u32 = 3;

/// Documentation backend create path prefix
pub const DOCS_API_DOC_PATH: &str = "/api/v1/doc";

/// Documentation backend build path
pub const DOCS_API_BUILD_PATH: &str = "/api/v1/build";

/// Timeout for a single registry or backend HTTP request (60 seconds)
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;
