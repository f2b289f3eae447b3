// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for `node_services/desired.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::REGISTRY_CA_CN;
    use crate::crd::RegistryMode;
    use crate::pki::{generate_node_pki, CaBundle};
    use crate::registry::MasterNode;
    use k8s_openapi::ByteString;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn bytes(value: &str) -> ByteString {
        ByteString(value.as_bytes().to_vec())
    }

    fn config_secret() -> SecretData {
        BTreeMap::from([
            ("etcd.yaml.tpl".to_string(), bytes("etcd: {}\n")),
            (
                "kube-apiserver.yaml.tpl".to_string(),
                bytes("- --audit-policy-file=/etc/kubernetes/deckhouse/extra-files/audit.yaml\n"),
            ),
            ("kube-controller-manager.yaml.tpl".to_string(), bytes("kcm: {}\n")),
            ("kube-scheduler.yaml.tpl".to_string(), bytes("sched: {}\n")),
            ("extra-file-audit.yaml".to_string(), bytes("rules: []\n")),
        ])
    }

    fn pki_secret() -> SecretData {
        BTreeMap::from([
            ("ca.crt".to_string(), bytes("cluster-ca")),
            ("ca.key".to_string(), bytes("cluster-ca-key")),
        ])
    }

    fn mirror(node: &str, ip: &str) -> EmbeddedRegistry {
        let bundle = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let pki = generate_node_pki(&bundle.ca, ip).unwrap();
        let mut registry = EmbeddedRegistry {
            ca: Some(bundle),
            http_secret: Some("http-secret".to_string()),
            ..EmbeddedRegistry::default()
        };
        for role in UserRole::ALL {
            registry
                .users
                .insert(role, RegistryUser::generate(role.as_str()).unwrap());
        }
        registry.nodes.insert(
            node.to_string(),
            MasterNode {
                name: node.to_string(),
                internal_ip: ip.to_string(),
                pki,
            },
        );
        registry
    }

    fn settings(value: serde_json::Value) -> RegistrySettings {
        RegistrySettings::from_value(Some(&value)).unwrap()
    }

    fn images() -> Images {
        Images {
            distribution: "registry.local/distribution@sha256:1".to_string(),
            auth: "registry.local/auth@sha256:2".to_string(),
            mirrorer: "registry.local/mirrorer@sha256:3".to_string(),
        }
    }

    #[test]
    fn test_control_plane_only_spec() {
        let config = config_secret();
        let pki = pki_secret();
        let inputs = ControlPlaneInputs {
            config: &config,
            config_resource_version: "1001",
            pki: &pki,
            pki_resource_version: "2002",
        };

        let desired = build_desired("master-1", "10.0.0.1", &inputs, None).unwrap();
        assert_eq!(desired.spec.config_version, "1001.2002");
        assert_eq!(desired.spec.pki_checksum.len(), 64);
        assert!(desired.spec.node_services.is_none());
        assert!(desired.node_services.is_none());
        for component in CONTROL_PLANE_COMPONENTS {
            assert_eq!(desired.spec.components.get(component).unwrap().len(), 64);
        }
    }

    #[test]
    fn test_missing_manifest_is_invalid_configuration() {
        let mut config = config_secret();
        config.remove("etcd.yaml.tpl");
        let pki = pki_secret();
        let inputs = ControlPlaneInputs {
            config: &config,
            config_resource_version: "1",
            pki: &pki,
            pki_resource_version: "2",
        };

        let err = build_desired("master-1", "10.0.0.1", &inputs, None).unwrap_err();
        assert_eq!(err.status_reason(), "InvalidConfiguration");
    }

    #[test]
    fn test_build_is_deterministic() {
        let config = config_secret();
        let pki = pki_secret();
        let registry = mirror("master-1", "10.0.0.1");
        let settings = settings(json!({"localMode": {"upstreamMirrors": ["m.example.com"]}}));
        let images = images();
        let cp = ControlPlaneInputs {
            config: &config,
            config_resource_version: "1",
            pki: &pki,
            pki_resource_version: "2",
        };
        let reg = RegistryInputs {
            settings: &settings,
            registry: &registry,
            images: &images,
        };

        let first = build_desired("master-1", "10.0.0.1", &cp, Some(&reg)).unwrap();
        let second = build_desired("master-1", "10.0.0.1", &cp, Some(&reg)).unwrap();
        assert_eq!(first, second);

        let reference = first.spec.node_services.unwrap();
        assert_eq!(reference.mode, RegistryMode::Local);
        assert_eq!(reference.secret_name, "registry-node-master-1-services");
        assert_eq!(
            reference.version,
            first.node_services.unwrap().version().unwrap()
        );
    }

    #[test]
    fn test_local_mode_payload() {
        let registry = mirror("master-1", "10.0.0.1");
        let settings = settings(json!({
            "localMode": {"upstreamMirrors": ["m.example.com"], "ingressClientCA": "ingress-ca"}
        }));
        let images = images();
        let inputs = RegistryInputs {
            settings: &settings,
            registry: &registry,
            images: &images,
        };

        let config = build_node_services("master-1", "10.0.0.1", &inputs).unwrap();
        let ModeConfig::Local(local) = &config.mode else {
            panic!("expected local mode");
        };
        assert_eq!(local.upstream_mirrors, vec!["m.example.com".to_string()]);
        assert_eq!(local.user_rw.name, "rw");
        assert_eq!(config.user_ro.name, "ro");
        assert_eq!(config.node_ip, "10.0.0.1");
    }

    #[test]
    fn test_proxy_mode_payload() {
        let registry = mirror("master-1", "10.0.0.1");
        let settings = settings(json!({
            "proxyMode": {
                "upstream": {"host": "registry.example.com", "path": "/deckhouse/ee", "user": "u", "password": "p", "ttl": "72h"},
                "upstreamCA": "upstream-ca"
            },
            "proxyEnvs": {"https": "http://proxy:3128", "noProxy": "10.0.0.0/8"}
        }));
        let images = images();
        let inputs = RegistryInputs {
            settings: &settings,
            registry: &registry,
            images: &images,
        };

        let config = build_node_services("master-1", "10.0.0.1", &inputs).unwrap();
        assert_eq!(config.registry_mode(), RegistryMode::Proxy);
        let ModeConfig::Proxy(proxy) = &config.mode else {
            panic!("expected proxy mode");
        };
        assert_eq!(proxy.upstream.remote_url(), "https://registry.example.com");
        assert_eq!(proxy.proxy_envs.https, "http://proxy:3128");
        assert_eq!(proxy.upstream_ca.as_deref(), Some("upstream-ca"));
    }

    #[test]
    fn test_no_proxy_without_proxy_rejected() {
        let registry = mirror("master-1", "10.0.0.1");
        let settings = settings(json!({
            "localMode": {"upstreamMirrors": ["m"]},
            "proxyEnvs": {"http": "", "https": "", "noProxy": "localhost"}
        }));
        let images = images();
        let inputs = RegistryInputs {
            settings: &settings,
            registry: &registry,
            images: &images,
        };

        let err = build_node_services("master-1", "10.0.0.1", &inputs).unwrap_err();
        assert_eq!(
            err.to_string(),
            "NoProxy should be empty when HTTP and HTTPS are empty"
        );
    }

    #[test]
    fn test_mode_must_be_exactly_one() {
        let registry = mirror("master-1", "10.0.0.1");
        let images = images();

        let neither = settings(json!({"mode": "Local"}));
        let inputs = RegistryInputs {
            settings: &neither,
            registry: &registry,
            images: &images,
        };
        assert_eq!(
            build_node_services("master-1", "10.0.0.1", &inputs),
            Err(NodeServicesError::ModeUndefined)
        );

        let both = settings(json!({
            "localMode": {"upstreamMirrors": ["m"]},
            "proxyMode": {"upstream": {"host": "r.example.com"}}
        }));
        let inputs = RegistryInputs {
            settings: &both,
            registry: &registry,
            images: &images,
        };
        assert_eq!(
            build_node_services("master-1", "10.0.0.1", &inputs),
            Err(NodeServicesError::ModeAmbiguous)
        );
    }

    #[test]
    fn test_unknown_node_is_missing_input() {
        let registry = mirror("master-1", "10.0.0.1");
        let settings = settings(json!({"localMode": {"upstreamMirrors": ["m"]}}));
        let images = images();
        let inputs = RegistryInputs {
            settings: &settings,
            registry: &registry,
            images: &images,
        };

        let err = build_node_services("master-2", "10.0.0.2", &inputs).unwrap_err();
        assert_eq!(
            err,
            NodeServicesError::MissingInput {
                node: "master-2".to_string(),
                input: "node PKI".to_string(),
            }
        );
    }

    #[test]
    fn test_mode_switch_changes_version() {
        let registry = mirror("master-1", "10.0.0.1");
        let images = images();
        let local = settings(json!({"localMode": {"upstreamMirrors": ["m"]}}));
        let proxy = settings(json!({"proxyMode": {"upstream": {"host": "r.example.com"}}}));

        let build = |s: &RegistrySettings| {
            let inputs = RegistryInputs {
                settings: s,
                registry: &registry,
                images: &images,
            };
            build_node_services("master-1", "10.0.0.1", &inputs)
                .unwrap()
                .version()
                .unwrap()
        };
        assert_ne!(build(&local), build(&proxy));
    }
}
