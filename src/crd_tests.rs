// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for custom resource types.

#[cfg(test)]
mod tests {
    use crate::constants::{API_GROUP, API_VERSION};
    use crate::crd::*;
    use kube::CustomResourceExt;

    fn spec(config_version: &str, services_version: Option<&str>) -> ControlPlaneNodeSpec {
        ControlPlaneNodeSpec {
            pki_checksum: "pki".to_string(),
            config_version: config_version.to_string(),
            hot_reload_checksum: "hot".to_string(),
            components: ComponentChecksums::default(),
            node_services: services_version.map(|version| NodeServicesRef {
                mode: RegistryMode::Local,
                version: version.to_string(),
                secret_name: "registry-node-master-1-services".to_string(),
            }),
        }
    }

    fn node(spec: ControlPlaneNodeSpec, status: Option<ControlPlaneNodeStatus>) -> ControlPlaneNode {
        let mut cpn = ControlPlaneNode::new("master-1", spec);
        cpn.status = status;
        cpn
    }

    fn applied(config_version: &str, services_version: Option<&str>) -> ControlPlaneNodeStatus {
        ControlPlaneNodeStatus {
            ready: Some(true),
            observed_config_version: Some(config_version.to_string()),
            observed_node_services_version: services_version.map(str::to_string),
            conditions: Vec::new(),
        }
    }

    #[test]
    fn test_component_checksums_by_manifest_name() {
        let mut components = ComponentChecksums::default();
        assert!(components.set("kube-apiserver", "aa".to_string()));
        assert!(components.set("etcd", "bb".to_string()));
        assert!(!components.set("kube-proxy", "cc".to_string()));

        assert_eq!(components.get("kube-apiserver"), Some("aa"));
        assert_eq!(components.kube_api_server.checksum, "aa");
        assert_eq!(components.get("etcd"), Some("bb"));
        assert_eq!(components.get("kube-scheduler"), Some(""));
        assert_eq!(components.get("kube-proxy"), None);
    }

    #[test]
    fn test_is_ready_requires_status() {
        assert!(!node(spec("1.1", None), None).is_ready());
    }

    #[test]
    fn test_is_ready_when_current_spec_applied() {
        let cpn = node(spec("1.1", Some("v1")), Some(applied("1.1", Some("v1"))));
        assert!(cpn.is_ready());
    }

    #[test]
    fn test_is_ready_false_for_stale_config_version() {
        let cpn = node(spec("1.2", Some("v1")), Some(applied("1.1", Some("v1"))));
        assert!(!cpn.is_ready());
    }

    #[test]
    fn test_is_ready_false_for_stale_services_version() {
        let cpn = node(spec("1.1", Some("v2")), Some(applied("1.1", Some("v1"))));
        assert!(!cpn.is_ready());
    }

    #[test]
    fn test_is_ready_when_registry_disabled() {
        let cpn = node(spec("1.1", None), Some(applied("1.1", None)));
        assert!(cpn.is_ready());

        let leftover = node(spec("1.1", None), Some(applied("1.1", Some("v1"))));
        assert!(!leftover.is_ready());
    }

    #[test]
    fn test_is_ready_false_when_not_ready() {
        let mut status = applied("1.1", None);
        status.ready = Some(false);
        assert!(!node(spec("1.1", None), Some(status)).is_ready());
    }

    #[test]
    fn test_unapplied_spec_needs_a_lagging_status() {
        assert!(!node(spec("1.2", None), None).has_unapplied_spec());
        assert!(node(spec("1.2", None), Some(applied("1.1", None))).has_unapplied_spec());
        assert!(node(spec("1.1", Some("v2")), Some(applied("1.1", Some("v1")))).has_unapplied_spec());

        let mut failing = applied("1.1", None);
        failing.ready = Some(false);
        assert!(!node(spec("1.1", None), Some(failing)).has_unapplied_spec());
    }

    #[test]
    fn test_spec_serializes_camel_case() {
        let value = serde_json::to_value(spec("1001.2002", Some("77ee"))).unwrap();
        assert_eq!(value["configVersion"], "1001.2002");
        assert_eq!(value["hotReloadChecksum"], "hot");
        assert_eq!(value["components"]["kubeApiServer"]["checksum"], "");
        assert_eq!(value["nodeServices"]["mode"], "Local");
        assert_eq!(
            value["nodeServices"]["secretName"],
            "registry-node-master-1-services"
        );
    }

    #[test]
    fn test_spec_omits_absent_node_services() {
        let value = serde_json::to_value(spec("1.1", None)).unwrap();
        assert!(value.get("nodeServices").is_none());
    }

    #[test]
    fn test_status_deserializes_without_conditions() {
        let status: ControlPlaneNodeStatus =
            serde_json::from_str(r#"{"ready":true,"observedConfigVersion":"1.1"}"#).unwrap();
        assert_eq!(status.ready, Some(true));
        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_registry_mode_display() {
        assert_eq!(RegistryMode::Local.to_string(), "Local");
        assert_eq!(RegistryMode::Proxy.to_string(), "Proxy");
    }

    #[test]
    fn test_control_plane_node_crd() {
        let crd = ControlPlaneNode::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.names.kind, "ControlPlaneNode");
        assert_eq!(crd.spec.names.plural, "controlplanenodes");
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.versions[0].name, API_VERSION);
    }

    #[test]
    fn test_module_config_settings_are_opaque() {
        let spec: ModuleConfigSpec = serde_yaml::from_str(
            "enabled: true\nversion: 1\nsettings:\n  mode: Proxy\n  proxy:\n    host: registry.example.com\n",
        )
        .unwrap();
        assert_eq!(spec.enabled, Some(true));
        assert_eq!(spec.version, Some(1));
        let settings = spec.settings.unwrap();
        assert_eq!(settings["mode"], "Proxy");
        assert_eq!(settings["proxy"]["host"], "registry.example.com");
    }
}
