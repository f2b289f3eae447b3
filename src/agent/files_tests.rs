// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for `agent/files.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::node_services::{Images, LocalModeConfig, ModeConfig};
    use crate::pki::CertKey;
    use crate::users::RegistryUser;
    use k8s_openapi::ByteString;
    use tempfile::TempDir;

    fn pair(tag: &str) -> CertKey {
        CertKey {
            cert_pem: format!("{tag}-cert"),
            key_pem: format!("{tag}-key"),
        }
    }

    fn user(name: &str) -> RegistryUser {
        RegistryUser {
            name: name.to_string(),
            password: format!("{name}-password"),
            password_hash: format!("{name}-hash"),
        }
    }

    fn local_config(ingress_ca: Option<&str>) -> NodeServicesConfig {
        NodeServicesConfig {
            node_name: "master-1".to_string(),
            node_ip: "10.0.0.1".to_string(),
            images: Images::default(),
            ca: "ca-cert".to_string(),
            auth: pair("auth"),
            distribution: pair("distribution"),
            token: pair("token"),
            http_secret: "secret".to_string(),
            user_ro: user("ro"),
            mode: ModeConfig::Local(LocalModeConfig {
                ingress_client_ca: ingress_ca.map(str::to_string),
                user_rw: user("rw"),
                user_puller: user("puller"),
                user_pusher: user("pusher"),
                upstream_mirrors: Vec::new(),
            }),
        }
    }

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(name, contents)| ((*name).to_string(), contents.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_write_atomic_skips_identical_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.crt");

        assert!(write_atomic(&path, b"one", 0o600).unwrap());
        assert!(!write_atomic(&path, b"one", 0o600).unwrap());
        assert!(write_atomic(&path, b"two", 0o600).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"two");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.key");
        write_atomic(&path, b"key", 0o644).unwrap();

        // Same content, different mode is still a change.
        assert!(write_atomic(&path, b"key", 0o600).unwrap());
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_sync_dir_removes_stale_files() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pki");

        sync_dir(&target, &files(&[("a", "1"), ("b", "2")]), 0o600, 0o700).unwrap();
        let changes = sync_dir(&target, &files(&[("a", "1")]), 0o600, 0o700).unwrap();

        assert!(changes.written.is_empty());
        assert_eq!(changes.removed, vec![target.join("b")]);
        assert!(target.join("a").exists());
        assert!(!target.join("b").exists());
    }

    #[test]
    fn test_sync_dir_leaves_missing_dir_alone() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("absent");

        let changes = sync_dir(&target, &BTreeMap::new(), 0o600, 0o700).unwrap();
        assert!(changes.is_empty());
        assert!(!target.exists());
    }

    #[test]
    fn test_host_paths_are_absolute() {
        let paths = NodePaths::new("/host");
        let host = paths.host_paths();

        assert_eq!(host.pki_dir, "/etc/kubernetes/system-registry/pki");
        assert_eq!(host.config_dir, "/etc/kubernetes/system-registry/config");
        assert_eq!(
            paths.local_manifest_path(),
            PathBuf::from("/host/etc/kubernetes/manifests/system-registry.yaml")
        );
    }

    #[test]
    fn test_apply_node_services_writes_pki_and_manifest() {
        let dir = TempDir::new().unwrap();
        let paths = NodePaths::new(dir.path());

        let changes =
            apply_node_services(&paths, &local_config(Some("ingress-ca")), "v1").unwrap();
        assert!(!changes.is_empty());

        let pki = paths.local_pki_dir();
        assert_eq!(fs::read_to_string(pki.join("ca.crt")).unwrap(), "ca-cert");
        assert_eq!(
            fs::read_to_string(pki.join("ingress-client-ca.crt")).unwrap(),
            "ingress-ca"
        );
        assert!(paths.local_manifest_path().exists());
        assert!(paths
            .local_services_config_dir()
            .join("distribution.yaml")
            .exists());

        // Re-applying the same payload touches nothing.
        let again = apply_node_services(&paths, &local_config(Some("ingress-ca")), "v1").unwrap();
        assert!(again.is_empty());

        // Dropping the ingress CA removes its file.
        let dropped = apply_node_services(&paths, &local_config(None), "v2").unwrap();
        assert!(dropped.removed.contains(&pki.join("ingress-client-ca.crt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_pki_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let paths = NodePaths::new(dir.path());
        apply_node_services(&paths, &local_config(None), "v1").unwrap();

        let pki = paths.local_pki_dir();
        let dir_mode = fs::metadata(&pki).unwrap().permissions().mode() & 0o777;
        let key_mode = fs::metadata(pki.join("auth.key"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(key_mode, 0o600);
    }

    #[test]
    fn test_remove_node_services() {
        let dir = TempDir::new().unwrap();
        let paths = NodePaths::new(dir.path());
        apply_node_services(&paths, &local_config(None), "v1").unwrap();

        let changes = remove_node_services(&paths).unwrap();
        assert!(changes.removed.contains(&paths.local_manifest_path()));
        assert!(!paths.local_manifest_path().exists());
        assert!(!paths.local_pki_dir().join("ca.crt").exists());

        assert!(remove_node_services(&paths).unwrap().is_empty());
    }

    #[test]
    fn test_control_plane_files_layout() {
        let data: SecretData = [
            ("kubeadm-config.yaml", "kind: ClusterConfiguration"),
            ("kube-apiserver.yaml.tpl", "apiVersion: v1"),
            ("extra-file-audit-policy.yaml", "rules: []"),
            ("extra-file-../escape", "nope"),
            ("unrelated", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
        .collect();

        let layout = control_plane_files(&data);
        assert_eq!(
            layout["kubeadm"].keys().collect::<Vec<_>>(),
            vec!["config.yaml"]
        );
        assert_eq!(
            layout["patches"].keys().collect::<Vec<_>>(),
            vec!["kube-apiserver.yaml.tpl"]
        );
        assert_eq!(
            layout["extra-files"].keys().collect::<Vec<_>>(),
            vec!["audit-policy.yaml"]
        );
    }

    #[test]
    fn test_sync_control_plane_config_removes_stale_patch() {
        let dir = TempDir::new().unwrap();
        let paths = NodePaths::new(dir.path());
        let mut data: SecretData = BTreeMap::new();
        data.insert(
            "etcd.yaml.tpl".to_string(),
            ByteString(b"apiVersion: v1".to_vec()),
        );
        data.insert(
            "kube-scheduler.yaml.tpl".to_string(),
            ByteString(b"apiVersion: v1".to_vec()),
        );
        sync_control_plane_config(&paths, &data).unwrap();

        data.remove("etcd.yaml.tpl");
        let changes = sync_control_plane_config(&paths, &data).unwrap();

        let patches = paths.local_deckhouse_dir().join("patches");
        assert_eq!(changes.removed, vec![patches.join("etcd.yaml.tpl")]);
        assert!(patches.join("kube-scheduler.yaml.tpl").exists());
    }
}
