// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for `registry/plan.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::{REGISTRY_CA_CN, REGISTRY_PKI_SECRET};
    use crate::pki::generate_node_pki;
    use crate::registry::{
        ca_bundle_to_secret, http_secret_to_secret, node_pki_secret_name, node_pki_to_secret,
    };
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn test_ca_generate_when_nothing_exists() {
        assert_eq!(plan_ca(REGISTRY_PKI_SECRET, None, None), Plan::Generate);
    }

    #[test]
    fn test_ca_adopt_on_startup() {
        let bundle = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let data = ca_bundle_to_secret(&bundle);

        let plan = plan_ca(REGISTRY_PKI_SECRET, Some(&data), None);
        assert_eq!(plan, Plan::Adopt(bundle.clone()));
        assert!(!is_ca_rotation(None, &bundle));
    }

    #[test]
    fn test_ca_keep_when_mirror_matches() {
        let bundle = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let data = ca_bundle_to_secret(&bundle);

        let plan = plan_ca(REGISTRY_PKI_SECRET, Some(&data), Some(&bundle));
        assert_eq!(plan, Plan::Keep(bundle));
        assert!(!plan.writes());
    }

    #[test]
    fn test_ca_external_rotation_is_adopted() {
        let old = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let new = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let data = ca_bundle_to_secret(&new);

        let plan = plan_ca(REGISTRY_PKI_SECRET, Some(&data), Some(&old));
        assert_eq!(plan, Plan::Adopt(new.clone()));
        assert!(is_ca_rotation(Some(&old), &new));
    }

    #[test]
    fn test_ca_restore_when_deleted_or_corrupted() {
        let bundle = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        assert_eq!(
            plan_ca(REGISTRY_PKI_SECRET, None, Some(&bundle)),
            Plan::Restore(bundle.clone())
        );

        let mut corrupted = ca_bundle_to_secret(&bundle);
        corrupted.insert(
            "registry-ca.key".to_string(),
            ByteString(b"garbage".to_vec()),
        );
        assert_eq!(
            plan_ca(REGISTRY_PKI_SECRET, Some(&corrupted), Some(&bundle)),
            Plan::Restore(bundle)
        );
    }

    #[test]
    fn test_ca_corrupted_without_mirror_regenerates() {
        let data = BTreeMap::from([(
            "registry-ca.crt".to_string(),
            ByteString(b"garbage".to_vec()),
        )]);
        assert_eq!(plan_ca(REGISTRY_PKI_SECRET, Some(&data), None), Plan::Generate);
    }

    #[test]
    fn test_user_generate_and_restore() {
        assert_eq!(plan_user("registry-user-ro", None, None), Plan::Generate);

        let user = RegistryUser::generate("ro").unwrap();
        assert_eq!(
            plan_user("registry-user-ro", None, Some(&user)),
            Plan::Restore(user)
        );
    }

    #[test]
    fn test_user_keep_and_adopt() {
        let user = RegistryUser::generate("ro").unwrap();
        let data = user.to_secret_data();
        assert_eq!(
            plan_user("registry-user-ro", Some(&data), Some(&user)),
            Plan::Keep(user.clone())
        );

        let edited = RegistryUser::generate("ro").unwrap();
        assert_eq!(
            plan_user("registry-user-ro", Some(&edited.to_secret_data()), Some(&user)),
            Plan::Adopt(edited)
        );
    }

    #[test]
    fn test_user_stale_hash_is_repaired_not_regenerated() {
        let mut user = RegistryUser::generate("rw").unwrap();
        user.password = "edited-by-admin".to_string();
        let data = user.to_secret_data();

        let plan = plan_user("registry-user-rw", Some(&data), None);
        assert_eq!(plan, Plan::Repair(user));
    }

    #[test]
    fn test_user_incomplete_secret_restores_mirror() {
        let user = RegistryUser::generate("rw").unwrap();
        let mut data = user.to_secret_data();
        data.remove("password");

        assert_eq!(
            plan_user("registry-user-rw", Some(&data), Some(&user)),
            Plan::Restore(user)
        );
    }

    #[test]
    fn test_node_pki_generate_keep_and_reissue() {
        let bundle = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let secret = node_pki_secret_name("master-1");
        assert_eq!(
            plan_node_pki(&secret, None, None, &bundle.ca, "10.0.0.1"),
            Plan::Generate
        );

        let pki = generate_node_pki(&bundle.ca, "10.0.0.1").unwrap();
        let data = node_pki_to_secret(&pki);
        assert_eq!(
            plan_node_pki(&secret, Some(&data), Some(&pki), &bundle.ca, "10.0.0.1"),
            Plan::Keep(pki.clone())
        );

        // node IP changed: SANs no longer match
        assert_eq!(
            plan_node_pki(&secret, Some(&data), Some(&pki), &bundle.ca, "10.0.0.2"),
            Plan::Generate
        );
    }

    #[test]
    fn test_node_pki_signed_by_old_ca_is_reissued() {
        let old = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let new = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let pki = generate_node_pki(&old.ca, "10.0.0.1").unwrap();
        let data = node_pki_to_secret(&pki);

        assert_eq!(
            plan_node_pki("registry-node-m-pki", Some(&data), Some(&pki), &new.ca, "10.0.0.1"),
            Plan::Generate
        );
    }

    #[test]
    fn test_node_pki_restored_from_mirror() {
        let bundle = CaBundle::generate(REGISTRY_CA_CN).unwrap();
        let pki = generate_node_pki(&bundle.ca, "10.0.0.1").unwrap();

        assert_eq!(
            plan_node_pki("registry-node-m-pki", None, Some(&pki), &bundle.ca, "10.0.0.1"),
            Plan::Restore(pki)
        );
    }

    #[test]
    fn test_http_secret_plans() {
        assert_eq!(plan_http_secret(None, None), Plan::Generate);
        assert_eq!(
            plan_http_secret(None, Some("s3cr3t")),
            Plan::Restore("s3cr3t".to_string())
        );

        let data = http_secret_to_secret("s3cr3t");
        assert_eq!(
            plan_http_secret(Some(&data), Some("s3cr3t")),
            Plan::Keep("s3cr3t".to_string())
        );
        assert_eq!(
            plan_http_secret(Some(&data), Some("other")),
            Plan::Adopt("s3cr3t".to_string())
        );

        let empty = http_secret_to_secret("");
        assert_eq!(plan_http_secret(Some(&empty), None), Plan::Generate);
    }

    #[test]
    fn test_plan_writes() {
        assert!(Plan::<()>::Generate.writes());
        assert!(Plan::Restore(()).writes());
        assert!(Plan::Repair(()).writes());
        assert!(!Plan::Adopt(()).writes());
        assert!(!Plan::Keep(()).writes());
    }
}
