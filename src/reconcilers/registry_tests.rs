// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for `registry.rs`

#[cfg(test)]
mod tests {
    use super::super::{node_pki_secret_names, orphan_node_pki_secrets, NodePkiCleanup};
    use std::collections::BTreeSet;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_node_pki_secret_names_filters_and_sorts() {
        let found = node_pki_secret_names(
            names(&[
                "registry-pki",
                "registry-node-master-2-pki",
                "registry-user-ro",
                "registry-node-master-1-pki",
                "registry-node-master-1-services",
                "registry-node--pki",
            ])
            .into_iter(),
        );

        assert_eq!(
            found,
            names(&["registry-node-master-1-pki", "registry-node-master-2-pki"])
        );
    }

    #[test]
    fn test_orphans_are_secrets_of_non_masters() {
        let secrets = names(&[
            "registry-node-master-1-pki",
            "registry-node-master-2-pki",
            "registry-node-old-master-pki",
        ]);
        let masters: BTreeSet<String> = ["master-1", "master-2"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        assert_eq!(
            orphan_node_pki_secrets(&secrets, &masters),
            names(&["registry-node-old-master-pki"])
        );
    }

    #[test]
    fn test_no_orphans_when_every_node_is_master() {
        let secrets = names(&["registry-node-master-1-pki"]);
        let masters: BTreeSet<String> = BTreeSet::from(["master-1".to_string()]);

        assert!(orphan_node_pki_secrets(&secrets, &masters).is_empty());
    }

    #[test]
    fn test_every_secret_is_orphan_without_masters() {
        let secrets = names(&["registry-node-a-pki", "registry-node-b-pki"]);

        assert_eq!(orphan_node_pki_secrets(&secrets, &BTreeSet::new()), secrets);
    }

    fn listed_node_pki() -> Vec<String> {
        node_pki_secret_names(
            names(&[
                "registry-pki",
                "registry-node-master-1-pki",
                "registry-node-master-2-pki",
                "registry-node-old-master-pki",
                "registry-node-master-1-services",
                "registry-user-rw",
            ])
            .into_iter(),
        )
    }

    #[test]
    fn test_ca_rotation_deletes_every_node_certificate() {
        let secrets = listed_node_pki();

        assert_eq!(
            NodePkiCleanup::CaRotated.select(&secrets),
            names(&[
                "registry-node-master-1-pki",
                "registry-node-master-2-pki",
                "registry-node-old-master-pki",
            ])
        );
    }

    #[test]
    fn test_former_master_cleanup_keeps_current_masters() {
        let secrets = listed_node_pki();
        let masters = BTreeSet::from(["master-1".to_string(), "master-2".to_string()]);

        assert_eq!(
            NodePkiCleanup::FormerMasters(&masters).select(&secrets),
            names(&["registry-node-old-master-pki"])
        );
    }

    #[test]
    fn test_cleanup_event_messages() {
        let masters = BTreeSet::new();
        assert_eq!(NodePkiCleanup::CaRotated.event_message(), "Registry CA changed");
        assert_eq!(
            NodePkiCleanup::FormerMasters(&masters).event_message(),
            "Node is no longer a control-plane node"
        );
    }
}
