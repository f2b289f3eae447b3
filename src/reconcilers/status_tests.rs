// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        ComponentChecksums, Condition, ControlPlaneNode, ControlPlaneNodeSpec,
        ControlPlaneNodeStatus,
    };
    use crate::reconcilers::status::{
        condition_changed, conditions_equal, create_condition, find_condition,
        update_condition_in_memory, ControlPlaneNodeStatusUpdater,
    };
    use crate::status_reasons::{
        CONDITION_TYPE_CONFIGURED, CONDITION_TYPE_READY, REASON_APPLIED,
        REASON_DESIRED_STATE_BUILT, STATUS_FALSE, STATUS_TRUE,
    };

    fn node(status: Option<ControlPlaneNodeStatus>) -> ControlPlaneNode {
        let mut node = ControlPlaneNode::new(
            "master-1",
            ControlPlaneNodeSpec {
                pki_checksum: "pki".to_string(),
                config_version: "1.2".to_string(),
                hot_reload_checksum: "hot".to_string(),
                components: ComponentChecksums::default(),
                node_services: None,
            },
        );
        node.status = status;
        node
    }

    #[test]
    fn test_create_condition_basic() {
        let condition = create_condition(CONDITION_TYPE_READY, STATUS_TRUE, REASON_APPLIED, "ok");

        assert_eq!(condition.r#type, CONDITION_TYPE_READY);
        assert_eq!(condition.status, STATUS_TRUE);
        assert_eq!(condition.reason, Some(REASON_APPLIED.to_string()));
        assert_eq!(condition.message, Some("ok".to_string()));
        assert!(condition.last_transition_time.unwrap().contains('T'));
    }

    #[test]
    fn test_condition_changed() {
        let existing = Some(create_condition("Ready", STATUS_TRUE, "Applied", "Message"));

        assert!(condition_changed(
            &existing,
            &create_condition("Ready", STATUS_FALSE, "Applied", "Message")
        ));
        assert!(condition_changed(
            &existing,
            &create_condition("Ready", STATUS_TRUE, "Applied", "Other")
        ));
        // Reason is not compared
        assert!(!condition_changed(
            &existing,
            &create_condition("Ready", STATUS_TRUE, "Other", "Message")
        ));
        assert!(condition_changed(
            &None,
            &create_condition("Ready", STATUS_TRUE, "Applied", "Message")
        ));
    }

    #[test]
    fn test_update_condition_preserves_transition_time_on_same_status() {
        let mut conditions = vec![Condition {
            r#type: "Ready".to_string(),
            status: STATUS_TRUE.to_string(),
            reason: Some("Applied".to_string()),
            message: Some("old".to_string()),
            last_transition_time: Some("2026-01-01T00:00:00Z".to_string()),
        }];

        update_condition_in_memory(&mut conditions, "Ready", STATUS_TRUE, "Applied", "new");
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
        assert_eq!(conditions[0].message.as_deref(), Some("new"));

        update_condition_in_memory(&mut conditions, "Ready", STATUS_FALSE, "ApplyFailed", "x");
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_update_condition_leaves_other_types() {
        let mut conditions = vec![create_condition(
            CONDITION_TYPE_READY,
            STATUS_TRUE,
            REASON_APPLIED,
            "",
        )];
        update_condition_in_memory(
            &mut conditions,
            CONDITION_TYPE_CONFIGURED,
            STATUS_TRUE,
            REASON_DESIRED_STATE_BUILT,
            "",
        );

        assert_eq!(conditions.len(), 2);
        assert_eq!(
            find_condition(&conditions, CONDITION_TYPE_READY).unwrap().status,
            STATUS_TRUE
        );
        assert!(find_condition(&conditions, "Missing").is_none());
    }

    #[test]
    fn test_conditions_equal_ignores_timestamps() {
        let mut a = create_condition("Ready", STATUS_TRUE, "Applied", "m");
        let mut b = a.clone();
        a.last_transition_time = Some("2026-01-01T00:00:00Z".to_string());
        b.last_transition_time = Some("2026-02-01T00:00:00Z".to_string());

        assert!(conditions_equal(&[a.clone()], &[b]));
        assert!(!conditions_equal(&[a.clone()], &[]));
        assert!(!conditions_equal(
            &[a],
            &[create_condition("Ready", STATUS_FALSE, "Applied", "m")]
        ));
    }

    #[test]
    fn test_updater_without_status_has_changes() {
        let updater = ControlPlaneNodeStatusUpdater::new(&node(None));
        assert!(updater.has_changes());
    }

    #[test]
    fn test_updater_detects_no_change() {
        let status = ControlPlaneNodeStatus {
            ready: Some(true),
            observed_config_version: Some("1.2".to_string()),
            observed_node_services_version: None,
            conditions: vec![create_condition(
                CONDITION_TYPE_READY,
                STATUS_TRUE,
                REASON_APPLIED,
                "Applied config version 1.2",
            )],
        };
        let mut updater = ControlPlaneNodeStatusUpdater::new(&node(Some(status)));
        updater.set_applied("1.2", None);
        updater.set_condition(
            CONDITION_TYPE_READY,
            STATUS_TRUE,
            REASON_APPLIED,
            "Applied config version 1.2",
        );
        assert!(!updater.has_changes());

        updater.set_applied("1.3", Some("abc"));
        assert!(updater.has_changes());
        assert_eq!(
            updater.status().observed_node_services_version.as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_updater_keeps_foreign_condition() {
        let status = ControlPlaneNodeStatus {
            conditions: vec![create_condition(
                CONDITION_TYPE_CONFIGURED,
                STATUS_TRUE,
                REASON_DESIRED_STATE_BUILT,
                "",
            )],
            ..ControlPlaneNodeStatus::default()
        };
        let mut updater = ControlPlaneNodeStatusUpdater::new(&node(Some(status)));
        updater.set_not_ready();
        updater.set_condition(CONDITION_TYPE_READY, STATUS_FALSE, "Progressing", "");

        let conditions = &updater.status().conditions;
        assert_eq!(conditions.len(), 2);
        assert!(find_condition(conditions, CONDITION_TYPE_CONFIGURED).is_some());
        assert_eq!(updater.status().ready, Some(false));
    }
}
