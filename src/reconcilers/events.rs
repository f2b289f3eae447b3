// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Kubernetes Events surfacing reconcile outcomes.
//!
//! Event creation never fails a reconcile: API errors are logged and dropped.
//! Events for cluster-scoped objects are written to the `default` namespace.

use crate::constants::EVENT_REPORTER;
use k8s_openapi::jiff::Timestamp;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, warn};

pub const EVENT_TYPE_NORMAL: &str = "Normal";
pub const EVENT_TYPE_WARNING: &str = "Warning";

/// Namespace receiving events of cluster-scoped objects.
const CLUSTER_EVENTS_NAMESPACE: &str = "default";

pub const REASON_PKI_GENERATED: &str = "PKIGenerated";
pub const REASON_PKI_RESTORED: &str = "PKIRestored";
pub const REASON_PKI_ROTATED: &str = "PKIRotated";
pub const REASON_USER_GENERATED: &str = "UserGenerated";
pub const REASON_USER_RESTORED: &str = "UserRestored";
pub const REASON_NODE_PKI_GENERATED: &str = "NodePKIGenerated";
pub const REASON_NODE_PKI_DELETED: &str = "NodePKIDeleted";
pub const REASON_CONTROL_PLANE_NODE_CREATED: &str = "ControlPlaneNodeCreated";
pub const REASON_CONTROL_PLANE_NODE_UPDATED: &str = "ControlPlaneNodeUpdated";
pub const REASON_CONTROL_PLANE_NODE_DELETED: &str = "ControlPlaneNodeDeleted";
pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";

/// Reference to a Kubernetes object for `involvedObject`.
#[must_use]
pub fn object_reference<T>(obj: &T) -> ObjectReference
where
    T: Resource<DynamicType = ()>,
{
    ObjectReference {
        api_version: Some(T::api_version(&()).to_string()),
        kind: Some(T::kind(&()).to_string()),
        name: obj.meta().name.clone(),
        namespace: obj.meta().namespace.clone(),
        uid: obj.meta().uid.clone(),
        resource_version: obj.meta().resource_version.clone(),
        ..Default::default()
    }
}

/// Build an event for `reference`.
#[must_use]
pub fn build_event(
    reference: ObjectReference,
    event_type: &str,
    reason: &str,
    message: &str,
) -> Event {
    let name = reference.name.clone().unwrap_or_default();
    let namespace = reference
        .namespace
        .clone()
        .unwrap_or_else(|| CLUSTER_EVENTS_NAMESPACE.to_string());
    let now = Timestamp::now();

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-")),
            namespace: Some(namespace),
            ..Default::default()
        },
        involved_object: reference,
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        type_: Some(event_type.to_string()),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        event_time: Some(MicroTime(now)),
        count: Some(1),
        action: Some(reason.to_string()),
        reporting_component: Some(EVENT_REPORTER.to_string()),
        reporting_instance: std::env::var("POD_NAME").ok(),
        source: Some(EventSource {
            component: Some(EVENT_REPORTER.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Publish an event for `reference`; failures are logged.
pub async fn publish(
    client: &Client,
    reference: ObjectReference,
    event_type: &str,
    reason: &str,
    message: &str,
) {
    let event = build_event(reference, event_type, reason, message);
    let namespace = event.metadata.namespace.clone().unwrap_or_default();
    let object = event.involved_object.name.clone().unwrap_or_default();
    let api: Api<Event> = Api::namespaced(client.clone(), &namespace);

    match api.create(&PostParams::default(), &event).await {
        Ok(_) => debug!(object = %object, reason = %reason, "Published event"),
        Err(e) => warn!(object = %object, reason = %reason, error = %e, "Failed to create event"),
    }
}

/// Publish an event for a Kubernetes object.
pub async fn publish_for<T>(client: &Client, obj: &T, event_type: &str, reason: &str, message: &str)
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    publish(client, object_reference(obj), event_type, reason, message).await;
}

/// Reference to a secret known only by name.
#[must_use]
pub fn secret_reference(namespace: &str, name: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("Secret".to_string()),
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ComponentChecksums, ControlPlaneNode, ControlPlaneNodeSpec};

    fn control_plane_node() -> ControlPlaneNode {
        ControlPlaneNode::new(
            "master-1",
            ControlPlaneNodeSpec {
                pki_checksum: String::new(),
                config_version: "1.1".to_string(),
                hot_reload_checksum: String::new(),
                components: ComponentChecksums::default(),
                node_services: None,
            },
        )
    }

    #[test]
    fn test_cluster_scoped_event_goes_to_default_namespace() {
        let event = build_event(
            object_reference(&control_plane_node()),
            EVENT_TYPE_NORMAL,
            REASON_CONTROL_PLANE_NODE_CREATED,
            "created",
        );

        assert_eq!(event.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(event.metadata.generate_name.as_deref(), Some("master-1-"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("ControlPlaneNode"));
        assert_eq!(
            event.involved_object.api_version.as_deref(),
            Some("control-plane.deckhouse.io/v1alpha1")
        );
        assert_eq!(event.reporting_component.as_deref(), Some(EVENT_REPORTER));
    }

    #[test]
    fn test_secret_event_keeps_namespace() {
        let event = build_event(
            secret_reference("d8-system", "registry-node-master-1-pki"),
            EVENT_TYPE_WARNING,
            REASON_NODE_PKI_DELETED,
            "CA rotated",
        );

        assert_eq!(event.metadata.namespace.as_deref(), Some("d8-system"));
        assert_eq!(event.type_.as_deref(), Some(EVENT_TYPE_WARNING));
        assert_eq!(event.reason.as_deref(), Some(REASON_NODE_PKI_DELETED));
    }
}
