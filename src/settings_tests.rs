// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Unit tests for `settings.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::ModuleConfigSpec;
    use serde_json::json;

    #[test]
    fn test_missing_settings_are_default() {
        assert_eq!(RegistrySettings::from_value(None).unwrap(), RegistrySettings::default());
        assert_eq!(
            RegistrySettings::from_value(Some(&Value::Null)).unwrap(),
            RegistrySettings::default()
        );
    }

    #[test]
    fn test_images_override_is_stripped() {
        let tree = json!({
            "mode": "Local",
            "imagesOverride": {"registry": "example.com/override"},
            "localMode": {"upstreamMirrors": ["a.example.com"]}
        });
        let settings = RegistrySettings::from_value(Some(&tree)).unwrap();

        assert!(!settings.extra.contains_key("imagesOverride"));
        assert!(settings.to_value().get("imagesOverride").is_none());
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let tree = json!({
            "futureFlag": true,
            "localMode": {"upstreamMirrors": ["m1"], "newKnob": 3},
            "proxyMode": {"upstream": {"host": "r.example.com", "extraAuth": "x"}}
        });
        let settings = RegistrySettings::from_value(Some(&tree)).unwrap();
        let back = settings.to_value();

        assert_eq!(back["futureFlag"], json!(true));
        assert_eq!(back["localMode"]["newKnob"], json!(3));
        assert_eq!(back["proxyMode"]["upstream"]["extraAuth"], json!("x"));
    }

    #[test]
    fn test_local_defined_requires_non_empty_subtree() {
        let empty = RegistrySettings::from_value(Some(&json!({"localMode": {}}))).unwrap();
        assert!(!empty.local_defined());

        let local = RegistrySettings::from_value(Some(&json!({
            "localMode": {"ingressClientCA": "pem"}
        })))
        .unwrap();
        assert!(local.local_defined());
        assert_eq!(
            local.local_mode.unwrap().ingress_client_ca.as_deref(),
            Some("pem")
        );
    }

    #[test]
    fn test_proxy_defined_requires_host() {
        let no_host = RegistrySettings::from_value(Some(&json!({
            "proxyMode": {"upstream": {"path": "/deckhouse"}}
        })))
        .unwrap();
        assert!(!no_host.proxy_defined());

        let proxy = RegistrySettings::from_value(Some(&json!({
            "proxyMode": {
                "upstream": {"host": "registry.example.com", "path": "/deckhouse/ee", "ttl": "72h"},
                "upstreamCA": "pem"
            }
        })))
        .unwrap();
        assert!(proxy.proxy_defined());
        let upstream = proxy.proxy_mode.unwrap().upstream.unwrap();
        assert_eq!(upstream.scheme, "https");
        assert_eq!(upstream.ttl.as_deref(), Some("72h"));
    }

    #[test]
    fn test_proxy_envs_default_empty() {
        let settings = RegistrySettings::default();
        assert!(settings.proxy_envs().is_empty());

        let with_envs = RegistrySettings::from_value(Some(&json!({
            "proxyEnvs": {"http": "http://proxy:3128", "noProxy": "localhost"}
        })))
        .unwrap();
        let envs = with_envs.proxy_envs();
        assert_eq!(envs.http, "http://proxy:3128");
        assert_eq!(envs.https, "");
        assert_eq!(envs.no_proxy, "localhost");
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        let tree = json!({"localMode": {"upstreamMirrors": "not-a-list"}});
        assert!(RegistrySettings::from_value(Some(&tree)).is_err());
    }

    #[test]
    fn test_is_enabled() {
        let mut mc = ModuleConfig::new(
            "system-registry",
            ModuleConfigSpec {
                enabled: Some(true),
                ..ModuleConfigSpec::default()
            },
        );
        assert!(is_enabled(Some(&mc)));

        mc.spec.enabled = None;
        assert!(!is_enabled(Some(&mc)));
        assert!(!is_enabled(None));
    }
}
