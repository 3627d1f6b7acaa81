use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use reconciler::defs::{CONTROLLER_NAME, DEFAULT_ADDON_NAME, DEFAULT_IMAGE};
use reconciler::EngineSettings;

pub const DEFAULT_NAMESPACE: &str = "open-cluster-management";
pub const DEFAULT_STATUS_PORT: u16 = 8383;
pub const DEFAULT_RESYNC_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_TEARDOWN_TIMEOUT_SECONDS: u64 = 90;

/// Operator settings read from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    pub addon_name: String,
    /// Namespace holding the leader election lease.
    pub namespace: String,
    pub pod_name: String,
    pub agent_image: String,
    pub status_port: u16,
    pub resync_interval: Duration,
    pub teardown_timeout: Duration,
}

impl OperatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        OperatorConfig {
            addon_name: text("ADDON_NAME", DEFAULT_ADDON_NAME),
            namespace: text("OPERATOR_NAMESPACE", DEFAULT_NAMESPACE),
            pod_name: text("POD_NAME", "NO_POD_NAME_FOUND"),
            agent_image: text("AGENT_IMAGE", DEFAULT_IMAGE),
            status_port: number(&lookup, "STATUS_PORT", DEFAULT_STATUS_PORT),
            resync_interval: Duration::from_secs(
                number(
                    &lookup,
                    "RESYNC_INTERVAL_SECONDS",
                    DEFAULT_RESYNC_INTERVAL_SECONDS,
                )
                .max(1),
            ),
            teardown_timeout: Duration::from_secs(number(
                &lookup,
                "TEARDOWN_TIMEOUT_SECONDS",
                DEFAULT_TEARDOWN_TIMEOUT_SECONDS,
            )),
        }
    }

    pub fn holder_id(&self) -> String {
        format!("{}-{}", CONTROLLER_NAME, self.pod_name)
    }

    pub fn lease_name(&self) -> String {
        format!("{}-lock", CONTROLLER_NAME)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            addon_name: self.addon_name.clone(),
            image: self.agent_image.clone(),
            teardown_timeout: self.teardown_timeout,
            ..EngineSettings::default()
        }
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                "Invalid value {:?} for {}, using the default {}",
                raw, key, default
            );
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> OperatorConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OperatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.addon_name, "governance-policy-framework");
        assert_eq!(config.namespace, "open-cluster-management");
        assert_eq!(config.status_port, 8383);
        assert_eq!(config.resync_interval, Duration::from_secs(60));
        assert_eq!(config.teardown_timeout, Duration::from_secs(90));
        assert_eq!(
            config.holder_id(),
            "governance-policy-addon-controller-NO_POD_NAME_FOUND"
        );
        assert_eq!(config.lease_name(), "governance-policy-addon-controller-lock");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ADDON_NAME", "config-policy-controller"),
            ("POD_NAME", "controller-7d9f"),
            ("AGENT_IMAGE", "registry.local/framework:v1"),
            ("STATUS_PORT", "9000"),
            ("TEARDOWN_TIMEOUT_SECONDS", "30"),
        ]);
        assert_eq!(config.addon_name, "config-policy-controller");
        assert_eq!(config.status_port, 9000);
        assert_eq!(
            config.holder_id(),
            "governance-policy-addon-controller-controller-7d9f"
        );

        let settings = config.engine_settings();
        assert_eq!(settings.addon_name, "config-policy-controller");
        assert_eq!(settings.image, "registry.local/framework:v1");
        assert_eq!(settings.teardown_timeout, Duration::from_secs(30));
        assert_eq!(settings.conflict_retries, EngineSettings::default().conflict_retries);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[
            ("STATUS_PORT", "http"),
            ("RESYNC_INTERVAL_SECONDS", "-5"),
            ("ADDON_NAME", "  "),
        ]);
        assert_eq!(config.status_port, 8383);
        assert_eq!(config.resync_interval, Duration::from_secs(60));
        assert_eq!(config.addon_name, "governance-policy-framework");

        // Zero would make the resync interval panic
        let config = config_from(&[("RESYNC_INTERVAL_SECONDS", "0")]);
        assert_eq!(config.resync_interval, Duration::from_secs(1));
    }
}
