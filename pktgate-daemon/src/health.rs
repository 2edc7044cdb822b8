//! Aggregated health reporting.
//!
//! Combines the decision engine's `health_check()` with the mirror ingress
//! status into one [`DaemonHealth`] report. The overall status is the worst
//! status among enabled components.

use serde::Serialize;

use pktgate_core::pipeline::HealthStatus;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among enabled components.
    pub status: HealthStatus,
    pub uptime_secs: u64,
    /// Table generation currently served to the data path.
    pub tables_generation: u64,
    pub components: Vec<ComponentHealth>,
}

/// Health status for a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g. "decision-engine", "mirror-ingress").
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: &str, enabled: bool, status: HealthStatus) -> Self {
        Self {
            name: name.to_owned(),
            enabled,
            status,
        }
    }
}

/// Reduce component statuses to the worst one: Unhealthy > Degraded > Healthy.
///
/// Disabled components are ignored. Reasons of every non-healthy component
/// at the worst level are joined with `"; "`.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, enabled: bool, status: HealthStatus) -> ComponentHealth {
        ComponentHealth::new(name, enabled, status)
    }

    #[test]
    fn all_healthy() {
        let components = [
            component("decision-engine", true, HealthStatus::Healthy),
            component("mirror-ingress", true, HealthStatus::Healthy),
        ];
        assert_eq!(aggregate_status(&components), HealthStatus::Healthy);
    }

    #[test]
    fn unhealthy_wins_over_degraded() {
        let components = [
            component(
                "decision-engine",
                true,
                HealthStatus::Degraded("flow table full".to_owned()),
            ),
            component(
                "mirror-ingress",
                true,
                HealthStatus::Unhealthy("receive loop exited".to_owned()),
            ),
        ];
        assert_eq!(
            aggregate_status(&components),
            HealthStatus::Unhealthy("mirror-ingress: receive loop exited".to_owned())
        );
    }

    #[test]
    fn degraded_reasons_are_joined() {
        let components = [
            component("a", true, HealthStatus::Degraded("x".to_owned())),
            component("b", true, HealthStatus::Degraded("y".to_owned())),
        ];
        assert_eq!(
            aggregate_status(&components),
            HealthStatus::Degraded("a: x; b: y".to_owned())
        );
    }

    #[test]
    fn disabled_components_are_ignored() {
        let components = [
            component("decision-engine", true, HealthStatus::Healthy),
            component(
                "mirror-ingress",
                false,
                HealthStatus::Unhealthy("not running".to_owned()),
            ),
        ];
        assert!(aggregate_status(&components).is_healthy());
    }

    #[test]
    fn report_serializes_with_tagged_status() {
        let report = DaemonHealth {
            status: HealthStatus::Degraded("decision-engine: no services configured".to_owned()),
            uptime_secs: 3,
            tables_generation: 1,
            components: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["status"], "degraded");
        assert_eq!(json["tables_generation"], 1);
    }
}
