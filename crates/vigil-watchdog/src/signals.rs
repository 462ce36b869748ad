//! Derived health signals.
//!
//! Thin, total functions from the raw probe surface to the boolean signals
//! the classifier consumes. Signals are re-sampled at each decision point,
//! never cached across modules, so the safeguard always sees fresher data
//! than the health module did earlier in the same tick.

use vigil_types::WatchdogConfig;

use crate::probes::{proxy_host_port, SystemProbes};

/// HTTP probe timeout in seconds.
pub const HTTP_PROBE_TIMEOUT_SECS: u64 = 5;

/// End-to-end timeout for the through-proxy probe.
pub const PROXY_PROBE_TIMEOUT_SECS: u64 = 8;

/// Timeout for the raw proxy socket connect.
pub const TCP_PROBE_TIMEOUT_SECS: u64 = 3;

/// Whether an HTTP status from the health endpoint counts as healthy.
///
/// 401/403 count: they prove the HTTP stack is alive even when auth gates
/// the endpoint.
pub fn is_healthy_status(code: u16) -> bool {
    matches!(code, 200 | 204 | 401 | 403)
}

/// Gateway process visible in the process table.
pub fn liveness(probes: &dyn SystemProbes, config: &WatchdogConfig) -> bool {
    probes.process_alive(&config.process_pattern)
}

/// Gateway HTTP health endpoint responding with a healthy status.
pub fn http_health(probes: &dyn SystemProbes, config: &WatchdogConfig) -> bool {
    probes
        .http_status(&config.health_check_url, HTTP_PROBE_TIMEOUT_SECS, None)
        .is_some_and(is_healthy_status)
}

/// One ICMP echo to the configured target succeeded.
pub fn online(probes: &dyn SystemProbes, config: &WatchdogConfig) -> bool {
    probes.ping(&config.ping_target, config.ping_timeout)
}

/// Stricter external check used after network recovery settles.
pub fn external_reachable(probes: &dyn SystemProbes, config: &WatchdogConfig) -> bool {
    probes.http_status(&config.discord_check_url, HTTP_PROBE_TIMEOUT_SECS, None) == Some(200)
}

/// Proxy health: socket reachable and an external API answers through it.
/// Considered healthy when no proxy is configured.
pub fn proxy_ok(probes: &dyn SystemProbes, config: &WatchdogConfig) -> bool {
    let Some(proxy_url) = config.proxy_url.as_deref() else {
        return true;
    };
    let Some((host, port)) = proxy_host_port(proxy_url) else {
        tracing::warn!(proxy = proxy_url, "proxy URL has no host:port, treating as degraded");
        return false;
    };
    if !probes.tcp_connect(&host, port, TCP_PROBE_TIMEOUT_SECS) {
        return false;
    }
    // Any status code means the proxy relayed the request end to end.
    probes
        .http_status(&config.llm_api_check_url, PROXY_PROBE_TIMEOUT_SECS, Some(proxy_url))
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockProbes;

    #[test]
    fn healthy_statuses_include_auth_gated() {
        assert!(is_healthy_status(200));
        assert!(is_healthy_status(204));
        assert!(is_healthy_status(401));
        assert!(is_healthy_status(403));
        assert!(!is_healthy_status(500));
        assert!(!is_healthy_status(302));
        assert!(!is_healthy_status(404));
    }

    #[test]
    fn http_health_unknown_counts_unhealthy() {
        let config = WatchdogConfig::default();
        let probes = MockProbes::new();
        probes.set_http(&config.health_check_url, None);
        assert!(!http_health(&probes, &config));
    }

    #[test]
    fn proxy_ok_without_proxy_is_healthy() {
        let config = WatchdogConfig::default();
        let probes = MockProbes::new();
        probes.set_tcp(false);
        assert!(proxy_ok(&probes, &config));
    }

    #[test]
    fn proxy_ok_requires_socket_and_relay() {
        let mut config = WatchdogConfig::default();
        config.proxy_url = Some("http://127.0.0.1:8118".into());

        let probes = MockProbes::new();
        probes.set_tcp(false);
        assert!(!proxy_ok(&probes, &config));

        let probes = MockProbes::new();
        probes.set_tcp(true);
        probes.set_http(&config.llm_api_check_url, None);
        assert!(!proxy_ok(&probes, &config));

        let probes = MockProbes::new();
        probes.set_tcp(true);
        // 403 from the API still proves the relay works.
        probes.set_http(&config.llm_api_check_url, Some(403));
        assert!(proxy_ok(&probes, &config));
    }

    #[test]
    fn external_reachable_needs_200() {
        let config = WatchdogConfig::default();
        let probes = MockProbes::new();
        probes.set_http(&config.discord_check_url, Some(401));
        assert!(!external_reachable(&probes, &config));
        probes.set_http(&config.discord_check_url, Some(200));
        assert!(external_reachable(&probes, &config));
    }
}
