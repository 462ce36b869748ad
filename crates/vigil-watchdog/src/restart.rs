//! Restart authorization and execution.
//!
//! Every module routes restart requests through one [`RestartManager`] so
//! the global guarantees hold: at most one restart per tick, at most one per
//! cooldown interval. The cooldown intentionally includes failed restarts to
//! prevent storms.

use std::time::Duration;

use vigil_types::WatchdogConfig;

use crate::clock::Clock;
use crate::probes::SystemProbes;
use crate::signals;

/// Post-restart health polls.
const POST_RESTART_POLLS: u32 = 6;

/// Spacing between post-restart polls, seconds.
const POST_RESTART_POLL_SPACING_SECS: u64 = 5;

/// What happened to a restart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// The restart was issued. `healthy` reports whether the gateway came
    /// back within the post-restart poll window.
    Issued { healthy: bool },
    /// Suppressed by the cooldown gate; per-class counters stay untouched.
    Suppressed { remaining_secs: u64 },
}

/// Global anti-thrash guard plus the restart procedure itself.
#[derive(Debug)]
pub struct RestartManager {
    cooldown_secs: u64,
    last_restart: Option<i64>,
    restarts_issued: u64,
    last_reason: Option<String>,
}

impl RestartManager {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_secs,
            last_restart: None,
            restarts_issued: 0,
            last_reason: None,
        }
    }

    /// Epoch of the last issued restart, if any.
    pub fn last_restart(&self) -> Option<i64> {
        self.last_restart
    }

    /// Total restarts issued this run.
    pub fn restarts_issued(&self) -> u64 {
        self.restarts_issued
    }

    /// Reason of the last issued restart.
    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }

    /// Seconds left on the cooldown, or `None` when a restart is permitted.
    pub fn cooldown_remaining(&self, now: i64) -> Option<u64> {
        let last = self.last_restart?;
        let elapsed = now.saturating_sub(last);
        if elapsed < self.cooldown_secs as i64 {
            Some((self.cooldown_secs as i64 - elapsed) as u64)
        } else {
            None
        }
    }

    /// Request a gateway restart for `reason`.
    ///
    /// Consults the cooldown first; when permitted, invokes the service
    /// manager, updates `last_restart` unconditionally, then polls the
    /// health endpoint up to six times at 5 s spacing. A restart that does
    /// not reach healthy is reported but not retried within the same tick.
    pub fn try_restart(
        &mut self,
        reason: &str,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
    ) -> RestartOutcome {
        let now = clock.now_epoch();
        if let Some(remaining_secs) = self.cooldown_remaining(now) {
            tracing::warn!(
                reason,
                remaining_secs,
                "restart suppressed by cooldown"
            );
            return RestartOutcome::Suppressed { remaining_secs };
        }

        tracing::warn!(reason, label = %config.service_label, "restarting gateway");
        if let Err(e) = probes.service_restart(&config.service_label) {
            // Health polling below is the real success judge; the control
            // primitive's exit status alone is not trusted either way.
            tracing::error!(reason, error = %e, "service restart invocation failed");
        }
        self.last_restart = Some(now);
        self.restarts_issued += 1;
        self.last_reason = Some(reason.to_string());

        let mut healthy = false;
        for poll in 1..=POST_RESTART_POLLS {
            clock.sleep(Duration::from_secs(POST_RESTART_POLL_SPACING_SECS));
            if signals::http_health(probes, config) {
                tracing::info!(reason, poll, "gateway healthy after restart");
                healthy = true;
                break;
            }
        }
        if !healthy {
            tracing::error!(
                reason,
                polls = POST_RESTART_POLLS,
                "gateway did not become healthy after restart"
            );
        }
        RestartOutcome::Issued { healthy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeClock, MockProbes};

    fn config() -> WatchdogConfig {
        let mut c = WatchdogConfig::default();
        c.cooldown = 120;
        c
    }

    #[test]
    fn first_restart_is_permitted_and_polls_health() {
        let config = config();
        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let mut mgr = RestartManager::new(config.cooldown);

        let outcome = mgr.try_restart("gateway-dead", &probes, &clock, &config);
        assert_eq!(outcome, RestartOutcome::Issued { healthy: true });
        assert_eq!(probes.restart_labels(), vec![config.service_label.clone()]);
        assert_eq!(mgr.last_restart(), Some(1_000));
        assert_eq!(mgr.last_reason(), Some("gateway-dead"));
        // First poll sleeps 5 s then sees the (default 200) health endpoint.
        assert_eq!(clock.now_epoch(), 1_005);
    }

    #[test]
    fn cooldown_suppresses_second_restart() {
        let config = config();
        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let mut mgr = RestartManager::new(config.cooldown);

        mgr.try_restart("unresponsive", &probes, &clock, &config);
        let outcome = mgr.try_restart("unresponsive", &probes, &clock, &config);
        assert!(matches!(outcome, RestartOutcome::Suppressed { .. }));
        assert_eq!(probes.restart_labels().len(), 1);
        assert_eq!(mgr.restarts_issued(), 1);
    }

    #[test]
    fn cooldown_expires_and_permits_again() {
        let config = config();
        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let mut mgr = RestartManager::new(config.cooldown);

        mgr.try_restart("unresponsive", &probes, &clock, &config);
        clock.advance(121);
        let outcome = mgr.try_restart("unresponsive", &probes, &clock, &config);
        assert!(matches!(outcome, RestartOutcome::Issued { .. }));
        assert_eq!(mgr.restarts_issued(), 2);
    }

    #[test]
    fn unhealthy_after_restart_reports_but_still_counts() {
        let config = config();
        let probes = MockProbes::new();
        probes.set_http(&config.health_check_url, Some(500));
        let clock = FakeClock::new(1_000);
        let mut mgr = RestartManager::new(config.cooldown);

        let outcome = mgr.try_restart("unresponsive", &probes, &clock, &config);
        assert_eq!(outcome, RestartOutcome::Issued { healthy: false });
        // Cooldown includes failed restarts.
        assert!(mgr.cooldown_remaining(clock.now_epoch()).is_some());
        // Six polls at 5 s spacing.
        assert_eq!(clock.now_epoch(), 1_030);
    }

    #[test]
    fn invocation_failure_still_updates_cooldown() {
        let config = config();
        let probes = MockProbes::new();
        probes.fail_restarts();
        probes.set_http(&config.health_check_url, Some(500));
        let clock = FakeClock::new(1_000);
        let mut mgr = RestartManager::new(config.cooldown);

        let outcome = mgr.try_restart("wake-detected", &probes, &clock, &config);
        assert_eq!(outcome, RestartOutcome::Issued { healthy: false });
        assert_eq!(mgr.last_restart(), Some(1_000));
    }

    #[test]
    fn cooldown_remaining_counts_down() {
        let mut mgr = RestartManager::new(100);
        assert_eq!(mgr.cooldown_remaining(50), None);
        mgr.last_restart = Some(40);
        assert_eq!(mgr.cooldown_remaining(50), Some(90));
        assert_eq!(mgr.cooldown_remaining(140), None);
    }
}
