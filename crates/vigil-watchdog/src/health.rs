//! Gateway health classifier.
//!
//! The decision core of the supervisor: consumes liveness, HTTP health,
//! network reachability, proxy reachability, and system-uptime signals, and
//! emits at most one restart per tick, gated by cooldown and backoff.
//!
//! The per-class state machines ([`BackoffState`], [`WakeState`],
//! [`NetworkState`]) are pure so they can be driven with synthetic traces;
//! all side effects (probing, settling, restarting) live in
//! [`GatewayHealth::tick`].

use std::time::Duration;

use vigil_types::WatchdogConfig;

use crate::clock::Clock;
use crate::probes::SystemProbes;
use crate::restart::{RestartManager, RestartOutcome};
use crate::signals;

/// Spacing between the two fatal-liveness probes, seconds.
const LIVENESS_RECHECK_SPACING_SECS: u64 = 5;

/// Uptime jumping forward by more than `tick * WAKE_JUMP_TICKS` counts as a
/// wake, same as a decrease.
const WAKE_JUMP_TICKS: u64 = 10;

/// Escalating retry ladder for the transient-unhealthy class.
///
/// `wait_secs == 0` means inactive. Within one failure episode the wait is
/// monotonically non-decreasing and bounded by the configured maximum; any
/// healthy observation resets it to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    wait_secs: u64,
    fail_start: i64,
}

impl BackoffState {
    pub fn is_active(&self) -> bool {
        self.wait_secs > 0
    }

    /// Current wait, seconds. Zero when inactive.
    pub fn wait_secs(&self) -> u64 {
        self.wait_secs
    }

    /// Enter the ladder on first failure.
    pub fn enter(&mut self, initial_secs: u64, now: i64) {
        self.wait_secs = initial_secs;
        self.fail_start = now;
    }

    /// Any healthy observation leaves the ladder.
    pub fn reset(&mut self) {
        self.wait_secs = 0;
        self.fail_start = 0;
    }

    /// Whether the current wait window has fully elapsed.
    pub fn window_elapsed(&self, now: i64) -> bool {
        now.saturating_sub(self.fail_start) >= self.wait_secs as i64
    }

    /// Escalate after an elapsed window with health still bad.
    ///
    /// Returns `true` when the ladder is exhausted (the escalation after
    /// this one would exceed `max_secs`) and a restart is authorized.
    pub fn escalate(&mut self, multiplier: u64, max_secs: u64, now: i64) -> bool {
        self.wait_secs = self.wait_secs.saturating_mul(multiplier).min(max_secs);
        self.fail_start = now;
        self.wait_secs.saturating_mul(multiplier) > max_secs
    }
}

/// System-sleep/reboot detector fed by monotonic uptime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WakeState {
    last_uptime: Option<u64>,
}

impl WakeState {
    /// Record one uptime observation; returns `true` on a one-shot wake
    /// signal (uptime decreased, or jumped past ten tick periods).
    pub fn observe(&mut self, uptime: Option<u64>, tick_secs: u64) -> bool {
        let woke = match (self.last_uptime, uptime) {
            (Some(last), Some(current)) => {
                current < last || current > last + tick_secs * WAKE_JUMP_TICKS
            }
            _ => false,
        };
        if uptime.is_some() {
            self.last_uptime = uptime;
        }
        woke
    }
}

/// Edge-triggered connectivity transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTransition {
    StillUp,
    WentDown,
    StillDown,
    Recovered,
}

/// Remembers whether the network was down so recovery can be edge-triggered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkState {
    was_down: bool,
}

impl NetworkState {
    pub fn observe(&mut self, online: bool) -> NetworkTransition {
        match (self.was_down, online) {
            (false, true) => NetworkTransition::StillUp,
            (false, false) => {
                self.was_down = true;
                NetworkTransition::WentDown
            }
            (true, false) => NetworkTransition::StillDown,
            (true, true) => {
                self.was_down = false;
                NetworkTransition::Recovered
            }
        }
    }

    pub fn is_down(&self) -> bool {
        self.was_down
    }
}

/// Multi-signal health classifier with backoff, wake and network gating.
#[derive(Debug, Default)]
pub struct GatewayHealth {
    backoff: BackoffState,
    wake: WakeState,
    network: NetworkState,
    proxy_failures: u32,
    tick_count: u64,
}

impl GatewayHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    pub fn network_down(&self) -> bool {
        self.network.is_down()
    }

    /// Run one health pass: wake check, network transition check, fatal and
    /// transient classification, and the periodic proxy check.
    pub fn tick(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) {
        self.tick_count += 1;

        // 1. Wake check: a sleep or reboot invalidates every signal we hold.
        if self.wake.observe(probes.uptime_seconds(), config.check_interval) {
            tracing::warn!(settle_secs = config.tun_settle, "wake detected, settling");
            clock.sleep(Duration::from_secs(config.tun_settle));
            if signals::online(probes, config) {
                restart.try_restart("wake-detected", probes, clock, config);
            } else {
                tracing::info!("network not back after wake, deferring");
            }
            self.backoff.reset();
            return;
        }

        // 2. Network transition check.
        match self.network.observe(signals::online(probes, config)) {
            NetworkTransition::WentDown => {
                tracing::warn!(ping_target = %config.ping_target, "network down, holding all restarts");
                return;
            }
            NetworkTransition::StillDown => {
                tracing::debug!("network still down");
                return;
            }
            NetworkTransition::Recovered => {
                tracing::info!(settle_secs = config.tun_settle, "network recovered, settling");
                clock.sleep(Duration::from_secs(config.tun_settle));
                if signals::online(probes, config) && signals::external_reachable(probes, config)
                {
                    restart.try_restart("network-recovered", probes, clock, config);
                } else {
                    tracing::info!("recovery did not hold after settle, deferring");
                    self.network.observe(false);
                }
                return;
            }
            NetworkTransition::StillUp => {}
        }

        // 3. Fatal: process gone on two consecutive probes.
        if !signals::liveness(probes, config) {
            clock.sleep(Duration::from_secs(LIVENESS_RECHECK_SPACING_SECS));
            if !signals::liveness(probes, config) {
                tracing::error!(
                    pattern = %config.process_pattern,
                    "gateway process not found on two consecutive probes"
                );
                restart.try_restart("gateway-dead", probes, clock, config);
                self.backoff.reset();
                return;
            }
        }

        // 4. Transient: process alive but HTTP health failing.
        self.classify_transient(probes, clock, config, restart);

        // 5. Proxy check, every K ticks only.
        if config.proxy_url.is_some()
            && self.tick_count % config.proxy_check_interval.max(1) == 0
        {
            self.check_proxy(probes, clock, config, restart);
        }
    }

    fn classify_transient(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) {
        let now = clock.now_epoch();
        if signals::http_health(probes, config) {
            if self.backoff.is_active() {
                tracing::info!("gateway responsive again, leaving backoff");
            }
            self.backoff.reset();
            return;
        }

        if !self.backoff.is_active() {
            self.backoff.enter(config.backoff_initial, now);
            tracing::warn!(
                wait_secs = self.backoff.wait_secs(),
                "gateway unresponsive, entering backoff"
            );
            return;
        }

        if !self.backoff.window_elapsed(now) {
            tracing::debug!(
                wait_secs = self.backoff.wait_secs(),
                "within backoff window, deferring"
            );
            return;
        }

        // Window elapsed: re-sample before deciding.
        if signals::http_health(probes, config) {
            tracing::info!("gateway recovered at backoff recheck");
            self.backoff.reset();
            return;
        }

        if self
            .backoff
            .escalate(config.backoff_multiplier, config.backoff_max, now)
        {
            tracing::warn!("backoff ladder exhausted, authorizing restart");
            if let RestartOutcome::Issued { .. } =
                restart.try_restart("unresponsive", probes, clock, config)
            {
                self.backoff.reset();
            }
            // Suppressed: the ladder stays armed.
        } else {
            tracing::warn!(
                wait_secs = self.backoff.wait_secs(),
                "gateway still unresponsive, backoff escalated"
            );
        }
    }

    fn check_proxy(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) {
        if signals::proxy_ok(probes, config) {
            if self.proxy_failures > 0 {
                tracing::info!("proxy healthy again");
            }
            self.proxy_failures = 0;
            return;
        }
        self.proxy_failures += 1;
        tracing::warn!(
            failures = self.proxy_failures,
            threshold = config.proxy_fail_threshold,
            "proxy check failed"
        );
        if self.proxy_failures >= config.proxy_fail_threshold {
            restart.try_restart("proxy-degraded", probes, clock, config);
            self.proxy_failures = 0;
        }
    }
}
