//! The supervision loop.
//!
//! A single cooperative loop drives every module on a fixed period: health
//! first (wake/network gating), then the agent heartbeat probe, then the
//! config safeguard (which re-samples health freshest), then the backup
//! archiver and the periodic log trim. All module ticks run to completion
//! before the next sleep; there is no parallelism between modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vigil_types::{StatePaths, VigilError, WatchdogConfig};

use crate::backup::ConfigBackup;
use crate::clock::Clock;
use crate::health::GatewayHealth;
use crate::heartbeat::AgentHeartbeat;
use crate::logtrim;
use crate::pidfile;
use crate::probes::SystemProbes;
use crate::restart::RestartManager;
use crate::safeguard::ConfigSafeguard;

/// Log trim runs every this-many ticks.
const LOG_TRIM_TICKS: u64 = 20;

/// Long-lived supervisor composing all modules over one shared restart gate.
pub struct Supervisor {
    config: WatchdogConfig,
    paths: StatePaths,
    health: GatewayHealth,
    heartbeat: AgentHeartbeat,
    safeguard: ConfigSafeguard,
    backup: ConfigBackup,
    restart: RestartManager,
    shutdown: Arc<AtomicBool>,
    ticks: u64,
}

impl Supervisor {
    /// Build the supervisor: validate config, create the state layout, and
    /// reload any surviving rollback ticket.
    pub fn new(config: WatchdogConfig) -> Result<Self, VigilError> {
        config.validate()?;
        let paths = StatePaths::new(&config.state_dir);
        paths
            .ensure_dirs()
            .map_err(|e| VigilError::StateError(format!("failed to create state dirs: {e}")))?;
        let safeguard = ConfigSafeguard::load(&config);
        let restart = RestartManager::new(config.cooldown);
        Ok(Self {
            paths,
            health: GatewayHealth::new(),
            heartbeat: AgentHeartbeat::new(),
            safeguard,
            backup: ConfigBackup::new(),
            restart,
            shutdown: Arc::new(AtomicBool::new(false)),
            ticks: 0,
            config,
        })
    }

    /// Flag embedders (and tests) can flip to stop the loop without a
    /// signal.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Route SIGINT and SIGTERM into the process-global stop flag.
    ///
    /// SIGINT goes through the `ctrlc` crate; SIGTERM, which is what the
    /// service manager sends, gets the bare libc handler below. Neither
    /// does anything beyond raising the flag.
    pub fn install_signal_handlers(&self) -> Result<(), VigilError> {
        ctrlc::set_handler(|| STOP_REQUESTED.store(true, Ordering::SeqCst))
            .map_err(|e| VigilError::StateError(format!("failed to install SIGINT handler: {e}")))?;
        unsafe {
            libc::signal(libc::SIGTERM, raise_stop_flag as libc::sighandler_t);
        }
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) || STOP_REQUESTED.load(Ordering::SeqCst)
    }

    /// Run the loop until a stop is requested.
    ///
    /// Writes the pid file on entry (refusing to start over a live
    /// instance) and removes it on the way out. The loop exits at the next
    /// sleep boundary after a signal; in-flight probes finish within their
    /// own timeouts.
    pub fn run(&mut self, probes: &dyn SystemProbes, clock: &dyn Clock) -> Result<(), VigilError> {
        let pid_path = self.paths.pid_file();
        if let Some(pid) = pidfile::live_pid(&pid_path) {
            return Err(VigilError::StateError(format!(
                "watchdog already running (pid {pid})"
            )));
        }
        pidfile::write(&pid_path)?;
        tracing::info!(
            tick_secs = self.config.check_interval,
            gateway = %self.config.service_label,
            "supervisor started"
        );

        while !self.stop_requested() {
            self.tick(probes, clock);
            if self.stop_requested() {
                break;
            }
            clock.sleep(Duration::from_secs(self.config.check_interval));
        }

        pidfile::remove(&pid_path);
        tracing::info!("supervisor stopped");
        Ok(())
    }

    /// One full supervision pass over all modules.
    pub fn tick(&mut self, probes: &dyn SystemProbes, clock: &dyn Clock) {
        self.ticks += 1;
        self.health
            .tick(probes, clock, &self.config, &mut self.restart);
        self.heartbeat
            .tick(probes, clock, &self.config, &mut self.restart);
        self.safeguard
            .tick(probes, clock, &self.config, &mut self.restart);
        self.backup.tick(clock, &self.config);
        if self.ticks % LOG_TRIM_TICKS == 0 {
            if let Err(e) = logtrim::trim_log(&self.paths.log_file(), self.config.max_log_lines) {
                tracing::warn!(error = %e, "log trim failed");
            }
        }
    }

    /// Restart gate shared by every module.
    pub fn restart_manager(&self) -> &RestartManager {
        &self.restart
    }
}

/// Stop request raised from signal context. Handlers run with almost
/// nothing async-signal-safe available, so a process-global atomic is the
/// whole mechanism: the handler raises it, the loop reads it at its next
/// boundary.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn raise_stop_flag(_signal: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}
