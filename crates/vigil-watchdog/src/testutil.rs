//! Test doubles: a virtual clock and scripted probes.
//!
//! `FakeClock` advances on `sleep`, so settle delays and poll spacing are
//! modeled without real waiting. `MockProbes` answers each probe from a
//! per-probe queue, falling back to a steady value when the queue is empty,
//! and records every restart invocation.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use vigil_types::VigilError;

use crate::clock::Clock;
use crate::probes::SystemProbes;

/// Virtual clock for deterministic tick tests.
pub struct FakeClock {
    now: Cell<i64>,
}

impl FakeClock {
    pub fn new(start_epoch: i64) -> Self {
        Self {
            now: Cell::new(start_epoch),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get() + secs as i64);
    }
}

impl Clock for FakeClock {
    fn now_epoch(&self) -> i64 {
        self.now.get()
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur.as_secs());
    }
}

/// One scripted probe: queued one-shot answers over a steady fallback.
struct Script<T: Clone> {
    queue: RefCell<VecDeque<T>>,
    steady: Cell<T>,
}

impl<T: Clone + Copy> Script<T> {
    fn new(steady: T) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            steady: Cell::new(steady),
        }
    }

    fn next(&self) -> T {
        self.queue
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.steady.get())
    }
}

/// Scripted [`SystemProbes`] implementation.
pub struct MockProbes {
    liveness: Script<bool>,
    online: Script<bool>,
    tcp: Script<bool>,
    uptime: Script<Option<u64>>,
    http_queues: RefCell<HashMap<String, VecDeque<Option<u16>>>>,
    http_steady: RefCell<HashMap<String, Option<u16>>>,
    restarts: RefCell<Vec<String>>,
    restarts_fail: Cell<bool>,
    liveness_calls: Cell<u32>,
}

impl Default for MockProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProbes {
    /// Everything healthy: alive, online, HTTP 200, uptime advancing.
    pub fn new() -> Self {
        Self {
            liveness: Script::new(true),
            online: Script::new(true),
            tcp: Script::new(true),
            uptime: Script::new(Some(100_000)),
            http_queues: RefCell::new(HashMap::new()),
            http_steady: RefCell::new(HashMap::new()),
            restarts: RefCell::new(Vec::new()),
            restarts_fail: Cell::new(false),
            liveness_calls: Cell::new(0),
        }
    }

    pub fn set_liveness(&self, alive: bool) {
        self.liveness.steady.set(alive);
    }

    pub fn push_liveness(&self, alive: bool) {
        self.liveness.queue.borrow_mut().push_back(alive);
    }

    pub fn set_online(&self, online: bool) {
        self.online.steady.set(online);
    }

    pub fn set_tcp(&self, ok: bool) {
        self.tcp.steady.set(ok);
    }

    pub fn set_uptime(&self, uptime: Option<u64>) {
        self.uptime.steady.set(uptime);
    }

    /// Steady HTTP answer for `url`.
    pub fn set_http(&self, url: &str, status: Option<u16>) {
        self.http_steady.borrow_mut().insert(url.to_string(), status);
    }

    /// One-shot HTTP answer for `url`, consumed before the steady value.
    pub fn push_http(&self, url: &str, status: Option<u16>) {
        self.http_queues
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(status);
    }

    /// Labels passed to `service_restart`, in order.
    pub fn restart_labels(&self) -> Vec<String> {
        self.restarts.borrow().clone()
    }

    pub fn clear_restarts(&self) {
        self.restarts.borrow_mut().clear();
    }

    /// Make `service_restart` return an error (the invocation is still
    /// recorded).
    pub fn fail_restarts(&self) {
        self.restarts_fail.set(true);
    }

    pub fn liveness_calls(&self) -> u32 {
        self.liveness_calls.get()
    }
}

impl SystemProbes for MockProbes {
    fn ping(&self, _target: &str, _timeout_secs: u64) -> bool {
        self.online.next()
    }

    fn http_status(&self, url: &str, _timeout_secs: u64, _proxy: Option<&str>) -> Option<u16> {
        if let Some(queue) = self.http_queues.borrow_mut().get_mut(url) {
            if let Some(status) = queue.pop_front() {
                return status;
            }
        }
        self.http_steady
            .borrow()
            .get(url)
            .copied()
            .unwrap_or(Some(200))
    }

    fn process_alive(&self, _pattern: &str) -> bool {
        self.liveness_calls.set(self.liveness_calls.get() + 1);
        self.liveness.next()
    }

    fn tcp_connect(&self, _host: &str, _port: u16, _timeout_secs: u64) -> bool {
        self.tcp.next()
    }

    fn service_restart(&self, label: &str) -> Result<(), VigilError> {
        self.restarts.borrow_mut().push(label.to_string());
        if self.restarts_fail.get() {
            return Err(VigilError::ServiceError("scripted failure".into()));
        }
        Ok(())
    }

    fn uptime_seconds(&self) -> Option<u64> {
        self.uptime.next()
    }
}
