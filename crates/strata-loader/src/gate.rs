//! Startup gate.
//!
//! A one-shot barrier the embedding application signals once its own
//! startup has finished. The index builder waits on it before running its
//! first job so the build burst does not compete with startup I/O. The
//! gate is decoupled from any notification mechanism; whoever owns the
//! process lifecycle calls [`StartupGate::signal`].

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::ResolveError;

/// Default bounded wait before the index builder proceeds unsignaled.
pub const DEFAULT_STARTUP_WAIT: Duration = Duration::from_secs(120);

/// One-shot signal with bounded waiting.
pub struct StartupGate {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl StartupGate {
    pub fn new() -> StartupGate {
        StartupGate {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Open the gate. Idempotent; wakes every waiter.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            *signaled = true;
            self.cond.notify_all();
        }
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Wait up to `timeout` for the gate to open.
    ///
    /// Returns whether the gate is open. A `false` return is not fatal by
    /// itself; the index builder degrades to building immediately.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }

    /// Wait up to `timeout`, escalating a timeout to the fatal
    /// configuration error: the surrounding system never became ready.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), ResolveError> {
        if self.wait(timeout) {
            Ok(())
        } else {
            Err(ResolveError::StartupTimeout(timeout))
        }
    }
}

impl Default for StartupGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_signal_before_wait() {
        let gate = StartupGate::new();
        gate.signal();
        assert!(gate.wait(Duration::from_millis(1)));
        assert!(gate.wait_ready(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_wait_times_out() {
        let gate = StartupGate::new();
        assert!(!gate.wait(Duration::from_millis(20)));
        assert!(matches!(
            gate.wait_ready(Duration::from_millis(20)),
            Err(ResolveError::StartupTimeout(_))
        ));
    }

    #[test]
    fn test_signal_releases_waiter() {
        let gate = Arc::new(StartupGate::new());
        let waiter = {
            let gate = gate.clone();
            std::thread::spawn(move || gate.wait(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(10));
        gate.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_signal_idempotent() {
        let gate = StartupGate::new();
        gate.signal();
        gate.signal();
        assert!(gate.is_signaled());
    }
}
