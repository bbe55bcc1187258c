//! Server lifecycle state and request draining.
//!
//! The state only moves forward: a late `mark_ready` after shutdown began
//! cannot reopen readiness. Draining is event driven; the last finishing
//! request wakes the waiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;

/// Lifecycle of the process, in the order it is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthState {
    /// Resources resolving or listener not yet serving.
    Starting,
    Ready,
    /// Shutdown requested; finishing in-flight requests.
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Tracks lifecycle state and in-flight requests for the network module.
#[derive(Debug)]
pub struct ShutdownController {
    state: ArcSwap<HealthState>,
    in_flight: Arc<InFlight>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(HealthState::Starting),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }

    /// Moves to `to` if it lies ahead of the current state. Returns whether
    /// the state changed.
    fn advance(&self, to: HealthState) -> bool {
        let previous = self.state.rcu(|current| {
            if **current < to {
                Arc::new(to)
            } else {
                Arc::clone(current)
            }
        });
        *previous < to
    }

    /// `Starting` -> `Ready`. No effect once draining has begun.
    pub fn mark_ready(&self) -> bool {
        self.advance(HealthState::Ready)
    }

    /// Enters `Draining`; readiness probes fail from here on.
    pub fn begin_draining(&self) -> bool {
        self.advance(HealthState::Draining)
    }

    /// Counts one request as in flight until the guard is dropped.
    #[must_use]
    pub fn track_request(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for in-flight requests to finish, then reports
    /// `Stopped`. Returns `false` and stays `Draining` on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.in_flight.idle.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        let drained = tokio::time::timeout(timeout, idle).await.is_ok();
        if drained {
            self.advance(HealthState::Stopped);
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its request slot on drop and wakes the drain waiter when it was
/// the last one.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
