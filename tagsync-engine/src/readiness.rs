//! Monitoring readiness gate.
//!
//! Continuous capture may only run while both the store and the protocol
//! endpoint are connected. A background task polls the two flags and starts
//! or stops capture on each edge.

use crate::capture::CaptureControl;
use crate::error::{EngineError, EngineResult};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Connection flags shared between the service and the gate.
#[derive(Debug, Default)]
pub struct ReadinessState {
    storage: AtomicBool,
    protocol: AtomicBool,
}

/// Point-in-time copy of [`ReadinessState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessSnapshot {
    pub storage_connected: bool,
    pub protocol_connected: bool,
    pub may_monitor: bool,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_storage_connected(&self, connected: bool) {
        if self.storage.swap(connected, Ordering::SeqCst) != connected {
            info!("Storage connection: {}", connected);
        }
    }

    pub fn set_protocol_connected(&self, connected: bool) {
        if self.protocol.swap(connected, Ordering::SeqCst) != connected {
            info!("Protocol connection: {}", connected);
        }
    }

    pub fn storage_connected(&self) -> bool {
        self.storage.load(Ordering::SeqCst)
    }

    pub fn protocol_connected(&self) -> bool {
        self.protocol.load(Ordering::SeqCst)
    }

    pub fn may_monitor(&self) -> bool {
        self.storage_connected() && self.protocol_connected()
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        let storage_connected = self.storage_connected();
        let protocol_connected = self.protocol_connected();
        ReadinessSnapshot {
            storage_connected,
            protocol_connected,
            may_monitor: storage_connected && protocol_connected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Idle,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Start,
    Stop,
}

/// Edge detector over successive readiness observations.
#[derive(Debug, Default)]
pub struct GateMachine {
    state: GateState,
}

impl GateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Feeds one observation; returns the transition it causes, if any.
    pub fn observe(&mut self, may_monitor: bool) -> Option<GateTransition> {
        match (self.state, may_monitor) {
            (GateState::Idle, true) => {
                self.state = GateState::Monitoring;
                Some(GateTransition::Start)
            }
            (GateState::Monitoring, false) => {
                self.state = GateState::Idle;
                Some(GateTransition::Stop)
            }
            _ => None,
        }
    }
}

/// Spawns the polling loop.
pub struct ReadinessGate;

impl ReadinessGate {
    pub fn spawn(
        readiness: Arc<ReadinessState>,
        capture: Arc<dyn CaptureControl>,
        interval: Duration,
    ) -> GateHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitoring = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&monitoring);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut machine = GateMachine::new();
            info!("Readiness gate started ({:?} interval)", interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(transition) = machine.observe(readiness.may_monitor()) {
                            flag.store(machine.state() == GateState::Monitoring, Ordering::SeqCst);
                            dispatch(transition, Arc::clone(&capture));
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Readiness gate stopped");
        });

        GateHandle {
            shutdown_tx,
            monitoring,
            task,
        }
    }
}

fn dispatch(transition: GateTransition, capture: Arc<dyn CaptureControl>) {
    debug!("Readiness gate transition: {:?}", transition);
    tokio::spawn(async move {
        let result = match transition {
            GateTransition::Start => capture.start_continuous_capture().await,
            GateTransition::Stop => capture.stop_continuous_capture().await,
        };
        if let Err(e) = result {
            warn!("Capture {:?} failed: {}", transition, e);
        }
    });
}

/// Handle to a running gate. Dropping it also stops the loop.
pub struct GateHandle {
    shutdown_tx: watch::Sender<bool>,
    monitoring: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl GateHandle {
    /// Whether the gate last started capture without stopping it since.
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Signals the loop and waits for it to exit. Capture calls already
    /// dispatched keep running.
    pub async fn shutdown(self) -> EngineResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| EngineError::Task(e.to_string()))
    }
}
