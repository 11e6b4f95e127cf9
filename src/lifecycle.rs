// Startup lifecycle state machine

use std::sync::Mutex;
use tracing::{info, warn};

/// Startup phase of the application. Phases advance strictly forward;
/// `Failed` is terminal for the attempt and carries the message shown
/// to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecyclePhase {
    Idle,
    RuntimeLoading,
    RuntimeReady,
    ModelsLoading,
    ModelsReady,
    CameraReady,
    Failed(String),
}

impl LifecyclePhase {
    fn rank(&self) -> Option<u8> {
        match self {
            LifecyclePhase::Idle => Some(0),
            LifecyclePhase::RuntimeLoading => Some(1),
            LifecyclePhase::RuntimeReady => Some(2),
            LifecyclePhase::ModelsLoading => Some(3),
            LifecyclePhase::ModelsReady => Some(4),
            LifecyclePhase::CameraReady => Some(5),
            LifecyclePhase::Failed(_) => None,
        }
    }

    /// True while the runtime or models are still being prepared
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::Idle
                | LifecyclePhase::RuntimeLoading
                | LifecyclePhase::RuntimeReady
                | LifecyclePhase::ModelsLoading
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LifecyclePhase::Failed(_))
    }

    /// The failure message when the attempt has failed
    pub fn error_message(&self) -> Option<&str> {
        match self {
            LifecyclePhase::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Shared lifecycle state. Downstream stages consult the current phase
/// before starting; a failed attempt never resumes.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Mutex<LifecyclePhase>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(LifecyclePhase::Idle),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase.lock().unwrap().clone()
    }

    /// Advances to a strictly later phase. Returns false (and leaves the
    /// phase untouched) for backward, repeated, or post-failure
    /// transitions.
    pub fn advance(&self, next: LifecyclePhase) -> bool {
        let mut phase = self.phase.lock().unwrap();

        let (Some(current_rank), Some(next_rank)) = (phase.rank(), next.rank()) else {
            warn!("Ignoring transition {:?} -> {:?}", *phase, next);
            return false;
        };

        if next_rank <= current_rank {
            warn!("Ignoring backward transition {:?} -> {:?}", *phase, next);
            return false;
        }

        info!("Lifecycle {:?} -> {:?}", *phase, next);
        *phase = next;
        true
    }

    /// Marks the attempt as failed. The first failure wins; later failures
    /// are logged and dropped.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let mut phase = self.phase.lock().unwrap();
        if phase.is_failed() {
            warn!("Already failed; dropping later failure");
            return false;
        }
        let message = message.into();
        info!("Lifecycle {:?} -> Failed({})", *phase, message);
        *phase = LifecyclePhase::Failed(message);
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
