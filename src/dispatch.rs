//! Background operation dispatcher for front ends
//!
//! Manager operations block for seconds at a time, so an interactive front
//! end runs them on Tokio's blocking pool. At most one operation of each
//! kind is in flight: a second request of the same kind while one is running
//! is coalesced (dropped), so repeated clicks do not queue up `wg-quick`
//! invocations. Results come back on a channel. Operations cannot be
//! cancelled once submitted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{WgctlError, WgctlResult};
use crate::manager::WireGuardManager;
use crate::profile::{OperationResult, ProfileInfo, Readiness};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Refresh,
    Activate(String),
    TurnOffAll,
    CheckSystem,
}

/// Coalescing key: activation and turning everything off share one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Refresh,
    Switch,
    Check,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Refresh => OperationKind::Refresh,
            Self::Activate(_) | Self::TurnOffAll => OperationKind::Switch,
            Self::CheckSystem => OperationKind::Check,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Refreshed(Vec<ProfileInfo>),
    Activated { profile: String, result: OperationResult },
    TurnedOff(OperationResult),
    SystemChecked(Readiness),
}

pub struct Dispatcher {
    manager: Arc<WireGuardManager>,
    runtime: Handle,
    in_flight: Arc<Mutex<HashSet<OperationKind>>>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Dispatcher {
    /// Create a dispatcher bound to the current Tokio runtime, along with the
    /// receiving end of its completion channel
    pub fn new(manager: Arc<WireGuardManager>) -> WgctlResult<(Self, mpsc::UnboundedReceiver<Completion>)> {
        let runtime = Handle::try_current()
            .map_err(|e| WgctlError::Runtime(format!("Dispatcher needs a Tokio runtime: {}", e)))?;
        let (tx, rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                manager,
                runtime,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                completions: tx,
            },
            rx,
        ))
    }

    pub fn is_busy(&self, kind: OperationKind) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&kind)
    }

    /// Start `operation` in the background. Returns false when an operation
    /// of the same kind is already running and this one was coalesced.
    pub fn submit(&self, operation: Operation) -> bool {
        let kind = operation.kind();
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !in_flight.insert(kind) {
                debug!("Coalescing {:?}: {:?} already in flight", operation, kind);
                return false;
            }
        }

        let manager = self.manager.clone();
        let in_flight = self.in_flight.clone();
        let completions = self.completions.clone();

        self.runtime.spawn_blocking(move || {
            let completion = match operation {
                Operation::Refresh => Completion::Refreshed(manager.get_all_profiles_info()),
                Operation::Activate(profile) => {
                    let result = manager.activate_profile(&profile);
                    Completion::Activated { profile, result }
                }
                Operation::TurnOffAll => Completion::TurnedOff(manager.turn_off_all()),
                Operation::CheckSystem => Completion::SystemChecked(manager.check_system_ready()),
            };

            in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&kind);

            if completions.send(completion).is_err() {
                debug!("Completion receiver dropped, discarding {:?} result", kind);
            }
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::profile::ProfileStatus;
    use crate::runner::{CommandOutcome, MockCommandExecutor};
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, mock: MockCommandExecutor) -> Arc<WireGuardManager> {
        let config = ManagerConfig {
            config_dir: dir.path().to_path_buf(),
            retry_delay_ms: 1,
            ..Default::default()
        };
        Arc::new(WireGuardManager::with_executor(&config, Arc::new(mock)))
    }

    #[test]
    fn test_requires_runtime() {
        let dir = TempDir::new().unwrap();
        let result = Dispatcher::new(manager(&dir, MockCommandExecutor::new()));
        assert!(matches!(result, Err(WgctlError::Runtime(_))));
    }

    #[test]
    fn test_operation_kinds() {
        assert_eq!(Operation::Activate("usa".into()).kind(), OperationKind::Switch);
        assert_eq!(Operation::TurnOffAll.kind(), OperationKind::Switch);
        assert_eq!(Operation::Refresh.kind(), OperationKind::Refresh);
        assert_eq!(Operation::CheckSystem.kind(), OperationKind::Check);
    }

    #[tokio::test]
    async fn test_refresh_completes() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCommandExecutor::new();
        mock.expect_run()
            .returning(|_, _| CommandOutcome::success("interface: usa\n"));
        let (dispatcher, mut rx) = Dispatcher::new(manager(&dir, mock)).unwrap();

        assert!(dispatcher.submit(Operation::Refresh));
        match rx.recv().await {
            Some(Completion::Refreshed(infos)) => {
                assert_eq!(infos.len(), 3);
                assert_eq!(infos[2].status, ProfileStatus::Active);
            }
            other => panic!("unexpected completion: {:?}", other),
        }
        assert!(!dispatcher.is_busy(OperationKind::Refresh));
    }

    #[tokio::test]
    async fn test_same_kind_is_coalesced() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().returning(|_, _| {
            std::thread::sleep(Duration::from_millis(200));
            CommandOutcome::success("")
        });
        let (dispatcher, mut rx) = Dispatcher::new(manager(&dir, mock)).unwrap();

        assert!(dispatcher.submit(Operation::Activate("usa".to_string())));
        assert!(!dispatcher.submit(Operation::TurnOffAll));
        assert!(dispatcher.is_busy(OperationKind::Switch));

        match rx.recv().await {
            Some(Completion::Activated { profile, result }) => {
                assert_eq!(profile, "usa");
                assert!(result.success);
            }
            other => panic!("unexpected completion: {:?}", other),
        }

        // Slot is free again once the first switch has completed
        assert!(dispatcher.submit(Operation::TurnOffAll));
        assert!(matches!(rx.recv().await, Some(Completion::TurnedOff(_))));
    }
}
