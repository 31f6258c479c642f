//! Integration tests for WireGuardManager
//!
//! Drives the manager end to end against a simulated host that keeps track
//! of which tunnels are up and answers `wg show` / `wg-quick` accordingly.

use libwgctl::{
    CommandExecutor, CommandOutcome, ManagerConfig, ProfileStatus, WireGuardManager,
};
use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const VALID_CONF: &str = "[Interface]\nPrivateKey = key\nAddress = 10.8.0.2/32\n\n[Peer]\nPublicKey = peer\nEndpoint = 198.51.100.7:51820\n";

/// Simulated `wg` / `wg-quick` host
#[derive(Default)]
struct SimulatedHost {
    up: Mutex<BTreeSet<String>>,
    history: Mutex<Vec<String>>,
    /// Profiles whose `wg-quick up` always fails
    broken: Vec<String>,
}

impl SimulatedHost {
    fn with_up(profiles: &[&str]) -> Self {
        let host = Self::default();
        host.up.lock().unwrap().extend(profiles.iter().map(|p| p.to_string()));
        host
    }

    fn up(&self) -> Vec<String> {
        self.up.lock().unwrap().iter().cloned().collect()
    }

    fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }

    fn show(&self) -> String {
        self.up
            .lock()
            .unwrap()
            .iter()
            .map(|name| {
                format!(
                    "interface: {}\n  public key: pub-{}\n  listening port: 51820\n\npeer: peer-{}\n  endpoint: 198.51.100.7:51820\n  latest handshake: 5 seconds ago\n  transfer: 1.00 KiB received, 2.00 KiB sent\n\n",
                    name, name, name
                )
            })
            .collect()
    }
}

impl CommandExecutor for SimulatedHost {
    fn run(&self, command: &[String], _timeout: Duration) -> CommandOutcome {
        self.history.lock().unwrap().push(command.join(" "));
        let parts: Vec<&str> = command.iter().map(String::as_str).collect();

        match parts.as_slice() {
            ["wg", "show"] => CommandOutcome::success(self.show()),
            ["wg-quick", "up", name] => {
                if self.broken.iter().any(|b| b == name) {
                    return CommandOutcome::failure(format!("RTNETLINK answers: File exists ({})", name));
                }
                let mut up = self.up.lock().unwrap();
                if !up.insert(name.to_string()) {
                    return CommandOutcome::failure(format!("wg-quick: `{}' already exists", name));
                }
                CommandOutcome::success(format!("[#] ip link add {} type wireguard\n", name))
            }
            ["wg-quick", "down", name] => {
                if self.up.lock().unwrap().remove(*name) {
                    CommandOutcome::success(format!("[#] ip link delete dev {}\n", name))
                } else {
                    CommandOutcome::failure(format!("wg-quick: `{}' is not a WireGuard interface", name))
                }
            }
            _ => CommandOutcome::failure("unexpected command"),
        }
    }
}

fn setup(host: SimulatedHost) -> (TempDir, Arc<SimulatedHost>, WireGuardManager) {
    let dir = TempDir::new().unwrap();
    for name in ["App", "bomBox", "usa"] {
        fs::write(dir.path().join(format!("{}.conf", name)), VALID_CONF).unwrap();
    }
    let config = ManagerConfig {
        config_dir: dir.path().to_path_buf(),
        max_attempts: 2,
        retry_delay_ms: 1,
        ..Default::default()
    };
    let host = Arc::new(host);
    let manager = WireGuardManager::with_executor(&config, host.clone());
    (dir, host, manager)
}

fn active_count(manager: &WireGuardManager) -> usize {
    manager
        .get_all_profiles_info()
        .iter()
        .filter(|info| info.status == ProfileStatus::Active)
        .count()
}

#[test]
fn test_switching_keeps_one_profile_active() {
    let (_dir, host, manager) = setup(SimulatedHost::default());

    for name in ["usa", "bomBox", "App", "usa"] {
        let result = manager.activate_profile(name);
        assert!(result.success, "activating {} failed: {}", name, result.message);
        assert_eq!(host.up(), vec![name.to_string()]);
        assert_eq!(manager.get_active_profile().as_deref(), Some(name));
        assert_eq!(active_count(&manager), 1);
    }
}

#[test]
fn test_activation_output_is_passed_through() {
    let (_dir, _host, manager) = setup(SimulatedHost::default());

    let result = manager.activate_profile("bomBox");
    assert!(result.success);
    assert_eq!(result.message, "[#] ip link add bomBox type wireguard\n");
    assert_eq!(manager.cached_active_profile().as_deref(), Some("bomBox"));
}

#[test]
fn test_already_active_profile_is_not_restarted() {
    let (_dir, host, manager) = setup(SimulatedHost::with_up(&["usa"]));

    let result = manager.activate_profile("usa");
    assert!(result.success);
    assert_eq!(result.message, "Profile usa is already active");
    assert_eq!(host.history(), vec!["wg show".to_string()]);
    assert_eq!(host.up(), vec!["usa".to_string()]);
}

#[test]
fn test_activation_takes_down_every_other_tunnel() {
    let (_dir, host, manager) = setup(SimulatedHost::with_up(&["App", "bomBox"]));

    assert!(manager.activate_profile("usa").success);
    assert_eq!(host.up(), vec!["usa".to_string()]);

    let history = host.history();
    let up_at = history.iter().position(|c| c == "wg-quick up usa").unwrap();
    for other in ["wg-quick down App", "wg-quick down bomBox"] {
        let down_at = history.iter().position(|c| c == other).unwrap();
        assert!(down_at < up_at, "{} should run before bringing usa up", other);
    }
}

#[test]
fn test_failed_activation_reports_tool_error() {
    let host = SimulatedHost {
        broken: vec!["usa".to_string()],
        ..SimulatedHost::with_up(&["App"])
    };
    let (_dir, host, manager) = setup(host);

    let result = manager.activate_profile("usa");
    assert!(!result.success);
    assert!(result.message.contains("RTNETLINK answers"));
    // Previous tunnel was already taken down and nothing replaced it
    assert!(host.up().is_empty());
    assert_eq!(manager.get_active_profile(), None);
    // Retried up to the configured budget
    let attempts = host.history().iter().filter(|c| *c == "wg-quick up usa").count();
    assert_eq!(attempts, 2);
}

#[test]
fn test_turn_off_all_from_active_state() {
    let (_dir, host, manager) = setup(SimulatedHost::with_up(&["bomBox"]));

    let result = manager.turn_off_all();
    // App and usa were not up, so their `wg-quick down` fails
    assert!(!result.success);
    assert!(result.message.starts_with("Failed to turn off: "));
    assert!(result.message.contains("App: "));
    assert!(result.message.contains("usa: "));
    assert!(!result.message.contains("bomBox: "));
    assert!(host.up().is_empty());
    assert_eq!(active_count(&manager), 0);
}

#[test]
fn test_turn_off_all_visits_profiles_in_order() {
    let (_dir, host, manager) = setup(SimulatedHost::with_up(&["App", "bomBox", "usa"]));

    let result = manager.turn_off_all();
    assert!(result.success);
    assert_eq!(result.message, "All profiles turned off");
    assert_eq!(
        host.history(),
        vec!["wg-quick down App", "wg-quick down bomBox", "wg-quick down usa"]
    );
    assert_eq!(manager.cached_active_profile(), None);
}

#[test]
fn test_unknown_profile_never_reaches_the_tool() {
    let (_dir, host, manager) = setup(SimulatedHost::default());

    let result = manager.activate_profile("ghost");
    assert!(!result.success);
    assert_eq!(result.message, "Profile ghost does not exist");
    assert!(host.history().is_empty());
}

#[test]
fn test_profile_details_for_active_profile() {
    let (_dir, _host, manager) = setup(SimulatedHost::with_up(&["usa"]));

    let infos = manager.get_all_profiles_info();
    let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["App", "bomBox", "usa"]);

    let usa = &infos[2];
    assert_eq!(usa.status, ProfileStatus::Active);
    assert_eq!(usa.interface_name, "usa");
    assert_eq!(usa.public_key, "pub-usa");
    assert_eq!(usa.endpoint, "198.51.100.7:51820");
    assert_eq!(usa.transfer_rx, 1024);
    assert_eq!(usa.transfer_tx, 2048);

    assert_eq!(infos[0].status, ProfileStatus::Inactive);
    assert_eq!(infos[0].transfer_rx, 0);
}

#[test]
fn test_concurrent_activations_stay_exclusive() {
    let (_dir, host, manager) = setup(SimulatedHost::default());
    let manager = Arc::new(manager);

    let handles: Vec<_> = ["App", "bomBox", "usa", "App", "usa"]
        .into_iter()
        .map(|name| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.activate_profile(name))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().success);
    }

    assert_eq!(host.up().len(), 1);
    assert_eq!(active_count(&manager), 1);
}
