//! Parser for the human-readable `wg show` status dump
//!
//! The textual format of `wg show` is the most fragile dependency of the
//! crate, so everything here is a pure function over the raw output:
//!
//! ```text
//! interface: wg-usa
//!   public key: 3Hb...=
//!   private key: (hidden)
//!   listening port: 51820
//!
//! peer: Xk9...=
//!   endpoint: 203.0.113.7:51820
//!   allowed ips: 0.0.0.0/0
//!   latest handshake: 1 minute, 2 seconds ago
//!   transfer: 1.23 MiB received, 456.78 KiB sent
//! ```
//!
//! Malformed numbers never fail a parse; they degrade to zero.

use serde::Serialize;

const INTERFACE_MARKER: &str = "interface:";
const TRANSFER_MARKER: &str = "transfer:";

/// Unit suffixes, longest first so `kib` wins over `b`
const UNITS: &[(&str, f64)] = &[
    ("kib", 1024.0),
    ("mib", 1024.0 * 1024.0),
    ("gib", 1024.0 * 1024.0 * 1024.0),
    ("tib", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("kb", 1_000.0),
    ("mb", 1_000_000.0),
    ("gb", 1_000_000_000.0),
    ("tb", 1_000_000_000_000.0),
    ("b", 1.0),
];

/// Byte counters reported on a `transfer:` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferCounters {
    pub rx: u64,
    pub tx: u64,
}

impl TransferCounters {
    fn add(&mut self, other: TransferCounters) {
        self.rx = self.rx.saturating_add(other.rx);
        self.tx = self.tx.saturating_add(other.tx);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub public_key: String,
    pub endpoint: Option<String>,
    pub allowed_ips: Option<String>,
    pub latest_handshake: Option<String>,
    pub transfer: Option<TransferCounters>,
}

/// One `interface:` block of the status dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStatus {
    pub name: String,
    pub public_key: Option<String>,
    pub listening_port: Option<u16>,
    pub peers: Vec<PeerStatus>,
}

impl InterfaceStatus {
    /// Counters summed over every peer of the interface
    pub fn transfer(&self) -> TransferCounters {
        let mut total = TransferCounters::default();
        for counters in self.peers.iter().filter_map(|p| p.transfer) {
            total.add(counters);
        }
        total
    }
}

/// Text after the first colon of `line`, trimmed
fn value_after_colon(line: &str) -> &str {
    line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or("")
}

/// Configured profile whose name occurs (case-insensitively) in `interface`
fn match_profile<'a, S: AsRef<str>>(interface: &str, profiles: &'a [S]) -> Option<&'a str> {
    let interface = interface.to_lowercase();
    profiles
        .iter()
        .map(|p| p.as_ref())
        .find(|profile| interface.contains(&profile.to_lowercase()))
}

/// First configured profile matched by an interface line, if any.
///
/// The interface name only has to contain the profile name, so `wg-bombox`
/// resolves to profile `bomBox`.
pub fn parse_active_interface<S: AsRef<str>>(raw: &str, profiles: &[S]) -> Option<String> {
    raw.lines()
        .filter(|line| line.to_lowercase().contains(INTERFACE_MARKER))
        .find_map(|line| match_profile(value_after_colon(line), profiles))
        .map(str::to_string)
}

/// Every configured profile matched by any interface line, in output order
pub fn parse_active_profiles<S: AsRef<str>>(raw: &str, profiles: &[S]) -> Vec<String> {
    let mut active: Vec<String> = Vec::new();
    for line in raw.lines().filter(|l| l.to_lowercase().contains(INTERFACE_MARKER)) {
        if let Some(profile) = match_profile(value_after_colon(line), profiles) {
            if !active.iter().any(|p| p == profile) {
                active.push(profile.to_string());
            }
        }
    }
    active
}

/// Counters from the first `transfer:` line of `raw`
pub fn parse_transfer_counters(raw: &str) -> TransferCounters {
    raw.lines()
        .find(|line| line.to_lowercase().contains(TRANSFER_MARKER))
        .map(parse_transfer_line)
        .unwrap_or_default()
}

/// Parse `transfer: 1.23 MiB received, 456.78 KiB sent`
fn parse_transfer_line(line: &str) -> TransferCounters {
    let rest = value_after_colon(line);
    let (received, sent) = match rest.split_once(',') {
        Some((received, sent)) => (received, sent),
        None => (rest, ""),
    };

    TransferCounters {
        rx: parse_byte_size(&leading_size_token(received)),
        tx: parse_byte_size(&leading_size_token(sent)),
    }
}

/// Leading `<number> [unit]` of a transfer fragment such as `1.23 MiB received`
fn leading_size_token(part: &str) -> String {
    let mut words = part.split_whitespace();
    let Some(number) = words.next() else {
        return String::new();
    };

    match words.next() {
        Some(unit) if is_unit(unit) => format!("{} {}", number, unit),
        _ => number.to_string(),
    }
}

fn is_unit(word: &str) -> bool {
    let word = word.to_lowercase();
    UNITS.iter().any(|(suffix, _)| word == *suffix)
}

/// Convert a human-readable size (`1.5 KiB`, `2 MB`, `123`) to bytes.
///
/// Binary suffixes (`KiB`, `MiB`, `GiB`, `TiB`) are powers of 1024, decimal
/// ones (`KB`, `MB`, `GB`, `TB`) powers of 1000. The product is truncated
/// toward zero. Anything unparseable yields 0.
pub fn parse_byte_size(token: &str) -> u64 {
    let lower = token.trim().to_lowercase();
    if lower.is_empty() {
        return 0;
    }

    let (number, factor) = UNITS
        .iter()
        .find_map(|(suffix, factor)| lower.strip_suffix(suffix).map(|n| (n.trim(), *factor)))
        .unwrap_or((lower.as_str(), 1.0));

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * factor) as u64,
        _ => 0,
    }
}

/// Split a full status dump into interface blocks
pub fn parse_status(raw: &str) -> Vec<InterfaceStatus> {
    let mut interfaces: Vec<InterfaceStatus> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        let Some((key, _)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value_after_colon(trimmed);

        if key == "interface" {
            interfaces.push(InterfaceStatus {
                name: value.to_string(),
                ..Default::default()
            });
            continue;
        }

        let Some(interface) = interfaces.last_mut() else {
            continue;
        };

        match key.as_str() {
            "peer" => interface.peers.push(PeerStatus {
                public_key: value.to_string(),
                ..Default::default()
            }),
            "public key" => interface.public_key = Some(value.to_string()),
            "listening port" => interface.listening_port = value.parse().ok(),
            _ => {
                let Some(peer) = interface.peers.last_mut() else {
                    continue;
                };
                match key.as_str() {
                    "endpoint" => peer.endpoint = Some(value.to_string()),
                    "allowed ips" => peer.allowed_ips = Some(value.to_string()),
                    "latest handshake" => peer.latest_handshake = Some(value.to_string()),
                    "transfer" => peer.transfer = Some(parse_transfer_line(trimmed)),
                    _ => {}
                }
            }
        }
    }

    interfaces
}
