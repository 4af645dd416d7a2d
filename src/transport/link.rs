//! # Device Link State Machine
//!
//! Pure transition table for the printer link. [`LinkMachine::handle`] takes
//! one [`LinkEvent`] and returns the [`LinkAction`]s to perform; it never
//! touches a radio or a clock, so every transition is testable on its own.
//!
//! ## States
//!
//! ```text
//!            power on            discovered /            connected
//!   Idle ──────────────► Scanning ─────────────► Connecting ─────────► Discovering
//!    ▲                    ▲    ▲   system-connected  │   │                  │
//!    │ power off          │    │                     │   │ failed           │ characteristic
//!    │ (from any state)   │    └───── timeout ───────┘   ▼                  ▼
//!    │                    │                        Disconnected ◄──────── Ready
//!    │                    └────── retry elapsed ───────┘          drop
//! ```
//!
//! | Event | From | To | Actions |
//! |-------|------|----|---------|
//! | `RadioPoweredOn` | Idle | Scanning | StartScan |
//! | `Discovered` / `SystemConnected` | Scanning | Connecting | StopScan, StartConnectTimer, Connect |
//! | `ConnectTimedOut(n)` | Connecting (attempt n) | Scanning | CancelConnect, StartScan |
//! | `ConnectFailed` | Connecting | Disconnected | CancelConnectTimer, ScheduleRescan(retry delay) |
//! | `Connected` | Connecting | Discovering | CancelConnectTimer, DiscoverCharacteristic |
//! | `CharacteristicFound` | Discovering | Ready | |
//! | `Disconnected` | Connecting..Ready | Disconnected | ScheduleRescan(0) |
//! | `RetryElapsed(n)` | Disconnected (attempt n) | Scanning | StartScan |
//! | `RadioPoweredOff` | any | Idle | CancelConnectTimer |
//!
//! Timer events carry the attempt number they were started for, so a timer
//! left over from an earlier attempt is ignored. A `Connected` for a device
//! that is not the current target is torn down with `CancelConnect`; a
//! repeated `Connected` for the target once past `Connecting` is ignored.

use std::time::Duration;

use serde::Serialize;

use super::radio::{DeviceId, Peripheral, WriteCharacteristic};

/// Link connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Ready,
    Disconnected,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    RadioPoweredOn,
    RadioPoweredOff,
    /// Advertising target seen while scanning
    Discovered(Peripheral),
    /// Target already connected at the system level
    SystemConnected(Peripheral),
    Connected(DeviceId),
    ConnectFailed { device: DeviceId, reason: String },
    ConnectTimedOut { attempt: u64 },
    CharacteristicFound(WriteCharacteristic),
    DiscoveryFailed { device: DeviceId, reason: String },
    Disconnected { device: DeviceId, reason: Option<String> },
    RetryElapsed { attempt: u64 },
    RescanRequested,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    StartScan,
    StopScan,
    Connect(Peripheral),
    CancelConnect(DeviceId),
    StartConnectTimer { attempt: u64, after: Duration },
    CancelConnectTimer,
    DiscoverCharacteristic(DeviceId),
    ScheduleRescan { attempt: u64, after: Duration },
}

/// Timing policy of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    /// Bound on one connect attempt
    pub connect_timeout: Duration,
    /// Pause after an explicit connect failure
    pub retry_delay: Duration,
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Read-only view published to the rest of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub device: Option<Peripheral>,
    pub characteristic: Option<WriteCharacteristic>,
}

impl LinkSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready && self.characteristic.is_some()
    }
}

/// The transition table.
#[derive(Debug, Clone, Default)]
pub struct LinkMachine {
    state: LinkState,
    timings: LinkTimings,
    target: Option<Peripheral>,
    characteristic: Option<WriteCharacteristic>,
    attempt: u64,
}

impl LinkMachine {
    pub fn new(timings: LinkTimings) -> Self {
        Self {
            timings,
            ..Self::default()
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            state: self.state,
            device: self.target.clone(),
            characteristic: self.characteristic.clone(),
        }
    }

    fn is_target(&self, device: &DeviceId) -> bool {
        self.target.as_ref().is_some_and(|p| &p.id == device)
    }

    fn clear(&mut self) {
        self.target = None;
        self.characteristic = None;
    }

    fn begin_connect(&mut self, peripheral: Peripheral) -> Vec<LinkAction> {
        self.attempt += 1;
        self.state = LinkState::Connecting;
        self.target = Some(peripheral.clone());
        vec![
            LinkAction::StopScan,
            LinkAction::StartConnectTimer {
                attempt: self.attempt,
                after: self.timings.connect_timeout,
            },
            LinkAction::Connect(peripheral),
        ]
    }

    fn start_scanning(&mut self) -> Vec<LinkAction> {
        self.clear();
        self.state = LinkState::Scanning;
        vec![LinkAction::StartScan]
    }

    fn lose_link(&mut self, after: Duration) -> Vec<LinkAction> {
        let was_connecting = self.state == LinkState::Connecting;
        self.clear();
        self.state = LinkState::Disconnected;
        let mut actions = Vec::new();
        if was_connecting {
            actions.push(LinkAction::CancelConnectTimer);
        }
        actions.push(LinkAction::ScheduleRescan {
            attempt: self.attempt,
            after,
        });
        actions
    }

    /// Apply one event.
    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkAction> {
        use LinkState::*;

        match (self.state, event) {
            (_, LinkEvent::RadioPoweredOff) => {
                let pending = matches!(self.state, Connecting);
                self.clear();
                self.attempt += 1;
                self.state = Idle;
                if pending {
                    vec![LinkAction::CancelConnectTimer]
                } else {
                    Vec::new()
                }
            }

            (Idle, LinkEvent::RadioPoweredOn) => self.start_scanning(),

            (Scanning, LinkEvent::Discovered(p)) | (Scanning, LinkEvent::SystemConnected(p)) => {
                self.begin_connect(p)
            }

            (Connecting, LinkEvent::ConnectTimedOut { attempt }) if attempt == self.attempt => {
                let mut actions = Vec::new();
                if let Some(p) = self.target.take() {
                    actions.push(LinkAction::CancelConnect(p.id));
                }
                actions.extend(self.start_scanning());
                actions
            }

            (Connecting, LinkEvent::ConnectFailed { device, .. }) if self.is_target(&device) => {
                self.lose_link(self.timings.retry_delay)
            }

            (Connecting, LinkEvent::Connected(device)) if self.is_target(&device) => {
                self.state = Discovering;
                vec![
                    LinkAction::CancelConnectTimer,
                    LinkAction::DiscoverCharacteristic(device),
                ]
            }

            // late completion of an abandoned attempt
            (_, LinkEvent::Connected(device)) if !self.is_target(&device) => {
                vec![LinkAction::CancelConnect(device)]
            }

            (Discovering, LinkEvent::CharacteristicFound(c)) if self.is_target(&c.device) => {
                self.state = Ready;
                self.characteristic = Some(c);
                Vec::new()
            }

            (Discovering, LinkEvent::DiscoveryFailed { device, .. }) if self.is_target(&device) => {
                let mut actions = vec![LinkAction::CancelConnect(device)];
                actions.extend(self.lose_link(self.timings.retry_delay));
                actions
            }

            (Connecting | Discovering | Ready, LinkEvent::Disconnected { device, .. })
                if self.is_target(&device) =>
            {
                self.lose_link(Duration::ZERO)
            }

            (Disconnected, LinkEvent::RetryElapsed { attempt }) if attempt == self.attempt => {
                self.start_scanning()
            }

            (Scanning, LinkEvent::RescanRequested) => {
                vec![LinkAction::StopScan, LinkAction::StartScan]
            }
            (Disconnected, LinkEvent::RescanRequested) => {
                // supersede the pending retry timer
                self.attempt += 1;
                self.start_scanning()
            }

            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn printer() -> Peripheral {
        Peripheral::new("AA:BB:CC:DD:EE:FF", Some("T02".to_string()))
    }

    fn characteristic() -> WriteCharacteristic {
        WriteCharacteristic {
            device: printer().id,
            uuid: "FF02".to_string(),
            max_write_size: 182,
        }
    }

    fn ready_machine() -> LinkMachine {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));
        m.handle(LinkEvent::Connected(printer().id));
        m.handle(LinkEvent::CharacteristicFound(characteristic()));
        m
    }

    #[test]
    fn test_happy_path() {
        let mut m = LinkMachine::new(LinkTimings::default());
        assert_eq!(m.state(), LinkState::Idle);

        assert_eq!(m.handle(LinkEvent::RadioPoweredOn), vec![LinkAction::StartScan]);
        assert_eq!(m.state(), LinkState::Scanning);

        let actions = m.handle(LinkEvent::Discovered(printer()));
        assert_eq!(
            actions,
            vec![
                LinkAction::StopScan,
                LinkAction::StartConnectTimer {
                    attempt: 1,
                    after: Duration::from_secs(10)
                },
                LinkAction::Connect(printer()),
            ]
        );
        assert_eq!(m.state(), LinkState::Connecting);
        assert!(!m.snapshot().is_ready());

        let actions = m.handle(LinkEvent::Connected(printer().id));
        assert_eq!(
            actions,
            vec![
                LinkAction::CancelConnectTimer,
                LinkAction::DiscoverCharacteristic(printer().id)
            ]
        );
        assert_eq!(m.state(), LinkState::Discovering);
        assert_eq!(m.snapshot().characteristic, None);

        assert!(m.handle(LinkEvent::CharacteristicFound(characteristic())).is_empty());
        assert_eq!(m.state(), LinkState::Ready);
        assert!(m.snapshot().is_ready());
        assert_eq!(m.snapshot().characteristic.map(|c| c.max_write_size), Some(182));
    }

    #[test]
    fn test_system_connected_skips_scan() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        let actions = m.handle(LinkEvent::SystemConnected(printer()));
        assert!(actions.contains(&LinkAction::Connect(printer())));
        assert_eq!(m.state(), LinkState::Connecting);
    }

    #[test]
    fn test_connect_timeout_cancels_and_rescans() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));

        let actions = m.handle(LinkEvent::ConnectTimedOut { attempt: 1 });
        assert_eq!(
            actions,
            vec![LinkAction::CancelConnect(printer().id), LinkAction::StartScan]
        );
        assert_eq!(m.state(), LinkState::Scanning);
        assert_eq!(m.snapshot().device, None);
    }

    #[test]
    fn test_stale_timer_ignored() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));
        m.handle(LinkEvent::ConnectTimedOut { attempt: 1 });
        m.handle(LinkEvent::Discovered(printer()));
        assert_eq!(m.attempt(), 2);

        assert!(m.handle(LinkEvent::ConnectTimedOut { attempt: 1 }).is_empty());
        assert_eq!(m.state(), LinkState::Connecting);
    }

    #[test]
    fn test_stale_connected_is_torn_down() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));
        m.handle(LinkEvent::ConnectTimedOut { attempt: 1 });

        let late = m.handle(LinkEvent::Connected(printer().id));
        assert_eq!(late, vec![LinkAction::CancelConnect(printer().id)]);
        assert_eq!(m.state(), LinkState::Scanning);
    }

    #[test]
    fn test_repeated_connected_keeps_live_link() {
        let mut m = ready_machine();
        assert!(m.handle(LinkEvent::Connected(printer().id)).is_empty());
        assert_eq!(m.state(), LinkState::Ready);
        assert!(m.snapshot().is_ready());

        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));
        m.handle(LinkEvent::Connected(printer().id));
        assert!(m.handle(LinkEvent::Connected(printer().id)).is_empty());
        assert_eq!(m.state(), LinkState::Discovering);
    }

    #[test]
    fn test_timer_armed_before_connect() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        let actions = m.handle(LinkEvent::Discovered(printer()));
        let timer = actions
            .iter()
            .position(|a| matches!(a, LinkAction::StartConnectTimer { .. }));
        let connect = actions
            .iter()
            .position(|a| matches!(a, LinkAction::Connect(_)));
        assert!(matches!((timer, connect), (Some(t), Some(c)) if t < c));
    }

    #[test]
    fn test_connect_failure_waits_then_rescans() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));

        let actions = m.handle(LinkEvent::ConnectFailed {
            device: printer().id,
            reason: "refused".to_string(),
        });
        assert_eq!(
            actions,
            vec![
                LinkAction::CancelConnectTimer,
                LinkAction::ScheduleRescan {
                    attempt: 1,
                    after: Duration::from_secs(1)
                }
            ]
        );
        assert_eq!(m.state(), LinkState::Disconnected);

        assert_eq!(
            m.handle(LinkEvent::RetryElapsed { attempt: 1 }),
            vec![LinkAction::StartScan]
        );
        assert_eq!(m.state(), LinkState::Scanning);
    }

    #[test]
    fn test_link_drop_clears_and_rescans_immediately() {
        let mut m = ready_machine();
        let actions = m.handle(LinkEvent::Disconnected {
            device: printer().id,
            reason: Some("peer closed".to_string()),
        });
        assert_eq!(
            actions,
            vec![LinkAction::ScheduleRescan {
                attempt: 1,
                after: Duration::ZERO
            }]
        );
        let snap = m.snapshot();
        assert_eq!(snap.state, LinkState::Disconnected);
        assert_eq!(snap.characteristic, None);
        assert_eq!(snap.device, None);
    }

    #[test]
    fn test_disconnect_of_other_device_ignored() {
        let mut m = ready_machine();
        let actions = m.handle(LinkEvent::Disconnected {
            device: DeviceId("other".to_string()),
            reason: None,
        });
        assert!(actions.is_empty());
        assert_eq!(m.state(), LinkState::Ready);
    }

    #[test]
    fn test_power_off_returns_to_idle() {
        let mut m = ready_machine();
        m.handle(LinkEvent::RadioPoweredOff);
        assert_eq!(m.snapshot(), LinkSnapshot::default());

        // pending retry from before power-off is stale
        assert!(m.handle(LinkEvent::RetryElapsed { attempt: 1 }).is_empty());
        assert_eq!(m.handle(LinkEvent::RadioPoweredOn), vec![LinkAction::StartScan]);
    }

    #[test]
    fn test_rescan_requests() {
        let mut m = ready_machine();
        assert!(m.handle(LinkEvent::RescanRequested).is_empty());
        assert_eq!(m.state(), LinkState::Ready);

        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        assert_eq!(
            m.handle(LinkEvent::RescanRequested),
            vec![LinkAction::StopScan, LinkAction::StartScan]
        );
    }

    #[test]
    fn test_discovery_failure_drops_connection() {
        let mut m = LinkMachine::new(LinkTimings::default());
        m.handle(LinkEvent::RadioPoweredOn);
        m.handle(LinkEvent::Discovered(printer()));
        m.handle(LinkEvent::Connected(printer().id));
        let actions = m.handle(LinkEvent::DiscoveryFailed {
            device: printer().id,
            reason: "no FF02".to_string(),
        });
        assert_eq!(actions[0], LinkAction::CancelConnect(printer().id));
        assert_eq!(m.state(), LinkState::Disconnected);
    }
}
