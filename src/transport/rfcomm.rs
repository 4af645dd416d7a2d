//! # RFCOMM Radio
//!
//! [`Radio`] implementation for Linux hosts where the printer is paired and
//! bound to an RFCOMM serial device.
//!
//! ## Bluetooth Setup (Linux)
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on          # look for "T02"
//! [bluetooth]# pair AA:BB:CC:DD:EE:FF
//! $ sudo rfcomm bind 0 AA:BB:CC:DD:EE:FF 1
//! # creates /dev/rfcomm0
//! ```
//!
//! ## Mapping onto the link
//!
//! | Radio call | RFCOMM meaning |
//! |------------|----------------|
//! | `connected_peripherals` | binding listed as `connected` in `/proc/net/rfcomm` |
//! | `start_scan` | poll until the bound device node exists |
//! | `connect` | open the node (detached) and switch the TTY to raw mode |
//! | `discover_write_characteristic` | the open port, with the configured write size |
//! | `write` | blocking write + flush on the port |
//!
//! A failed write closes the port and reports `Disconnected`.
//!
//! ## TTY Configuration
//!
//! The device is opened in raw mode so raster bytes pass unmodified: no
//! input or output processing, 8-bit characters, no echo, no canonical mode,
//! and no XON/XOFF (0x11 and 0x13 appear in raster data).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::link::LinkEvent;
use super::radio::{DeviceId, LinkEventSender, Peripheral, Radio, WriteCharacteristic, WRITE_CHARACTERISTIC};
use crate::error::{RelayError, Result};

/// Default RFCOMM device path
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Write size used when the link does not negotiate one.
pub const DEFAULT_WRITE_SIZE: usize = 182;

/// Where to find the printer.
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// Printer MAC, used to find its binding
    pub mac: Option<String>,
    /// Explicit device node; overrides the MAC lookup
    pub device: Option<PathBuf>,
    pub write_size: usize,
    /// How often a scan re-checks for the device node
    pub poll_interval: Duration,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            mac: None,
            device: None,
            write_size: DEFAULT_WRITE_SIZE,
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl RfcommConfig {
    /// Resolve the device node for this printer, if it is bound.
    fn resolve(&self) -> Option<PathBuf> {
        if let Some(device) = &self.device {
            return Some(device.clone());
        }
        match &self.mac {
            Some(mac) => match find_rfcomm_for_mac(mac) {
                Ok(found) => found.map(PathBuf::from),
                Err(e) => {
                    debug!(error = %e, "RFCOMM lookup failed");
                    None
                }
            },
            None => Some(PathBuf::from(DEFAULT_DEVICE)),
        }
    }

    fn peripheral(&self, device: &Path) -> Peripheral {
        let id = match &self.mac {
            Some(mac) => mac.to_uppercase(),
            None => device.display().to_string(),
        };
        Peripheral::new(id, Some(format!("T02 ({})", device.display())))
    }
}

type Port = Arc<Mutex<File>>;

#[derive(Default)]
struct RadioState {
    device: Option<PathBuf>,
    port: Option<Port>,
    scan: Option<JoinHandle<()>>,
}

/// RFCOMM-backed printer radio.
pub struct RfcommRadio {
    config: RfcommConfig,
    events: LinkEventSender,
    state: Arc<Mutex<RadioState>>,
    /// Bumped by every connect and cancel; a finishing open only counts if
    /// the generation it started with is still current.
    generation: Arc<AtomicU64>,
}

impl RfcommRadio {
    pub fn new(config: RfcommConfig, events: LinkEventSender) -> Self {
        Self {
            config,
            events,
            state: Arc::new(Mutex::new(RadioState::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Report adapter power to the link.
    pub fn announce(&self) {
        let powered = adapter_present();
        info!(powered, "Bluetooth adapter");
        let event = if powered {
            LinkEvent::RadioPoweredOn
        } else {
            LinkEvent::RadioPoweredOff
        };
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, RadioState> {
        lock_state(&self.state)
    }

    fn close(&self) {
        let mut state = self.lock();
        state.port = None;
        state.device = None;
    }
}

#[async_trait]
impl Radio for RfcommRadio {
    async fn connected_peripherals(&self) -> Result<Vec<Peripheral>> {
        let config = self.config.clone();
        let found = tokio::task::spawn_blocking(move || {
            let device = config.resolve()?;
            let name = device.file_name()?.to_string_lossy().into_owned();
            let contents = fs::read_to_string("/proc/net/rfcomm").ok()?;
            contents
                .lines()
                .filter_map(parse_binding)
                .find(|b| b.device == name && b.connected)
                .map(|_| config.peripheral(&device))
        })
        .await
        .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(found.into_iter().collect())
    }

    async fn start_scan(&self) -> Result<()> {
        let config = self.config.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            loop {
                let candidate = config.clone();
                let found = tokio::task::spawn_blocking(move || {
                    candidate.resolve().filter(|d| d.exists())
                })
                .await
                .ok()
                .flatten();
                if let Some(device) = found {
                    debug!(device = %device.display(), "RFCOMM device present");
                    let _ = events.send(LinkEvent::Discovered(config.peripheral(&device)));
                    break;
                }
                tokio::time::sleep(config.poll_interval).await;
            }
        });

        let mut state = self.lock();
        if let Some(old) = state.scan.replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        if let Some(task) = self.lock().scan.take() {
            task.abort();
        }
        Ok(())
    }

    /// Opening a bound node blocks until the printer answers, so the open
    /// runs detached and reports `Connected` or `ConnectFailed` when done.
    async fn connect(&self, peripheral: &Peripheral) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let config = self.config.clone();
        let current = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let id = peripheral.id.clone();

        tokio::spawn(async move {
            let opened = tokio::task::spawn_blocking(move || -> Result<(PathBuf, File)> {
                let device = config.resolve().ok_or_else(|| {
                    RelayError::Transport("printer is not bound to RFCOMM".to_string())
                })?;
                let file = open_port(&device)?;
                Ok((device, file))
            })
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
            .and_then(|r| r);

            let event = {
                let mut guard = lock_state(&state);
                // checked under the lock so a concurrent cancel either wins
                // here or closes the port right after
                if current.load(Ordering::SeqCst) != generation {
                    debug!(device = %id, "Dropping result of a cancelled connect");
                    return;
                }
                match opened {
                    Ok((device, file)) => {
                        guard.device = Some(device);
                        guard.port = Some(Arc::new(Mutex::new(file)));
                        LinkEvent::Connected(id)
                    }
                    Err(e) => {
                        warn!(device = %id, error = %e, "RFCOMM connect failed");
                        LinkEvent::ConnectFailed {
                            device: id,
                            reason: e.to_string(),
                        }
                    }
                }
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    async fn cancel_connect(&self, device: &DeviceId) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(device = %device, "Closing RFCOMM port");
        self.close();
        Ok(())
    }

    async fn discover_write_characteristic(&self, device: &DeviceId) -> Result<()> {
        let event = if self.lock().port.is_some() {
            LinkEvent::CharacteristicFound(WriteCharacteristic {
                device: device.clone(),
                uuid: WRITE_CHARACTERISTIC.to_string(),
                max_write_size: self.config.write_size,
            })
        } else {
            LinkEvent::DiscoveryFailed {
                device: device.clone(),
                reason: "port is not open".to_string(),
            }
        };
        let _ = self.events.send(event);
        Ok(())
    }

    async fn write(&self, characteristic: &WriteCharacteristic, chunk: &[u8]) -> Result<()> {
        let port = self.lock().port.clone().ok_or(RelayError::NotConnected)?;
        let data = chunk.to_vec();
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = port.lock().unwrap_or_else(|e| e.into_inner());
            file.write_all(&data)
                .map_err(|e| RelayError::Transport(format!("Write failed: {}", e)))?;
            file.flush()
                .map_err(|e| RelayError::Transport(format!("Flush failed: {}", e)))
        })
        .await
        .map_err(|e| RelayError::Transport(e.to_string()))?;

        if let Err(e) = &result {
            warn!(error = %e, "RFCOMM write failed, closing port");
            self.close();
            let _ = self.events.send(LinkEvent::Disconnected {
                device: characteristic.device.clone(),
                reason: Some(e.to_string()),
            });
        }
        result
    }
}

fn lock_state(state: &Mutex<RadioState>) -> MutexGuard<'_, RadioState> {
    // state is plain data; a poisoned lock still holds a usable value
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn open_port(device: &Path) -> Result<File> {
    let file = OpenOptions::new().write(true).open(device).map_err(|e| {
        RelayError::Transport(format!("Failed to open {}: {}", device.display(), e))
    })?;
    configure_tty_raw(file.as_raw_fd())?;
    Ok(file)
}

/// Whether the host has any Bluetooth adapter.
fn adapter_present() -> bool {
    fs::read_dir("/sys/class/bluetooth")
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Configure a file descriptor for raw TTY mode.
///
/// Disables:
///
/// - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY
/// - **Output flags**: OPOST
/// - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
/// - **Control flags**: CSIZE, PARENB (then CS8 is set)
fn configure_tty_raw(fd: i32) -> Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(RelayError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(RelayError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

// ============================================================================
// RFCOMM BINDINGS
// ============================================================================

/// One line of `/proc/net/rfcomm` or `rfcomm -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    /// Node name, e.g. `rfcomm0`
    device: String,
    macs: Vec<String>,
    connected: bool,
}

/// Parse `rfcomm0: AA:BB:CC:DD:EE:FF channel 1 connected [tty-attached]`.
fn parse_binding(line: &str) -> Option<Binding> {
    let (device, rest) = line.split_once(": ")?;
    let device = device.trim();
    if !device.starts_with("rfcomm") {
        return None;
    }
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    Some(Binding {
        device: device.to_string(),
        macs: tokens
            .iter()
            .filter(|t| is_valid_mac(t))
            .map(|t| t.to_uppercase())
            .collect(),
        connected: tokens.contains(&"connected"),
    })
}

fn device_for_mac(listing: &str, mac: &str) -> Option<String> {
    let mac = mac.to_uppercase();
    listing
        .lines()
        .filter_map(parse_binding)
        .find(|b| b.macs.contains(&mac))
        .map(|b| format!("/dev/{}", b.device))
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a`.
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = device_for_mac(&contents, mac).filter(|p| Path::new(p).exists()) {
            return Ok(Some(path));
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| RelayError::Transport(format!("Failed to run 'rfcomm -a': {}", e)))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(device_for_mac(&stdout, mac).filter(|p| Path::new(p).exists()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::radio::event_channel;

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL"));
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_parse_binding_lines() {
        let b = parse_binding("rfcomm0: aa:bb:cc:dd:ee:ff channel 1 connected [tty-attached]").unwrap();
        assert_eq!(b.device, "rfcomm0");
        assert_eq!(b.macs, vec!["AA:BB:CC:DD:EE:FF".to_string()]);
        assert!(b.connected);

        let b = parse_binding("rfcomm1: 11:22:33:44:55:66 channel 1 clean").unwrap();
        assert!(!b.connected);

        assert_eq!(parse_binding("garbage"), None);
        assert_eq!(parse_binding("hci0: up"), None);
    }

    #[test]
    fn test_device_for_mac() {
        let listing = "rfcomm0: 11:22:33:44:55:66 channel 1 clean\n\
                       rfcomm3: AA:BB:CC:DD:EE:FF channel 1 closed\n";
        assert_eq!(
            device_for_mac(listing, "aa:bb:cc:dd:ee:ff"),
            Some("/dev/rfcomm3".to_string())
        );
        assert_eq!(device_for_mac(listing, "00:00:00:00:00:01"), None);
    }

    #[test]
    fn test_peripheral_identity() {
        let config = RfcommConfig {
            mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            ..RfcommConfig::default()
        };
        let p = config.peripheral(Path::new("/dev/rfcomm0"));
        assert_eq!(p.id, DeviceId("AA:BB:CC:DD:EE:FF".to_string()));

        let p = RfcommConfig::default().peripheral(Path::new("/dev/rfcomm0"));
        assert_eq!(p.id.0, "/dev/rfcomm0");
    }

    #[tokio::test]
    async fn test_discovery_needs_open_port() {
        let (tx, mut rx) = event_channel();
        let radio = RfcommRadio::new(RfcommConfig::default(), tx);
        let device = DeviceId("/dev/rfcomm0".to_string());
        radio.discover_write_characteristic(&device).await.unwrap();
        assert!(matches!(rx.recv().await, Some(LinkEvent::DiscoveryFailed { .. })));
    }

    #[tokio::test]
    async fn test_write_without_port_is_not_connected() {
        let (tx, _rx) = event_channel();
        let radio = RfcommRadio::new(RfcommConfig::default(), tx);
        let c = WriteCharacteristic {
            device: DeviceId("x".to_string()),
            uuid: WRITE_CHARACTERISTIC.to_string(),
            max_write_size: 20,
        };
        assert!(matches!(radio.write(&c, &[1, 2]).await, Err(RelayError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_to_missing_device_fails() {
        let (tx, mut rx) = event_channel();
        let config = RfcommConfig {
            device: Some(PathBuf::from("/nonexistent/rfcomm-test")),
            ..RfcommConfig::default()
        };
        let radio = RfcommRadio::new(config, tx);
        let p = Peripheral::new("/nonexistent/rfcomm-test", None);

        // returns at once; the outcome arrives as an event
        radio.connect(&p).await.unwrap();
        match rx.recv().await {
            Some(LinkEvent::ConnectFailed { device, .. }) => assert_eq!(device, p.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_connect_reports_nothing() {
        let (tx, mut rx) = event_channel();
        let config = RfcommConfig {
            device: Some(PathBuf::from("/nonexistent/rfcomm-test")),
            ..RfcommConfig::default()
        };
        let radio = RfcommRadio::new(config, tx);
        let p = Peripheral::new("/nonexistent/rfcomm-test", None);

        radio.connect(&p).await.unwrap();
        radio.cancel_connect(&p.id).await.unwrap();
        let late = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(late.is_err(), "cancelled connect reported {:?}", late);
    }
}
