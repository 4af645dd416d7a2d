//! # Radio Seam
//!
//! The short-range link to the printer sits behind the [`Radio`] trait.
//! Operations only *start* things: results come back later as
//! [`LinkEvent`](super::link::LinkEvent)s on the channel the radio was
//! built with, in the order the radio observed them.
//!
//! | Call | Completion event |
//! |------|------------------|
//! | `start_scan` | `Discovered` |
//! | `connect` | `Connected` / `ConnectFailed` |
//! | `discover_write_characteristic` | `CharacteristicFound` / `DiscoveryFailed` |
//! | (link drop) | `Disconnected` |

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::link::LinkEvent;
use crate::error::Result;

/// Service the T02 advertises while discoverable.
pub const ADVERTISED_SERVICE: &str = "AF30";
/// Service holding the print characteristic.
pub const PRINT_SERVICE: &str = "FF00";
/// Write characteristic for print data.
pub const WRITE_CHARACTERISTIC: &str = "FF02";

/// Stable identity of a peripheral (MAC address, device path, UUID...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A printer candidate seen by the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peripheral {
    pub id: DeviceId,
    pub name: Option<String>,
}

impl Peripheral {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: DeviceId(id.into()),
            name,
        }
    }

    /// Name for logs and status.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id.0)
    }
}

/// The located write characteristic and its negotiated write size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteCharacteristic {
    pub device: DeviceId,
    pub uuid: String,
    pub max_write_size: usize,
}

/// Sender half radios report through.
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Receiver half consumed by the link manager.
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Create the event channel shared by a radio and its link manager.
pub fn event_channel() -> (LinkEventSender, LinkEventReceiver) {
    mpsc::unbounded_channel()
}

/// Short-range radio driving the printer link.
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Targets the operating system already holds a connection to.
    async fn connected_peripherals(&self) -> Result<Vec<Peripheral>>;

    /// Begin looking for advertising targets.
    async fn start_scan(&self) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Begin connecting. Completion is reported as an event.
    async fn connect(&self, peripheral: &Peripheral) -> Result<()>;

    /// Tear down a pending or established connection.
    async fn cancel_connect(&self, device: &DeviceId) -> Result<()>;

    /// Locate the write characteristic on a connected device.
    async fn discover_write_characteristic(&self, device: &DeviceId) -> Result<()>;

    /// Write one chunk. Resolves when the radio has accepted it.
    async fn write(&self, characteristic: &WriteCharacteristic, chunk: &[u8]) -> Result<()>;
}
