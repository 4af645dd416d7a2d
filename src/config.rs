//! # Relay Configuration
//!
//! Everything a running relay needs, built by the CLI from flags and
//! environment variables.
//!
//! | Setting | Default |
//! |---------|---------|
//! | connect timeout | 10 s |
//! | connect retry delay | 1 s |
//! | chunk pacing | 20 ms |
//! | write size (RFCOMM) | 182 bytes |
//! | peer wait | 3 s |
//! | cloud poll interval | 2 s |
//! | recent log lines | 100 |
//! | HTTP listen address | `0.0.0.0:8080` |

use std::path::PathBuf;
use std::time::Duration;

use crate::logging::DEFAULT_CAPACITY;
use crate::printer::PrinterConfig;
use crate::render::RasterOptions;
use crate::router::{FirestoreConfig, RouterSettings};
use crate::text::LayoutMetrics;
use crate::transport::chunker::DEFAULT_PACING;
use crate::transport::rfcomm::DEFAULT_WRITE_SIZE;
use crate::transport::{LinkSettings, LinkTimings, RfcommConfig};

/// Default HTTP listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub printer: PrinterConfig,
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
    pub pacing: Duration,
    /// Write size for links that do not negotiate one
    pub write_size: usize,
    pub rfcomm_mac: Option<String>,
    pub rfcomm_device: Option<PathBuf>,
    pub display_name: String,
    pub peer_wait: Duration,
    /// TCP port for peer sessions (0 = any)
    pub peer_port: u16,
    pub log_capacity: usize,
    pub cloud_poll: Duration,
    pub cloud: Option<FirestoreConfig>,
    pub font_dir: Option<PathBuf>,
    pub listen_addr: String,
    pub metrics: LayoutMetrics,
    /// Defaults for image jobs that do not specify their own
    pub raster: RasterOptions,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let timings = LinkTimings::default();
        Self {
            printer: PrinterConfig::T02,
            connect_timeout: timings.connect_timeout,
            retry_delay: timings.retry_delay,
            pacing: DEFAULT_PACING,
            write_size: DEFAULT_WRITE_SIZE,
            rfcomm_mac: None,
            rfcomm_device: None,
            display_name: default_display_name(),
            peer_wait: Duration::from_secs(3),
            peer_port: 0,
            log_capacity: DEFAULT_CAPACITY,
            cloud_poll: Duration::from_secs(2),
            cloud: None,
            font_dir: None,
            listen_addr: DEFAULT_LISTEN.to_string(),
            metrics: LayoutMetrics::default(),
            raster: RasterOptions::default(),
        }
    }
}

impl RelayConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            timings: LinkTimings {
                connect_timeout: self.connect_timeout,
                retry_delay: self.retry_delay,
            },
            pacing: self.pacing,
        }
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            display_name: self.display_name.clone(),
            peer_wait: self.peer_wait,
            cloud_poll: self.cloud_poll,
            printer: self.printer,
        }
    }

    pub fn rfcomm(&self) -> RfcommConfig {
        RfcommConfig {
            mac: self.rfcomm_mac.clone(),
            device: self.rfcomm_device.clone(),
            write_size: self.write_size,
            ..RfcommConfig::default()
        }
    }
}

/// Host name, or `t02relay` when it cannot be read.
pub fn default_display_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "t02relay".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.pacing, Duration::from_millis(20));
        assert_eq!(config.peer_wait, Duration::from_secs(3));
        assert_eq!(config.log_capacity, 100);
        assert!(!config.display_name.is_empty());
    }

    #[test]
    fn test_derived_settings() {
        let config = RelayConfig {
            connect_timeout: Duration::from_secs(4),
            write_size: 64,
            rfcomm_mac: Some("AA:BB:CC:DD:EE:FF".to_string()),
            ..RelayConfig::default()
        };
        assert_eq!(config.link_settings().timings.connect_timeout, Duration::from_secs(4));
        assert_eq!(config.rfcomm().write_size, 64);
        assert_eq!(config.router_settings().printer, PrinterConfig::T02);
    }
}
