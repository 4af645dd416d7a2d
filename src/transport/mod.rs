//! # Printer Transport Layer
//!
//! Everything between an encoded job and the radio.
//!
//! - [`chunker`]: bounded, paced write chunks
//! - [`radio`]: the [`Radio`] seam and its event channel
//! - [`link`]: the pure connection state machine
//! - [`manager`]: tasks driving the state machine and the single write queue
//! - [`rfcomm`]: Linux RFCOMM radio

pub mod chunker;
pub mod link;
pub mod manager;
pub mod radio;
pub mod rfcomm;

pub use chunker::Chunker;
pub use link::{LinkAction, LinkEvent, LinkMachine, LinkSnapshot, LinkState, LinkTimings};
pub use manager::{LinkHandle, LinkManager, LinkSettings};
pub use radio::{
    DeviceId, LinkEventReceiver, LinkEventSender, Peripheral, Radio, WriteCharacteristic,
    event_channel,
};
pub use rfcomm::{RfcommConfig, RfcommRadio};
