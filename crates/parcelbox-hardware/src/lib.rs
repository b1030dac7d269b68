//! Device control for the parcel locker kiosk.
//!
//! This crate drives the two pieces of hardware behind a kiosk:
//!
//! - the **bridge**, a microcontroller on a serial line that reports load
//!   cell and infrared telemetry, runs the servos, tares and calibrates the
//!   scales and forwards SMS to a GSM modem;
//! - the **locks**, one solenoid and one door magnet sensor per compartment,
//!   wired to GPIO.
//!
//! # Architecture
//!
//! ```text
//!                    ┌────────────────────┐
//!                    │   Device (facade)  │  cloneable handle
//!                    └──┬──────────────┬──┘
//!             requests  │              │  requests
//!                       ▼              ▼
//!   ┌──────────────────────┐    ┌──────────────────┐
//!   │ Controller task      │    │ Lock supervisor  │
//!   │  CommandEngine       │    │  per-channel     │
//!   │  SmsQueue            │    │  state machine   │
//!   │  telemetry decoder   │    │  magnet polling  │
//!   └──────────┬───────────┘    └────────┬─────────┘
//!              │                         │
//!        serial / mock link        sysfs / mock GPIO
//! ```
//!
//! When the serial port cannot be opened the controller falls back to a
//! synthetic link that produces random telemetry and answers commands, so
//! the kiosk keeps running on a development machine.
//!
//! # Errors
//!
//! Every operation resolves with a [`DeviceError`]. The only fault that ends
//! the controller is losing a healthy serial link and failing to reconnect;
//! it is reported through [`Device::fatal`].

pub mod config;
mod controller;
pub mod device;
pub mod engine;
pub mod error;
pub mod gpio;
pub mod link;
pub mod lock;
pub mod observers;
pub mod traits;

pub use config::{DeviceConfig, LockConfig, ProbeFailurePolicy, SmsRetention};
pub use device::{Device, DeviceBuilder};
pub use error::{DeviceError, Result};
pub use gpio::{AnyGpio, MockGpio, MockGpioHandle, SysfsGpio, SysfsGpioConfig};
pub use link::{LinkEvent, LinkTarget, MockLink, MockLinkConfig, MockLinkHandle, ScriptedOpen};
pub use lock::{LockPhase, LockStatus, PhaseTransition};
pub use observers::ObserverId;
