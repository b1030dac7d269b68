//! Shared vocabulary of the parcel locker device stack.
//!
//! Validated value types for everything that crosses the bridge wire
//! (weigh channels, tare targets, phone numbers, SMS bodies), the sensor and
//! magnet snapshots published to the kiosk, and the wire constants and
//! defaults the other crates agree on.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    MagnetState, PhoneNumber, SensorSnapshot, SmsBody, SnapshotOrigin, TareTarget,
    TransportMode, WeighChannel,
};
