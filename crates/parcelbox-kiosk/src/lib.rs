//! Kiosk-side collaborators of the parcel locker device.
//!
//! Everything here sits on top of a running [`parcelbox_hardware::Device`]:
//!
//! - [`KioskConfig`]: the JSON configuration file in the data directory
//! - [`Dashboard`]: state shown on the operator screen
//! - [`SmsService`]: SMS through the HTTP gateway and the GSM modem
//! - [`EventLog`]: journal of kiosk events pushed to operators
//!
//! The HTTP gateway and push delivery are external services; they are reached
//! through the [`SmsGateway`] and [`Notifier`] traits.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod sms;

pub use config::KioskConfig;
pub use dashboard::{Dashboard, DashboardState};
pub use error::{KioskError, KioskResult};
pub use events::{EventKind, EventLog, EventQuery, EventRecord, NoNotifier, Notifier};
pub use sms::{GatewayMessage, NoGateway, SmsGateway, SmsService};
