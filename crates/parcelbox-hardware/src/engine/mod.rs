//! Reply-matching state machines driven by the controller task.
//!
//! Neither engine performs I/O. The controller asks for the next line to
//! write, reports write failures, feeds inbound lines and fires deadlines.

pub mod command;
pub mod sms;

pub use command::{CommandEngine, PendingCommand};
pub use sms::{SmsJob, SmsQueue};
