//! Kiosk dashboard state.
//!
//! Aggregates what the operator screen shows: the latest sensor frame, whether
//! someone is interacting with the kiosk, whether a compartment is being
//! dispensed, and the device link state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use parcelbox_core::{SensorSnapshot, TareTarget, TransportMode};
use parcelbox_hardware::{Device, ObserverId};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::KioskResult;

/// Point-in-time view served to the dashboard screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    /// `None` until the first frame arrives.
    pub sensors: Option<SensorSnapshot>,
    pub has_active_session: bool,
    pub is_dispensing: bool,
    pub mode: TransportMode,
    pub ready: bool,
}

#[derive(Default)]
struct Flags {
    active_session: AtomicBool,
    dispensing: AtomicUsize,
}

/// Live dashboard bound to one [`Device`].
///
/// Dropping the dashboard unsubscribes it from the sensor stream.
pub struct Dashboard {
    device: Device,
    latest: Arc<Mutex<Option<SensorSnapshot>>>,
    flags: Flags,
    subscription: ObserverId,
}

impl Dashboard {
    /// Start following the sensor stream of `device`.
    pub fn attach(device: Device) -> Self {
        let latest: Arc<Mutex<Option<SensorSnapshot>>> = Arc::default();
        let sink = Arc::clone(&latest);
        let subscription = device.subscribe_sensor(move |snapshot| {
            *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        });
        debug!(?subscription, "Dashboard attached");

        Self {
            device,
            latest,
            flags: Flags::default(),
            subscription,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn states(&self) -> DashboardState {
        DashboardState {
            sensors: self
                .latest
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            has_active_session: self.flags.active_session.load(Ordering::SeqCst),
            is_dispensing: self.is_dispensing(),
            mode: self.device.get_mode(),
            ready: self.device.is_ready(),
        }
    }

    pub fn set_active_session(&self, active: bool) {
        let was = self.flags.active_session.swap(active, Ordering::SeqCst);
        if was != active {
            info!(active, "Kiosk session changed");
        }
    }

    pub fn is_dispensing(&self) -> bool {
        self.flags.dispensing.load(Ordering::SeqCst) > 0
    }

    /// Unlock `channel` and wait for the door to be opened and closed again.
    ///
    /// The dashboard reports dispensing for as long as any such sequence runs.
    pub async fn dispense(&self, channel: usize, timeout: Option<Duration>) -> KioskResult<()> {
        self.flags.dispensing.fetch_add(1, Ordering::SeqCst);
        let _guard = DispenseGuard(&self.flags.dispensing);

        info!(channel, "Dispensing compartment");
        self.device.unlock_and_wait(channel, timeout).await?;
        Ok(())
    }

    /// Zero every scale.
    pub async fn tare(&self) -> KioskResult<()> {
        self.device.tare(TareTarget::All).await?;
        Ok(())
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.device.unsubscribe_sensor(self.subscription);
    }
}

struct DispenseGuard<'a>(&'a AtomicUsize);

impl Drop for DispenseGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
