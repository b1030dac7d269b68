//! Unlock/relock sequences driven through the mock GPIO bank.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use parcelbox_core::MagnetState;
use parcelbox_hardware::{DeviceError, LockPhase};

use common::settle;

/// Long enough for several poll ticks.
const DOOR_MOVE: Duration = Duration::from_millis(300);

#[derive(Debug, PartialEq)]
enum Outcome {
    Relocked,
    Expired(DeviceError),
}

fn outcome_channel() -> (
    impl Fn() -> Box<dyn FnOnce() + Send>,
    impl Fn() -> Box<dyn FnOnce(DeviceError) + Send>,
    mpsc::UnboundedReceiver<Outcome>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let relock_tx = tx.clone();
    let on_relock = move || -> Box<dyn FnOnce() + Send> {
        let tx = relock_tx.clone();
        Box::new(move || {
            let _ = tx.send(Outcome::Relocked);
        })
    };
    let on_expired = move || -> Box<dyn FnOnce(DeviceError) + Send> {
        let tx = tx.clone();
        Box::new(move |e| {
            let _ = tx.send(Outcome::Expired(e));
        })
    };
    (on_relock, on_expired, rx)
}

#[tokio::test(start_paused = true)]
async fn test_open_then_close_relocks_once() {
    let rig = common::start_real(common::config()).await;
    let (on_relock, on_expired, mut outcomes) = outcome_channel();

    let sequence = rig
        .device
        .unlock_and_wait_for_relock(2, on_relock(), on_expired(), None);
    settle().await;
    assert_eq!(rig.gpio.output(2), Some(false));

    rig.gpio.set_magnet(2, false);
    tokio::time::sleep(DOOR_MOVE).await;
    assert_eq!(
        rig.device.lock_status(2).await.unwrap().phase,
        LockPhase::WaitingForClose
    );

    rig.gpio.set_magnet(2, true);
    sequence.await.unwrap();

    assert_eq!(outcomes.recv().await, Some(Outcome::Relocked));
    assert!(outcomes.try_recv().is_err());
    assert_eq!(rig.gpio.output(2), Some(true));
    assert_eq!(rig.gpio.writes(), vec![(2, false), (2, true)]);

    let status = rig.device.lock_status(2).await.unwrap();
    assert_eq!(status.phase, LockPhase::Idle);
    let path: Vec<_> = status.history.iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![
            LockPhase::WaitingForOpen,
            LockPhase::WaitingForClose,
            LockPhase::Completed,
            LockPhase::Idle
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_open_without_close_expires_unlocked() {
    let rig = common::start_real(common::config()).await;
    let (on_relock, on_expired, mut outcomes) = outcome_channel();

    let start = Instant::now();
    let sequence = rig
        .device
        .unlock_and_wait_for_relock(2, on_relock(), on_expired(), None);
    settle().await;
    rig.gpio.set_magnet(2, false);

    sequence.await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(40));
    assert_eq!(
        outcomes.recv().await,
        Some(Outcome::Expired(DeviceError::timeout(Duration::from_secs(40))))
    );
    assert!(outcomes.try_recv().is_err());
    assert_eq!(rig.gpio.output(2), Some(false));
    assert_eq!(rig.gpio.unlock_writes(2), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_unlock_does_not_write_again() {
    let rig = common::start_real(common::config()).await;
    let (on_relock, on_expired, mut outcomes) = outcome_channel();

    let first = rig
        .device
        .unlock_and_wait_for_relock(0, on_relock(), on_expired(), None);
    let second = rig
        .device
        .unlock_and_wait_for_relock(0, on_relock(), on_expired(), None);

    second.await.unwrap();
    assert_eq!(
        outcomes.recv().await,
        Some(Outcome::Expired(DeviceError::sequence_conflict(0)))
    );
    assert_eq!(rig.gpio.unlock_writes(0), 1);

    rig.gpio.set_magnet(0, false);
    tokio::time::sleep(DOOR_MOVE).await;
    rig.gpio.set_magnet(0, true);
    first.await.unwrap();
    assert_eq!(outcomes.recv().await, Some(Outcome::Relocked));
}

#[tokio::test(start_paused = true)]
async fn test_open_door_fails_precondition_without_side_effect() {
    let rig = common::start_real(common::config()).await;
    rig.gpio.set_magnet(1, false);
    tokio::time::sleep(DOOR_MOVE).await;

    let result = rig.device.unlock_and_wait(1, None).await;
    assert!(matches!(result, Err(DeviceError::Precondition { .. })));
    assert!(rig.gpio.writes().is_empty());
    assert_eq!(
        rig.device.lock_status(1).await.unwrap().phase,
        LockPhase::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn test_unlock_write_failure_leaves_channel_idle() {
    let rig = common::start_real(common::config()).await;
    rig.gpio.set_fail_writes(true);

    let result = rig.device.unlock_and_wait(0, None).await;
    assert!(matches!(result, Err(DeviceError::Transport { .. })));

    let status = rig.device.lock_status(0).await.unwrap();
    assert_eq!(status.phase, LockPhase::Idle);
    assert!(status.history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_relock_write_failure_is_reported() {
    let rig = common::start_real(common::config()).await;
    let device = rig.device.clone();
    let sequence = tokio::spawn(async move { device.unlock_and_wait(0, None).await });
    settle().await;

    rig.gpio.set_magnet(0, false);
    tokio::time::sleep(DOOR_MOVE).await;
    rig.gpio.set_fail_writes(true);
    rig.gpio.set_magnet(0, true);

    assert!(matches!(
        sequence.await.unwrap(),
        Err(DeviceError::Transport { .. })
    ));
    assert_eq!(
        rig.device.lock_status(0).await.unwrap().phase,
        LockPhase::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_channel_and_timeout() {
    let rig = common::start_real(common::config()).await;

    assert!(matches!(
        rig.device.unlock_and_wait(common::LOCK_CHANNELS, None).await,
        Err(DeviceError::Validation { .. })
    ));
    assert!(matches!(
        rig.device.unlock_and_wait(0, Some(Duration::ZERO)).await,
        Err(DeviceError::Validation { .. })
    ));
    assert!(rig.device.lock_status(common::LOCK_CHANNELS).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_timeout_leaves_lock_engaged() {
    let rig = common::start_real(common::config()).await;
    let (on_relock, on_expired, mut outcomes) = outcome_channel();

    assert!(matches!(
        rig.device.unlock_and_wait(0, Some(Duration::MAX)).await,
        Err(DeviceError::Validation { .. })
    ));
    rig.device
        .unlock_and_wait_for_relock(1, on_relock(), on_expired(), Some(Duration::MAX))
        .await
        .unwrap();
    assert!(matches!(
        outcomes.recv().await,
        Some(Outcome::Expired(DeviceError::Validation { .. }))
    ));
    assert!(rig.gpio.writes().is_empty());

    // The supervisor keeps serving.
    let device = rig.device.clone();
    let sequence = tokio::spawn(async move { device.unlock_and_wait(0, None).await });
    settle().await;
    assert_eq!(rig.gpio.output(0), Some(false));

    rig.gpio.set_magnet(0, false);
    tokio::time::sleep(DOOR_MOVE).await;
    rig.gpio.set_magnet(0, true);
    assert_eq!(sequence.await.unwrap(), Ok(()));
    assert_eq!(rig.gpio.output(0), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_magnet_changes_are_batched() {
    let rig = common::start_real(common::config()).await;
    let seen: Arc<Mutex<Vec<MagnetState>>> = Arc::default();
    let sink = Arc::clone(&seen);
    rig.device
        .subscribe_magnets(move |state| sink.lock().unwrap().push(state.clone()));

    settle().await;
    assert_eq!(rig.device.magnet_state(), MagnetState::all_closed(3));

    rig.gpio.set_magnet(0, false);
    rig.gpio.set_magnet(2, false);
    tokio::time::sleep(DOOR_MOVE).await;

    // One event for both channels, none for the unchanged polls after it.
    let expected = MagnetState::new(vec![false, true, false]);
    assert_eq!(*seen.lock().unwrap(), vec![expected.clone()]);
    assert_eq!(rig.device.magnet_state(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reads_keep_last_value() {
    let rig = common::start_real(common::config()).await;
    let seen: Arc<Mutex<Vec<MagnetState>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let id = rig
        .device
        .subscribe_magnets(move |state| sink.lock().unwrap().push(state.clone()));

    rig.gpio.set_fail_reads(true);
    rig.gpio.set_magnet(1, false);
    tokio::time::sleep(DOOR_MOVE).await;
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(rig.device.magnet_state(), MagnetState::all_closed(3));

    assert!(rig.device.unsubscribe_magnets(id));
    rig.gpio.set_fail_reads(false);
    tokio::time::sleep(DOOR_MOVE).await;
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(
        rig.device.magnet_state(),
        MagnetState::new(vec![true, false, true])
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_expires_running_sequences() {
    let rig = common::start_real(common::config()).await;
    let device = rig.device.clone();
    let sequence = tokio::spawn(async move { device.unlock_and_wait(0, None).await });
    settle().await;

    rig.device.close().await;
    assert_eq!(sequence.await.unwrap(), Err(DeviceError::NotConnected));
    assert_eq!(rig.gpio.output(0), Some(false));
}
