//! SMS service and event log against a device running on the synthetic link.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use parcelbox_hardware::{
    AnyGpio, Device, DeviceConfig, DeviceError, LinkTarget, MockGpio, MockLinkHandle, ScriptedOpen,
};
use parcelbox_kiosk::{
    EventKind, EventLog, EventQuery, GatewayMessage, KioskError, KioskResult, Notifier,
    SmsGateway, SmsService,
};

const NUMBER: &str = "+5511987654321";

#[derive(Clone, Default)]
struct RecordingGateway {
    sent: Arc<Mutex<Vec<GatewayMessage>>>,
    fail: bool,
}

impl SmsGateway for RecordingGateway {
    async fn send(&self, message: &GatewayMessage) -> KioskResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(KioskError::Gateway("401 - unauthorized".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    pushed: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl Notifier for RecordingNotifier {
    async fn notify_all(&self, title: &str, body: &str) -> KioskResult<bool> {
        self.pushed
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        if self.fail {
            return Err(KioskError::Notifier("messaging unavailable".into()));
        }
        Ok(true)
    }
}

/// A device whose serial port is missing, so it runs on the synthetic link.
async fn mock_device() -> (Device, MockLinkHandle) {
    let (gpio, _gpio_handle) = MockGpio::new(1);
    let (handles_tx, mut handles_rx) = mpsc::unbounded_channel();
    let device = Device::builder(DeviceConfig::default())
        .link_target(LinkTarget::Scripted(VecDeque::from([ScriptedOpen::Fail(
            "no such device".into(),
        )])))
        .gpio(AnyGpio::Mock(gpio))
        .mock_handles(handles_tx)
        .start()
        .await
        .expect("device start");
    let link = handles_rx.recv().await.expect("mock link handle");
    (device, link)
}

#[tokio::test(start_paused = true)]
async fn test_sms_goes_through_gateway_then_modem() {
    let (device, mut link) = mock_device().await;
    let gateway = RecordingGateway::default();
    let service = SmsService::new(gateway.clone(), device);

    service.send_sms("Your code is 1234", NUMBER).await.unwrap();

    assert_eq!(
        *gateway.sent.lock().unwrap(),
        vec![GatewayMessage::new("Your code is 1234", NUMBER)]
    );
    assert_eq!(
        link.next_written().await.as_deref(),
        Some("TXT:+5511987654321:Your code is 1234")
    );
}

#[tokio::test(start_paused = true)]
async fn test_gateway_failure_is_not_escalated() {
    let (device, mut link) = mock_device().await;
    let gateway = RecordingGateway {
        fail: true,
        ..Default::default()
    };
    let service = SmsService::new(gateway.clone(), device);

    assert!(service.send_sms("hello", NUMBER).await.is_ok());
    assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    assert!(link.next_written().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_modem_failure_is_returned() {
    let (device, link) = mock_device().await;
    link.set_fail_writes(true);
    let gateway = RecordingGateway::default();
    let service = SmsService::new(gateway.clone(), device);

    let result = service.send_sms("hello", NUMBER).await;
    assert!(matches!(
        result,
        Err(KioskError::Device(DeviceError::Transport { .. }))
    ));
    assert_eq!(gateway.sent.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_reaches_neither_channel() {
    let (device, mut link) = mock_device().await;
    let gateway = RecordingGateway::default();
    let service = SmsService::new(gateway.clone(), device);

    assert!(matches!(
        service.send_sms("hello", "not-a-number").await,
        Err(KioskError::Device(DeviceError::Validation { .. }))
    ));
    assert!(matches!(
        service.send_sms("", NUMBER).await,
        Err(KioskError::Device(DeviceError::Validation { .. }))
    ));
    assert!(gateway.sent.lock().unwrap().is_empty());
    assert!(link.drain_written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_device_only_service() {
    let (device, mut link) = mock_device().await;
    let service = SmsService::device_only(device);

    service.send_sms("hi", NUMBER).await.unwrap();
    assert_eq!(
        link.next_written().await.as_deref(),
        Some("TXT:+5511987654321:hi")
    );
}

#[tokio::test]
async fn test_events_are_pushed_with_readable_title() {
    let notifier = RecordingNotifier::default();
    let log = EventLog::new(notifier.clone());

    let record = log
        .record(EventKind::AttemptUnlockCompartment, "compartment 3", None)
        .await;

    assert_eq!(record.id, 1);
    assert_eq!(
        *notifier.pushed.lock().unwrap(),
        vec![(
            "Log: Attempt Unlock Compartment".to_string(),
            "Message: compartment 3".to_string()
        )]
    );
}

#[tokio::test]
async fn test_failed_push_still_records_event() {
    let notifier = RecordingNotifier {
        fail: true,
        ..Default::default()
    };
    let log = EventLog::new(notifier.clone());

    log.record(
        EventKind::AttemptDropMoney,
        "slot 2",
        Some("capture-0001.jpg".into()),
    )
    .await;
    log.record(EventKind::AttemptFinishOrder, "order 77", None).await;

    let events = log.query(EventQuery::default());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::AttemptFinishOrder);
    assert_eq!(events[1].photo.as_deref(), Some("capture-0001.jpg"));
    assert_eq!(notifier.pushed.lock().unwrap().len(), 2);
}
