//! Behaviour every transport backend shares, checked through `AnyTransport`.

use labkey_hardware::mock::{NoopTransport, ScriptedTransport};
use labkey_hardware::{AnyTransport, PortInfo, SerialTransport, TransportEvent};
use labkey_protocol::{DeviceCommand, ParsedMessage, parse_line};

/// Close must be idempotent and leave the transport unable to write.
async fn assert_close_is_idempotent<T: SerialTransport>(transport: &mut T) {
    transport.close().await;
    transport.close().await;
    assert!(!transport.is_open());
    assert!(transport.connection().is_none());
    assert!(!transport.write(&DeviceCommand::Status).await);
}

#[tokio::test]
async fn test_noop_contract() {
    let mut transport = AnyTransport::from(NoopTransport::new());

    assert!(transport.list_ports().await.is_empty());
    assert!(transport.open("/dev/ttyACM0", 9600).await.is_err());
    assert_close_is_idempotent(&mut transport).await;
}

#[tokio::test]
async fn test_scripted_contract() {
    let (scripted, handle) = ScriptedTransport::new();
    let mut transport = AnyTransport::from(scripted);
    handle.set_ports(vec![
        PortInfo::new("/dev/ttyS0", "unknown"),
        PortInfo::usb("/dev/ttyACM0", 0x2341, 0x0043).with_manufacturer("Arduino LLC"),
    ]);

    let arduino = transport
        .list_ports()
        .await
        .into_iter()
        .find(PortInfo::is_arduino)
        .unwrap();
    let mut events = transport.open(&arduino.path, 9600).await.unwrap();
    assert_eq!(transport.connection().unwrap().port, "/dev/ttyACM0");

    handle.send_line("CARD_DETECTED:A6:86:05:88:MIFARE").await.unwrap();
    let Some(TransportEvent::Line(line)) = events.recv().await else {
        panic!("expected a line");
    };
    assert!(matches!(parse_line(&line), Some(ParsedMessage::CardPresent(_))));

    assert!(transport.write(&DeviceCommand::Ack).await);
    assert_close_is_idempotent(&mut transport).await;
    assert_eq!(handle.written(), vec![DeviceCommand::Ack]);
}

#[tokio::test]
async fn test_reopen_replaces_connection() {
    let (scripted, handle) = ScriptedTransport::new();
    let mut transport = AnyTransport::from(scripted);

    let mut first = transport.open("COM3", 9600).await.unwrap();
    let mut second = transport.open("COM4", 115_200).await.unwrap();

    // The first connection's sender was dropped when the second opened.
    assert_eq!(first.recv().await, None);

    handle.send_line("READER_READY").await.unwrap();
    assert_eq!(
        second.recv().await,
        Some(TransportEvent::Line("READER_READY".into()))
    );
    assert_eq!(transport.connection().unwrap().baud_rate, 115_200);
    assert_eq!(handle.open_attempts(), vec!["COM3", "COM4"]);
}
