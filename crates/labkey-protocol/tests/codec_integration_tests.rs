//! Integration tests for ReaderLineCodec with Tokio streams.
//!
//! One end of a duplex stream plays the reader firmware writing raw bytes,
//! the other end is framed the way the serial transport frames the port.

use futures::{SinkExt, StreamExt};
use labkey_protocol::{
    CardPresence, DeviceCommand, Dialect, ParsedMessage, ReaderLineCodec, parse_line,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

fn framed_reader(dialect: Dialect) -> (Framed<DuplexStream, ReaderLineCodec>, DuplexStream) {
    let (host, device) = tokio::io::duplex(1024);
    (
        Framed::new(host, ReaderLineCodec::with_dialect(dialect)),
        device,
    )
}

#[tokio::test]
async fn test_lines_split_across_writes() {
    let (mut host, mut device) = framed_reader(Dialect::Json);

    device.write_all(b"READER_RE").await.unwrap();
    device.write_all(b"ADY\r\nCard Type: MIFARE 1KB\r").await.unwrap();
    device.write_all(b"\nCard UID: A6 86 05 88\r\n").await.unwrap();

    let first = host.next().await.unwrap().unwrap();
    let second = host.next().await.unwrap().unwrap();
    let third = host.next().await.unwrap().unwrap();

    assert_eq!(first, "READER_READY");
    assert_eq!(
        parse_line(&second),
        Some(ParsedMessage::CardPresent(CardPresence::UidPending {
            card_type: "MIFARE 1KB".into()
        }))
    );
    assert!(matches!(
        parse_line(&third),
        Some(ParsedMessage::CardPresent(CardPresence::Identified { .. }))
    ));
}

#[tokio::test]
async fn test_stream_ends_with_trailing_line() {
    let (mut host, mut device) = framed_reader(Dialect::Json);

    device.write_all(b"CARD_REMOVED").await.unwrap();
    drop(device);

    assert_eq!(host.next().await.unwrap().unwrap(), "CARD_REMOVED");
    assert!(host.next().await.is_none());
}

#[tokio::test]
async fn test_commands_reach_the_device() {
    let (mut host, mut device) = framed_reader(Dialect::Text);

    host.send(DeviceCommand::Status).await.unwrap();
    host.send(DeviceCommand::RequestUid).await.unwrap();

    let mut received = vec![0u8; 9];
    device.read_exact(&mut received).await.unwrap();
    assert_eq!(&received, b"STATUS\ng\n");
}

#[tokio::test]
async fn test_json_dialect_commands() {
    let (mut host, mut device) = framed_reader(Dialect::Json);

    host.send(DeviceCommand::Ack).await.unwrap();

    let expected = b"{\"cmd\":\"ack\"}\n";
    let mut received = vec![0u8; expected.len()];
    device.read_exact(&mut received).await.unwrap();
    assert_eq!(&received, expected);
}
