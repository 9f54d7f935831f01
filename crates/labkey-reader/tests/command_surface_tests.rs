//! Integration tests for the reader command surface: simulated scans,
//! `read_card` waits, mock mode, and event listeners.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use labkey_core::{Error, ScanSource};
use labkey_hardware::AnyTransport;
use labkey_protocol::DeviceCommand;
use labkey_reader::{ReaderConfig, ReaderEvent, ReaderService};
use rstest::rstest;

#[rstest]
#[case("04ab12cd", "04AB12CD")]
#[case("04:ab:12:cd", "04AB12CD")]
#[case(" a6-86-05-88 ", "A6860588")]
#[case("f1 00 00 7b", "F100007B")]
#[tokio::test(start_paused = true)]
async fn test_simulated_scan_sets_status(#[case] raw: &str, #[case] normalized: &str) {
    let (reader, _device) = spawn_reader(manual_config());

    let card = reader.simulate_scan(raw, None).await.unwrap();
    assert_eq!(card.card_id.as_str(), normalized);
    assert_eq!(card.source, ScanSource::Simulated);

    let status = reader.status().await.unwrap();
    assert!(status.card_present);
    assert_eq!(status.card_id.as_deref(), Some(normalized));
    assert_eq!(status.card_type, Some(card.card_type));
}

#[tokio::test(start_paused = true)]
async fn test_simulated_scan_card_type() {
    let (reader, _device) = spawn_reader(manual_config());

    let card = reader.simulate_scan("04AB", None).await.unwrap();
    assert_eq!(card.card_type, "Student Card");

    let card = reader.simulate_scan("04AB", Some("MIFARE 4KB")).await.unwrap();
    assert_eq!(card.card_type, "MIFARE 4KB");

    let card = reader.simulate_scan("04AB", Some("  ")).await.unwrap();
    assert_eq!(card.card_type, "Student Card");
}

#[tokio::test(start_paused = true)]
async fn test_simulated_scan_validation() {
    let (reader, _device) = spawn_reader(manual_config());

    let error = reader.simulate_scan("", None).await.unwrap_err();
    assert!(matches!(error, Error::MissingField(ref field) if field == "cardId"));

    let error = reader.simulate_scan("04AB!", None).await.unwrap_err();
    assert!(matches!(error, Error::InvalidCardId(_)));
    assert!(error.is_validation());

    let status = reader.status().await.unwrap();
    assert!(!status.card_present);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_scan_reaches_subscribers() {
    let (reader, _device) = spawn_reader(manual_config());
    let mut events = reader.subscribe();

    let card = reader.simulate_scan("04AB", None).await.unwrap();
    assert_eq!(
        next_event(&mut events, "card_present").await,
        ReaderEvent::CardScanned(card)
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_card_times_out() {
    let (reader, _device) = spawn_reader(manual_config());

    let error = reader
        .read_card(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Timeout { duration_ms: 100 }));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_read_card_conflicts() {
    let (reader, _device) = spawn_reader(manual_config());

    let waiting = reader.clone();
    let first = tokio::spawn(async move { waiting.read_card(Some(Duration::from_secs(1))).await });
    tokio::task::yield_now().await;

    let second = reader.read_card(Some(Duration::from_secs(1))).await;
    assert!(matches!(second, Err(Error::Conflict)));

    let first = first.await.unwrap();
    assert!(matches!(first, Err(Error::Timeout { duration_ms: 1000 })));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_read_frees_slot() {
    let (reader, _device) = spawn_reader(manual_config());

    let waiting = reader.clone();
    let first = tokio::spawn(async move { waiting.read_card(Some(Duration::from_secs(30))).await });
    tokio::task::yield_now().await;
    first.abort();
    let _ = first.await;

    let error = reader
        .read_card(Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Timeout { duration_ms: 50 }));
}

#[tokio::test(start_paused = true)]
async fn test_read_card_returns_recent_card() {
    let (reader, _device) = spawn_reader(manual_config());
    reader.simulate_scan("A6860588", None).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    let card = reader.read_card(Some(Duration::from_millis(10))).await.unwrap();
    assert_eq!(card.card_id.as_str(), "A6860588");

    // Outside the recent-card window the caller has to wait again.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let result = reader.read_card(Some(Duration::from_millis(10))).await;
    assert!(matches!(result, Err(Error::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_read_card_waits_for_reader() {
    let (reader, device) = spawn_reader(manual_config());
    reader.connect(PORT, None).await.unwrap();

    let waiting = reader.clone();
    let read = tokio::spawn(async move { waiting.read_card(Some(Duration::from_secs(5))).await });
    tokio::task::yield_now().await;
    reader.status().await.unwrap();
    assert!(device.written().contains(&DeviceCommand::Scan));

    device.send_line("CARD_DETECTED:F1:22:33:44").await.unwrap();
    let card = read.await.unwrap().unwrap();
    assert_eq!(card.card_id.as_str(), "F1223344");
    assert_eq!(card.card_type, "MIFARE");
}

#[tokio::test(start_paused = true)]
async fn test_pending_read_fails_on_shutdown() {
    let (reader, _device) = spawn_reader(manual_config());

    let waiting = reader.clone();
    let read = tokio::spawn(async move { waiting.read_card(None).await });
    tokio::task::yield_now().await;

    reader.shutdown().await;
    assert!(matches!(read.await.unwrap(), Err(Error::ServiceStopped)));
}

#[tokio::test(start_paused = true)]
async fn test_mock_mode_scenario() {
    let reader = ReaderService::spawn(ReaderConfig::default(), AnyTransport::detect(true));

    assert!(reader.list_ports().await.unwrap().is_empty());
    assert!(!reader.connect("/dev/any", None).await.unwrap());

    let status = reader.status().await.unwrap();
    assert!(status.mock_mode);
    assert!(!status.connected);

    reader.simulate_scan("04AB", None).await.unwrap();
    let status = reader.status().await.unwrap();
    assert!(!status.connected);
    assert!(status.card_present);
    assert_eq!(status.card_id.as_deref(), Some("04AB"));

    // Mock mode never schedules reconnects.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(reader.status().await.unwrap().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_listener_until_removed() {
    let (reader, _device) = spawn_reader(manual_config());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let listener = reader.add_listener(move |event| {
        if let ReaderEvent::CardScanned(card) = event {
            sink.lock().unwrap().push(card.card_id.to_string());
        }
    });

    reader.simulate_scan("04AB", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["04AB"]);

    listener.remove();
    reader.simulate_scan("7B01", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}
