//! Reader line parser.
//!
//! Turns one line of reader output into at most one [`ParsedMessage`].
//!
//! # Recognized Shapes
//!
//! Structured lines are JSON objects with a `type` (or `cmd`) discriminator:
//!
//! ```text
//! {"type":"status","message":"Ready","firmware":"1.2.0","uptime":42}
//! {"type":"card","card_id":"A6860588","card_type":"MIFARE"}
//! {"type":"card_removed"}
//! {"type":"error","message":"Antenna fault"}
//! ```
//!
//! Everything else goes through an ordered list of heuristics, first match
//! wins:
//!
//! 1. explicit prefixes: `CARD_DETECTED:<id>[:<type>]`, `READER_STATUS:<text>`
//! 2. a hex UID of at least four bytes: `Card UID: A6 86 05 88`, `A6860588`
//! 3. a card type announcement: `Card Type: MIFARE 1KB`
//! 4. literal tokens: `CARD_REMOVED`, `READER_READY`, `READER_RESET_COMPLETE`
//!
//! A line that matches nothing is returned as [`ParsedMessage::Unrecognized`].
//! The parser never fails.
//!
//! # Examples
//!
//! ```
//! use labkey_protocol::{parse_line, CardPresence, ParsedMessage};
//!
//! let msg = parse_line("CARD_DETECTED:A6:86:05:88:MIFARE").unwrap();
//! match msg {
//!     ParsedMessage::CardPresent(CardPresence::Identified { card_id, card_type }) => {
//!         assert_eq!(card_id.as_str(), "A6860588");
//!         assert_eq!(card_type.as_deref(), Some("MIFARE"));
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! assert!(parse_line("   ").is_none());
//! ```

use std::sync::LazyLock;

use labkey_core::{CardId, constants::DEFAULT_CARD_TYPE};
use regex::Regex;
use serde_json::{Map, Value};

use crate::message::{CardPresence, ParsedMessage, StatusReport};

const CARD_DETECTED_PREFIX: &str = "CARD_DETECTED:";
const READER_STATUS_PREFIX: &str = "READER_STATUS:";

/// Four or more hex byte pairs, optionally separated by `:` or a space.
static UID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{2}(?:[: ]?[0-9a-f]{2}){3,}\b").expect("UID regex is valid")
});

/// Parse a single line from the reader.
///
/// Returns `None` for blank lines and exactly one message otherwise.
pub fn parse_line(line: &str) -> Option<ParsedMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(message) = parse_structured(line) {
        return Some(message);
    }

    let message = parse_prefixed(line)
        .or_else(|| parse_uid(line))
        .or_else(|| parse_card_type(line))
        .or_else(|| parse_token(line))
        .unwrap_or_else(|| ParsedMessage::Unrecognized(line.to_string()));

    Some(message)
}

/// Label a card by its UID prefix.
///
/// The lab issues cards from separate batches whose UIDs share a prefix.
///
/// ```
/// use labkey_core::CardId;
/// use labkey_protocol::classify_card;
///
/// assert_eq!(classify_card(&CardId::new("04A1B2C3").unwrap()), "Student Card");
/// assert_eq!(classify_card(&CardId::new("A6860588").unwrap()), "Unknown Card");
/// ```
pub fn classify_card(card_id: &CardId) -> &'static str {
    let id = card_id.as_str();
    if id.starts_with("04") {
        "Student Card"
    } else if id.starts_with("F1") {
        "Faculty Card"
    } else if id.starts_with("7B") {
        "Guest Card"
    } else {
        "Unknown Card"
    }
}

// ============================================================================
// Structured (JSON) lines
// ============================================================================

/// Returns `None` only when the line is not a JSON object at all.
fn parse_structured(line: &str) -> Option<ParsedMessage> {
    if !line.starts_with('{') {
        return None;
    }

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(line) else {
        return None;
    };

    let discriminator = string_field(&object, &["type", "cmd"]);
    let message = match discriminator.as_deref() {
        Some("status") => ParsedMessage::Status(StatusReport {
            message: string_field(&object, &["message", "status"]),
            firmware: string_field(&object, &["firmware", "firmware_version"]),
            uptime: object.get("uptime").and_then(uptime_value),
        }),
        Some("card") | Some("card_present") => {
            match string_field(&object, &["card_id", "cardId", "uid"])
                .and_then(|raw| CardId::new(&raw).ok())
            {
                Some(card_id) => {
                    let card_type = string_field(&object, &["card_type", "cardType"])
                        .unwrap_or_else(|| classify_card(&card_id).to_string());
                    ParsedMessage::identified(card_id, Some(card_type))
                }
                None => ParsedMessage::Unrecognized(line.to_string()),
            }
        }
        Some("card_removed") => ParsedMessage::CardRemoved,
        Some("error") => ParsedMessage::ReaderError(
            string_field(&object, &["message"])
                .unwrap_or_else(|| "Unknown reader error".to_string()),
        ),
        _ => ParsedMessage::Unrecognized(line.to_string()),
    };

    Some(message)
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn uptime_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Heuristics
// ============================================================================

fn parse_prefixed(line: &str) -> Option<ParsedMessage> {
    if let Some(rest) = line.strip_prefix(CARD_DETECTED_PREFIX) {
        return parse_card_detected(rest);
    }

    if let Some(text) = line.strip_prefix(READER_STATUS_PREFIX) {
        let text = text.trim();
        let report = if text.is_empty() {
            StatusReport::default()
        } else {
            StatusReport::with_message(text)
        };
        return Some(ParsedMessage::Status(report));
    }

    None
}

/// `<id>[:<type>]` where the id itself may be `:` separated.
fn parse_card_detected(rest: &str) -> Option<ParsedMessage> {
    let segments: Vec<&str> = rest
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let (id_segments, card_type) = match segments.as_slice() {
        [] => return None,
        [single] => (vec![*single], None),
        all if all.iter().all(|s| is_hex_byte(s)) => (all.to_vec(), None),
        [id @ .., last] => (id.to_vec(), Some(last.to_string())),
    };

    let card_id = CardId::new(&id_segments.concat()).ok()?;
    Some(ParsedMessage::identified(card_id, card_type))
}

fn is_hex_byte(segment: &str) -> bool {
    segment.len() == 2 && segment.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_uid(line: &str) -> Option<ParsedMessage> {
    let found = UID_REGEX.find(line)?;
    let card_id = CardId::new(found.as_str()).ok()?;
    Some(ParsedMessage::identified(card_id, None))
}

fn parse_card_type(line: &str) -> Option<ParsedMessage> {
    let lower = line.to_ascii_lowercase();

    let card_type = if let Some(pos) = lower.find("card type") {
        let after = line[pos + "card type".len()..]
            .trim_start_matches([':', ' '])
            .trim();
        if after.is_empty() {
            DEFAULT_CARD_TYPE.to_string()
        } else {
            after.to_string()
        }
    } else if let Some(pos) = line.find("MIFARE") {
        line[pos..].trim().to_string()
    } else {
        return None;
    };

    Some(ParsedMessage::CardPresent(CardPresence::UidPending { card_type }))
}

fn parse_token(line: &str) -> Option<ParsedMessage> {
    match line {
        "CARD_REMOVED" => Some(ParsedMessage::CardRemoved),
        "READER_READY" => Some(ParsedMessage::Status(StatusReport::with_message(
            "Reader ready",
        ))),
        "READER_RESET_COMPLETE" => Some(ParsedMessage::Status(StatusReport::with_message(
            "Reader reset complete",
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn identified(line: &str) -> (String, Option<String>) {
        match parse_line(line) {
            Some(ParsedMessage::CardPresent(CardPresence::Identified { card_id, card_type })) => {
                (card_id.to_string(), card_type)
            }
            other => panic!("expected identified card for {line:?}, got {other:?}"),
        }
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t")]
    fn test_blank_lines_yield_nothing(#[case] line: &str) {
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn test_structured_status() {
        let msg = parse_line(r#"{"type":"status","message":"Ready","firmware":"1.2.0","uptime":42}"#);
        assert_eq!(
            msg,
            Some(ParsedMessage::Status(StatusReport {
                message: Some("Ready".into()),
                firmware: Some("1.2.0".into()),
                uptime: Some(42),
            }))
        );
    }

    #[test]
    fn test_structured_status_via_cmd_key() {
        let msg = parse_line(r#"{"cmd":"status","status":"ok","uptime":"17"}"#);
        let Some(ParsedMessage::Status(report)) = msg else {
            panic!("expected status");
        };
        assert_eq!(report.message.as_deref(), Some("ok"));
        assert_eq!(report.uptime, Some(17));
    }

    #[rstest]
    #[case(r#"{"type":"card","card_id":"a6:86:05:88","card_type":"MIFARE"}"#, "A6860588", "MIFARE")]
    #[case(r#"{"type":"card_present","card_id":"04AB12CD"}"#, "04AB12CD", "Student Card")]
    #[case(r#"{"type":"card","card_id":"F1000001"}"#, "F1000001", "Faculty Card")]
    fn test_structured_card(#[case] line: &str, #[case] id: &str, #[case] card_type: &str) {
        let (card_id, parsed_type) = identified(line);
        assert_eq!(card_id, id);
        assert_eq!(parsed_type.as_deref(), Some(card_type));
    }

    #[test]
    fn test_structured_card_without_id_is_unrecognized() {
        let line = r#"{"type":"card","card_type":"MIFARE"}"#;
        assert_eq!(
            parse_line(line),
            Some(ParsedMessage::Unrecognized(line.to_string()))
        );
    }

    #[test]
    fn test_structured_removed_and_error() {
        assert_eq!(
            parse_line(r#"{"type":"card_removed"}"#),
            Some(ParsedMessage::CardRemoved)
        );
        assert_eq!(
            parse_line(r#"{"type":"error","message":"Antenna fault"}"#),
            Some(ParsedMessage::ReaderError("Antenna fault".into()))
        );
        assert_eq!(
            parse_line(r#"{"type":"error"}"#),
            Some(ParsedMessage::ReaderError("Unknown reader error".into()))
        );
    }

    #[test]
    fn test_structured_unknown_type_does_not_fall_through() {
        // Contains a UID-looking value, but structured lines never reach the heuristics.
        let line = r#"{"type":"debug","raw":"A6860588"}"#;
        assert_eq!(
            parse_line(line),
            Some(ParsedMessage::Unrecognized(line.to_string()))
        );
    }

    #[test]
    fn test_malformed_json_falls_through_to_heuristics() {
        let (card_id, _) = identified("{broken A6 86 05 88");
        assert_eq!(card_id, "A6860588");
    }

    #[rstest]
    #[case("CARD_DETECTED:A6:86:05:88:MIFARE", "A6860588", Some("MIFARE"))]
    #[case("CARD_DETECTED:A6860588:MIFARE_1K", "A6860588", Some("MIFARE_1K"))]
    #[case("CARD_DETECTED:A6:86:05:88", "A6860588", None)]
    #[case("CARD_DETECTED:SIMULATED123", "SIMULATED123", None)]
    #[case("CARD_DETECTED:04ab12cd:Student", "04AB12CD", Some("Student"))]
    fn test_card_detected_prefix(
        #[case] line: &str,
        #[case] id: &str,
        #[case] card_type: Option<&str>,
    ) {
        let (card_id, parsed_type) = identified(line);
        assert_eq!(card_id, id);
        assert_eq!(parsed_type.as_deref(), card_type);
    }

    #[test]
    fn test_reader_status_numbers_are_not_uids() {
        let msg = parse_line("READER_STATUS:uptime 12345678 ms");
        assert_eq!(
            msg,
            Some(ParsedMessage::Status(StatusReport::with_message(
                "uptime 12345678 ms"
            )))
        );
    }

    #[rstest]
    #[case("Card UID: A6 86 05 88", "A6860588")]
    #[case("UID: a6:86:05:88", "A6860588")]
    #[case("A6860588", "A6860588")]
    #[case("04 AB 12 CD 9F 33 80", "04AB12CD9F3380")]
    fn test_hex_uid_heuristic(#[case] line: &str, #[case] id: &str) {
        let (card_id, card_type) = identified(line);
        assert_eq!(card_id, id);
        assert!(card_type.is_none());
    }

    #[rstest]
    #[case("Card Type: MIFARE 1KB", "MIFARE 1KB")]
    #[case("card type: NTAG213", "NTAG213")]
    #[case("Card Type:", "MIFARE")]
    #[case("PICC type: MIFARE Ultralight", "MIFARE Ultralight")]
    fn test_card_type_heuristic(#[case] line: &str, #[case] expected: &str) {
        assert_eq!(
            parse_line(line),
            Some(ParsedMessage::CardPresent(CardPresence::UidPending {
                card_type: expected.to_string()
            }))
        );
    }

    #[test]
    fn test_literal_tokens() {
        assert_eq!(parse_line("CARD_REMOVED"), Some(ParsedMessage::CardRemoved));
        assert_eq!(
            parse_line("READER_READY\r"),
            Some(ParsedMessage::Status(StatusReport::with_message(
                "Reader ready"
            )))
        );
        assert_eq!(
            parse_line("READER_RESET_COMPLETE"),
            Some(ParsedMessage::Status(StatusReport::with_message(
                "Reader reset complete"
            )))
        );
    }

    #[rstest]
    #[case("Scan PICC to see UID")]
    #[case("A 1")]
    #[case("ABC 12")]
    fn test_unrecognized(#[case] line: &str) {
        assert_eq!(
            parse_line(line),
            Some(ParsedMessage::Unrecognized(line.to_string()))
        );
    }

    #[rstest]
    #[case("04A1B2C3", "Student Card")]
    #[case("F1ABCDEF", "Faculty Card")]
    #[case("7B000001", "Guest Card")]
    #[case("A6860588", "Unknown Card")]
    fn test_classify_card(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(classify_card(&CardId::new(id).unwrap()), expected);
    }
}
