//! Property-based tests for the reader line parser.
//!
//! The parser sees whatever the serial line produces, so it has to be total:
//! any input yields at most one message and never panics.

use labkey_core::CardId;
use labkey_protocol::{CardPresence, ParsedMessage, parse_line};
use proptest::prelude::*;

/// Strategy for UIDs of 4 to 10 bytes, as printed by the reader.
fn uid_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 4..=10)
}

/// Strategy for card type labels that are never mistaken for hex bytes.
fn card_type() -> impl Strategy<Value = String> {
    prop::string::string_regex("(MIFARE|NTAG|ISO)_[A-Z0-9]{1,4}")
        .expect("Failed to create card type regex strategy")
}

fn hex(bytes: &[u8], separator: &str) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(separator)
}

proptest! {
    /// Property: the parser never panics and never returns a message for blank input.
    #[test]
    fn prop_parser_is_total(line in ".{0,200}") {
        match parse_line(&line) {
            None => prop_assert!(line.trim().is_empty()),
            Some(_) => prop_assert!(!line.trim().is_empty()),
        }
    }

    /// Property: the text and JSON firmware dialects describe the same card identically.
    #[test]
    fn prop_text_and_json_card_lines_agree(bytes in uid_bytes(), card_type in card_type()) {
        let text = format!("CARD_DETECTED:{}:{}", hex(&bytes, ":"), card_type);
        let json = format!(
            r#"{{"type":"card","card_id":"{}","card_type":"{}"}}"#,
            hex(&bytes, ""),
            card_type
        );

        let from_text = parse_line(&text);
        prop_assert!(from_text.is_some());
        prop_assert_eq!(from_text, parse_line(&json));
    }

    /// Property: a bare UID line is identified regardless of separator and case.
    #[test]
    fn prop_uid_lines_normalize(bytes in uid_bytes(), separator in prop_oneof![Just(""), Just(":"), Just(" ")]) {
        let line = format!("Card UID: {}", hex(&bytes, separator).to_lowercase());
        let expected = CardId::new(&hex(&bytes, "")).unwrap();

        match parse_line(&line) {
            Some(ParsedMessage::CardPresent(CardPresence::Identified { card_id, card_type })) => {
                prop_assert_eq!(card_id, expected);
                prop_assert!(card_type.is_none());
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
