use labkey_core::CardId;
use serde::Serialize;

/// Status fields reported by the reader.
///
/// Every field is optional: text firmware only says `READER_READY`, the JSON
/// firmware also reports its version and uptime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub message: Option<String>,
    pub firmware: Option<String>,
    pub uptime: Option<u64>,
}

impl StatusReport {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// What the reader knows about a card in its field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CardPresence {
    /// The UID was read. `card_type` is `None` when the line did not say.
    Identified {
        card_id: CardId,
        card_type: Option<String>,
    },
    /// A card is in the field but only its type was reported so far; the
    /// UID has to be requested explicitly.
    UidPending { card_type: String },
}

/// A single line from the reader, classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParsedMessage {
    Status(StatusReport),
    CardPresent(CardPresence),
    CardRemoved,
    ReaderError(String),
    /// Anything the parser could not make sense of, kept verbatim.
    Unrecognized(String),
}

impl ParsedMessage {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedMessage::Status(_) => "status",
            ParsedMessage::CardPresent(CardPresence::Identified { .. }) => "card_present",
            ParsedMessage::CardPresent(CardPresence::UidPending { .. }) => "uid_pending",
            ParsedMessage::CardRemoved => "card_removed",
            ParsedMessage::ReaderError(_) => "error",
            ParsedMessage::Unrecognized(_) => "unrecognized",
        }
    }

    /// Convenience constructor for an identified card.
    pub fn identified(card_id: CardId, card_type: Option<String>) -> Self {
        ParsedMessage::CardPresent(CardPresence::Identified { card_id, card_type })
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, ParsedMessage::Unrecognized(_))
    }
}
