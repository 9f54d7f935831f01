//! Reader service for the Arduino RFID bridge.
//!
//! Owns the connection to the reader and turns its lines into
//! [`ReaderEvent`]s:
//!
//! - [`ReaderService`]: the single task owning the transport and all state
//! - [`ReaderHandle`]: cloneable command surface injected into the HTTP layer
//! - [`EventBus`]: broadcast fan-out of reader events
//! - [`ReaderStateMachine`]: connection and card state with a checked
//!   transition table
//!
//! # Example
//!
//! ```
//! use labkey_hardware::mock::ScriptedTransport;
//! use labkey_reader::{ReaderConfig, ReaderService};
//!
//! #[tokio::main]
//! async fn main() -> labkey_core::Result<()> {
//!     let (transport, _device) = ScriptedTransport::new();
//!     let config = ReaderConfig {
//!         auto_connect: false,
//!         ..ReaderConfig::default()
//!     };
//!     let reader = ReaderService::spawn(config, transport);
//!
//!     let card = reader.simulate_scan("04:ab:12:cd", None).await?;
//!     assert_eq!(card.card_id.as_str(), "04AB12CD");
//!     assert!(reader.status().await?.card_present);
//!
//!     reader.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod event;
pub mod handle;
pub mod service;
pub mod state_machine;

pub use bus::{EventBus, ListenerHandle};
pub use config::{ConfigError, ReaderConfig};
pub use event::{ReaderEvent, StatusSnapshot, TransitionRecord};
pub use handle::{ReaderHandle, ResetOutcome};
pub use service::ReaderService;
pub use state_machine::{CardState, ConnectionState, ReaderStateMachine, StateTransition};
