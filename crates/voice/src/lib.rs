//! parley-voice – Sessions, Audio-Relay und Aufnahme
//!
//! ## Module
//! - [`transport`] – Capability-Trait einer Audio-Verbindung
//! - [`registry`] – Sessions, Teilnehmer-Slots, Transport-Index
//! - [`router`] – Relay-Engine fuer Binaer-Frames
//! - [`recording`] – Aufnahme pro Teilnehmer und Finalisierung

pub mod recording;
pub mod registry;
pub mod router;
pub mod transport;

pub use recording::{AufnahmeKonfig, FinalisierungsBericht, RecordingSink};
pub use registry::{ParticipantSlot, SessionInfo, SessionRegistry, SessionZustand};
pub use router::{RelayEngine, RelayErgebnis, RelayStand};
pub use transport::{
    QueueTransport, SchliessGrund, TransportError, TransportHandle, VoiceTransport,
    SEND_QUEUE_GROESSE,
};
