//! parley-signaling – Session-Engine und Transport-Schnittstelle
//!
//! Dieser Crate verbindet Matchmaking, Session-Registry und Relay zu einer
//! explizit konstruierten [`SessionEngine`] und stellt sie ueber HTTP und
//! WebSocket bereit.
//!
//! ## Architektur
//!
//! ```text
//! HTTP connect/disconnect ----> SessionEngine
//!                                 |  MatchQueue      (Pairing)
//!                                 |  SessionRegistry (Sessions, Slots)
//!                                 |  RelayEngine     (Frames -> Gegner)
//!                                 |  RecordingSink   (Aufnahme)
//!                                 v
//! WebSocket /api/speech/ws ---> TransportGateway
//!     Text   -> Registrierung (binden)
//!     Binaer -> Relay
//!     Close  -> Slot loesen
//! ```

pub mod engine;
pub mod error;
pub mod gateway;
pub mod http;
pub mod message;
pub mod ws;

// Bequeme Re-Exporte
pub use engine::{EngineConfig, EngineStand, SessionEngine, Verbindung, STANDARD_MAX_FRAME_BYTES};
pub use error::{SignalingError, SignalingResult};
pub use gateway::TransportGateway;
pub use http::speech_router;
pub use message::ClientNachricht;
