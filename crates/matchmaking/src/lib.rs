//! parley-matchmaking – Pairing zweier wartender Benutzer
//!
//! ## Module
//! - [`queue`] – FIFO-Warteliste mit Rendezvous-Slot pro Ticket

pub mod queue;

pub use queue::{MatchQueue, STANDARD_WARTEZEIT};
