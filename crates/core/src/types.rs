//! Gemeinsame Identifikationstypen fuer Parley
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::ParleyError;

/// Maximale Laenge einer UserId in Bytes
pub const USER_ID_MAX_LAENGE: usize = 128;

/// Benutzer-ID
///
/// Kommt von aussen (HTTP-Body, Registrierungs-Frame) und wird als
/// Dateiname fuer Aufnahmen verwendet. Deshalb sind nur Zeichen erlaubt,
/// die keinen Pfad bilden koennen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validiert und erstellt eine UserId
    pub fn neu(id: impl Into<String>) -> Result<Self, ParleyError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ParleyError::Validierung("UserId darf nicht leer sein".into()));
        }
        if id.len() > USER_ID_MAX_LAENGE {
            return Err(ParleyError::Validierung(format!(
                "UserId laenger als {USER_ID_MAX_LAENGE} Bytes"
            )));
        }
        if id == "." || id == ".." {
            return Err(ParleyError::Validierung(format!("Ungueltige UserId: {id}")));
        }
        let erlaubt = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if !erlaubt {
            return Err(ParleyError::Validierung(format!(
                "UserId enthaelt unerlaubte Zeichen: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ParleyError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::neu(id)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Eindeutige Session-ID (wird dem Client auch als Token ausgehaendigt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for SessionId {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParleyError::Validierung(format!("Ungueltige SessionId: {s:?}")))
    }
}

// Ohne Praefix: landet in Verzeichnis- und Dateinamen der Aufnahmen
impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globaler Transport-Zaehler, beginnt bei 1
static TRANSPORT_ZAEHLER: AtomicU64 = AtomicU64::new(1);

/// Prozessweit eindeutige ID einer Transport-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl TransportId {
    /// Vergibt die naechste freie TransportId
    pub fn naechste() -> Self {
        Self(TRANSPORT_ZAEHLER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_gueltig() {
        let uid = UserId::neu("alice_01").unwrap();
        assert_eq!(uid.as_str(), "alice_01");
        assert_eq!(uid.to_string(), "alice_01");
    }

    #[test]
    fn user_id_lehnt_pfade_ab() {
        assert!(UserId::neu("").is_err());
        assert!(UserId::neu("..").is_err());
        assert!(UserId::neu("../etc").is_err());
        assert!(UserId::neu("a/b").is_err());
        assert!(UserId::neu("a\\b").is_err());
        assert!(UserId::neu("x".repeat(USER_ID_MAX_LAENGE + 1)).is_err());
    }

    #[test]
    fn user_id_aus_json() {
        let uid: UserId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(uid.as_str(), "bob");
        assert!(serde_json::from_str::<UserId>("\"a/b\"").is_err());
    }

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn session_id_parse_und_display() {
        let sid = SessionId::new();
        let geparst: SessionId = sid.to_string().parse().unwrap();
        assert_eq!(sid, geparst);
        assert!("kein-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn transport_id_monoton_steigend() {
        let a = TransportId::naechste();
        let b = TransportId::naechste();
        assert!(b > a);
        assert!(a.to_string().starts_with("transport:"));
    }
}
