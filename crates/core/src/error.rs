//! Fehlertypen fuer Parley
//!
//! Zentraler Fehler-Enum der alle Fehlerklassen der Pairing- und
//! Relay-Engine abdeckt. Kein Fehler ist prozess-fatal: jeder bleibt auf
//! eine Session oder einen Frame begrenzt.

use thiserror::Error;

/// Globaler Result-Alias fuer Parley
pub type Result<T> = std::result::Result<T, ParleyError>;

/// Alle moeglichen Fehler im Parley-System
#[derive(Debug, Error)]
pub enum ParleyError {
    // --- Eingaben ---
    /// Unbekannte SessionId/UserId oder ungueltiges Format
    #[error("Validierung fehlgeschlagen: {0}")]
    Validierung(String),

    // --- Pairing ---
    /// Doppelte oder ueberlappende Session-Erstellung
    #[error("Pairing-Konflikt: {0} hat bereits eine aktive Session")]
    PaarungsKonflikt(String),

    #[error("Benutzer wartet bereits auf einen Gegner: {0}")]
    BereitsWartend(String),

    #[error("Benutzer ist bereits verbunden: {0}")]
    BereitsVerbunden(String),

    #[error("Benutzer ist nicht verbunden: {0}")]
    NichtVerbunden(String),

    /// Kein Gegner innerhalb der Wartezeit gefunden
    #[error("Kein Gegner gefunden, bitte spaeter erneut versuchen")]
    KeinGegner,

    // --- Transport ---
    /// Gegner ungebunden, geschlossen oder Send-Queue voll
    #[error("Transport nicht verfuegbar: {0}")]
    TransportNichtVerfuegbar(String),

    // --- Aufnahme ---
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl ParleyError {
    /// Gibt true zurueck wenn der Client es spaeter erneut versuchen sollte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::KeinGegner | Self::PaarungsKonflikt(_) | Self::TransportNichtVerfuegbar(_)
        )
    }

    /// HTTP-Statuscode an der Controller-Grenze
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validierung(_)
            | Self::BereitsWartend(_)
            | Self::BereitsVerbunden(_)
            | Self::NichtVerbunden(_) => 400,
            Self::PaarungsKonflikt(_) | Self::KeinGegner | Self::TransportNichtVerfuegbar(_) => 503,
            Self::Io(_) | Self::Konfiguration(_) => 500,
        }
    }

    /// Maschinenlesbarer Fehlercode fuer die HTTP-Antwort
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validierung(_) => "invalid-request",
            Self::BereitsWartend(_) => "already-pending",
            Self::BereitsVerbunden(_) => "already-connected",
            Self::NichtVerbunden(_) => "not-connected",
            Self::PaarungsKonflikt(_) | Self::KeinGegner => "match-failed-retry",
            Self::TransportNichtVerfuegbar(_) => "transport-unavailable",
            Self::Io(_) | Self::Konfiguration(_) => "internal-error",
        }
    }
}
