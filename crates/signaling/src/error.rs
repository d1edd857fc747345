//! Fehlertypen fuer Gateway und HTTP-Schnittstelle

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_core::ParleyError;
use serde_json::json;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Protokollfehler (unbekannter Nachrichtentyp, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Text-Frame ist kein gueltiges JSON
    #[error("Ungueltiges JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Fehler aus Matchmaking, Registry oder Aufnahme
    #[error(transparent)]
    Parley(#[from] ParleyError),
}

impl SignalingError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Soll der Client es spaeter erneut versuchen?
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Parley(e) if e.ist_wiederholbar())
    }

    fn status_und_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Protokoll(_) | Self::Json(_) => (StatusCode::BAD_REQUEST, "invalid-request"),
            Self::Parley(e) => (
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.code(),
            ),
        }
    }
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_und_code();
        if status.is_server_error() && !self.ist_wiederholbar() {
            tracing::error!(fehler = %self, "Interner Fehler bei HTTP-Anfrage");
        }
        (
            status,
            Json(json!({
                "error": code,
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let e = SignalingError::from(ParleyError::BereitsWartend("a".into()));
        assert_eq!(e.status_und_code(), (StatusCode::BAD_REQUEST, "already-pending"));

        let e = SignalingError::from(ParleyError::KeinGegner);
        assert_eq!(
            e.status_und_code(),
            (StatusCode::SERVICE_UNAVAILABLE, "match-failed-retry")
        );

        let e = SignalingError::protokoll("kaputt");
        assert_eq!(e.status_und_code().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wiederholbare_fehler() {
        assert!(SignalingError::from(ParleyError::KeinGegner).ist_wiederholbar());
        assert!(SignalingError::from(ParleyError::PaarungsKonflikt("b".into())).ist_wiederholbar());
        assert!(!SignalingError::from(ParleyError::BereitsWartend("a".into())).ist_wiederholbar());
        assert!(!SignalingError::protokoll("kaputt").ist_wiederholbar());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "platte voll");
        let e = SignalingError::from(ParleyError::from(io));
        assert!(!e.ist_wiederholbar());
        assert_eq!(e.status_und_code(), (StatusCode::INTERNAL_SERVER_ERROR, "internal-error"));
    }
}
