//! Structured Logging via tracing-subscriber
//!
//! Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei:
//! - `PARLEY_LOG_LEVEL`: Filter-Direktive (z.B. `info`, `parley_voice=debug`)
//! - `PARLEY_LOG_FORMAT`: `text` oder `json`

use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "PARLEY_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "PARLEY_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anders => Err(format!("Unbekanntes Log-Format: {anders}")),
        }
    }
}

/// Effektive Log-Einstellungen nach Auswertung der Umgebung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEinstellungen {
    pub filter: String,
    pub format: LogFormat,
}

impl LogEinstellungen {
    /// Kombiniert Konfigurationswerte mit optionalen Umgebungswerten.
    /// Ungueltige Formate fallen auf `text` zurueck.
    pub fn aufloesen(
        level: &str,
        format: &str,
        env_level: Option<String>,
        env_format: Option<String>,
    ) -> Self {
        let filter = env_level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| level.to_string());
        let format = env_format
            .as_deref()
            .unwrap_or(format)
            .parse()
            .unwrap_or_default();
        Self { filter, format }
    }

    /// Liest `PARLEY_LOG_LEVEL` / `PARLEY_LOG_FORMAT` aus der Umgebung
    pub fn aus_umgebung(level: &str, format: &str) -> Self {
        Self::aufloesen(
            level,
            format,
            std::env::var(ENV_LOG_LEVEL).ok(),
            std::env::var(ENV_LOG_FORMAT).ok(),
        )
    }
}

/// Initialisiert das Logging-System.
///
/// Ein ungueltiger Filter faellt auf `info` zurueck. Ein zweiter Aufruf
/// (z.B. in Tests) ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let einstellungen = LogEinstellungen::aus_umgebung(level, format);
    let filter = EnvFilter::try_new(&einstellungen.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match einstellungen.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsen() {
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("JSON".parse::<LogFormat>().is_err());
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn umgebung_hat_vorrang() {
        let e = LogEinstellungen::aufloesen(
            "info",
            "text",
            Some("parley_voice=debug".into()),
            Some("json".into()),
        );
        assert_eq!(e.filter, "parley_voice=debug");
        assert_eq!(e.format, LogFormat::Json);
    }

    #[test]
    fn fallback_auf_konfiguration() {
        let e = LogEinstellungen::aufloesen("warn", "json", None, Some(" ".into()));
        assert_eq!(e.filter, "warn");
        // " " ist kein gueltiges Format -> text
        assert_eq!(e.format, LogFormat::Text);

        let e = LogEinstellungen::aufloesen("debug", "json", Some("".into()), None);
        assert_eq!(e.filter, "debug");
        assert_eq!(e.format, LogFormat::Json);
    }

    #[test]
    fn log_level_werte() {
        assert!(log_level_gueltig("trace"));
        assert!(log_level_gueltig("error"));
        assert!(!log_level_gueltig("INFO"));
        assert!(!log_level_gueltig("verbose"));
    }

    #[test]
    fn doppelte_initialisierung_ist_harmlos() {
        logging_initialisieren("info", "text");
        logging_initialisieren("debug", "json");
    }
}
