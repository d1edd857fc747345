//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use parley_core::{ParleyError, Result};
use parley_signaling::EngineConfig;
use parley_voice::AufnahmeKonfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Pairing-Einstellungen
    pub matchmaking: MatchmakingEinstellungen,
    /// Aufnahme-Einstellungen
    pub aufnahme: AufnahmeEinstellungen,
    /// Transport-Einstellungen (Send-Queue, Frame-Groesse)
    pub transport: TransportEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Parley Server".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket
    pub http_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingEinstellungen {
    /// Maximale Wartezeit auf einen Gegner in Sekunden
    pub wartezeit_sek: u64,
}

impl Default for MatchmakingEinstellungen {
    fn default() -> Self {
        Self { wartezeit_sek: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AufnahmeEinstellungen {
    pub aktiviert: bool,
    /// Wurzelverzeichnis der Artefakte
    pub verzeichnis: PathBuf,
    /// Endung der fertigen Artefakte (ohne Punkt)
    pub endung: String,
}

impl Default for AufnahmeEinstellungen {
    fn default() -> Self {
        let standard = AufnahmeKonfig::default();
        Self {
            aktiviert: true,
            verzeichnis: standard.verzeichnis,
            endung: standard.endung,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportEinstellungen {
    /// Send-Queue-Groesse pro Transport (Frames)
    pub send_queue_groesse: usize,
    /// Maximale Groesse eines WebSocket-Frames in Bytes
    pub max_frame_bytes: usize,
}

impl Default for TransportEinstellungen {
    fn default() -> Self {
        let standard = EngineConfig::default();
        Self {
            send_queue_groesse: standard.send_queue_groesse,
            max_frame_bytes: standard.max_frame_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level bzw. Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Stellt `/metrics` und `/health` bereit
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn validieren(&self) -> Result<()> {
        if self.matchmaking.wartezeit_sek == 0 {
            return Err(ParleyError::Konfiguration(
                "matchmaking.wartezeit_sek muss groesser 0 sein".into(),
            ));
        }
        if self.transport.send_queue_groesse == 0 {
            return Err(ParleyError::Konfiguration(
                "transport.send_queue_groesse muss groesser 0 sein".into(),
            ));
        }
        if self.transport.max_frame_bytes == 0 {
            return Err(ParleyError::Konfiguration(
                "transport.max_frame_bytes muss groesser 0 sein".into(),
            ));
        }
        let endung = &self.aufnahme.endung;
        if endung.is_empty() || !endung.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParleyError::Konfiguration(format!(
                "aufnahme.endung ungueltig: '{endung}'"
            )));
        }
        if self.logging.format.parse::<parley_observability::LogFormat>().is_err() {
            return Err(ParleyError::Konfiguration(format!(
                "logging.format ungueltig: '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer HTTP und WebSocket zurueck
    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.http_port)
    }

    /// Einstellungen der Session-Engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            wartezeit: Duration::from_secs(self.matchmaking.wartezeit_sek),
            aufnahme: self.aufnahme.aktiviert.then(|| AufnahmeKonfig {
                verzeichnis: self.aufnahme.verzeichnis.clone(),
                endung: self.aufnahme.endung.clone(),
            }),
            send_queue_groesse: self.transport.send_queue_groesse,
            max_frame_bytes: self.transport.max_frame_bytes,
        }
    }
}
