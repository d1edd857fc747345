//! RelayEngine – Weiterleitung von Audio-Frames an den Gegner
//!
//! Jeder Binaer-Frame eines gebundenen Transports wird unveraendert an den
//! Transport des Gegners gesendet und danach an die Aufnahme angehaengt.
//!
//! ## Design-Entscheidungen
//! - Best-effort: ungebundener oder geschlossener Gegner, volle Queue ->
//!   Frame wird verworfen (debug-Log), nie gepuffert oder wiederholt
//! - Weiterleitung passiert synchron vor dem Aufnahme-IO, dadurch bleibt
//!   die Reihenfolge pro Absender erhalten
//! - `Bytes` wird nur per Refcount geklont, kein Memcpy pro Frame

use bytes::Bytes;
use parley_core::{ParleyError, TransportId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::recording::RecordingSink;
use crate::registry::{RelayZiel, SessionRegistry};

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

/// Zaehler der Relay-Engine
#[derive(Debug, Default)]
pub struct RelayStatistik {
    weitergeleitet: AtomicU64,
    verworfen: AtomicU64,
    aufnahme_fehler: AtomicU64,
}

/// Momentaufnahme der Relay-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStand {
    pub weitergeleitet: u64,
    pub verworfen: u64,
    pub aufnahme_fehler: u64,
}

impl RelayStatistik {
    fn stand(&self) -> RelayStand {
        RelayStand {
            weitergeleitet: self.weitergeleitet.load(Ordering::Relaxed),
            verworfen: self.verworfen.load(Ordering::Relaxed),
            aufnahme_fehler: self.aufnahme_fehler.load(Ordering::Relaxed),
        }
    }
}

/// Ergebnis der Verarbeitung eines Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErgebnis {
    /// An den Gegner gesendet
    Weitergeleitet,
    /// Gegner nicht erreichbar, Frame verworfen (aber aufgenommen)
    Verworfen,
    /// Transport keiner Session zugeordnet
    Unbekannt,
}

// ---------------------------------------------------------------------------
// RelayEngine
// ---------------------------------------------------------------------------

/// Relay fuer Binaer-Frames zwischen den zwei Teilnehmern einer Session
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct RelayEngine {
    inner: Arc<RelayEngineInner>,
}

struct RelayEngineInner {
    registry: SessionRegistry,
    aufnahme: Option<RecordingSink>,
    statistik: RelayStatistik,
}

impl RelayEngine {
    pub fn neu(registry: SessionRegistry, aufnahme: Option<RecordingSink>) -> Self {
        Self {
            inner: Arc::new(RelayEngineInner {
                registry,
                aufnahme,
                statistik: RelayStatistik::default(),
            }),
        }
    }

    /// Verarbeitet einen eingehenden Binaer-Frame (onBinaryFrame)
    ///
    /// Wirft nie: jeder Fehler bleibt auf diesen einen Frame beschraenkt.
    pub async fn frame_empfangen(&self, transport_id: TransportId, payload: Bytes) -> RelayErgebnis {
        let Some(ziel) = self.inner.registry.relay_ziel(transport_id) else {
            tracing::debug!(transport = %transport_id, "Frame von ungebundenem Transport verworfen");
            return RelayErgebnis::Unbekannt;
        };

        let ergebnis = match weiterleiten(&ziel, payload.clone()) {
            Ok(()) => RelayErgebnis::Weitergeleitet,
            Err(e) => {
                tracing::debug!(
                    session_id = %ziel.session_id,
                    absender = %ziel.absender,
                    fehler = %e,
                    "Frame verworfen"
                );
                RelayErgebnis::Verworfen
            }
        };

        let zaehler = match ergebnis {
            RelayErgebnis::Weitergeleitet => &self.inner.statistik.weitergeleitet,
            _ => &self.inner.statistik.verworfen,
        };
        zaehler.fetch_add(1, Ordering::Relaxed);

        if let Some(aufnahme) = &self.inner.aufnahme {
            match aufnahme
                .chunk_anhaengen(ziel.session_id, &ziel.absender, &payload)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        session_id = %ziel.session_id,
                        absender = %ziel.absender,
                        "Session bereits finalisiert – Chunk nicht aufgenommen"
                    );
                }
                Err(e) => {
                    self.inner
                        .statistik
                        .aufnahme_fehler
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        session_id = %ziel.session_id,
                        absender = %ziel.absender,
                        fehler = %e,
                        "Aufnahme-Chunk konnte nicht geschrieben werden"
                    );
                }
            }
        }

        tracing::trace!(
            session_id = %ziel.session_id,
            absender = %ziel.absender,
            bytes = payload.len(),
            ergebnis = ?ergebnis,
            "Frame verarbeitet"
        );
        ergebnis
    }

    pub fn statistik(&self) -> RelayStand {
        self.inner.statistik.stand()
    }
}

/// Sendet an den Gegner, ohne zu puffern oder zu wiederholen
fn weiterleiten(ziel: &RelayZiel, payload: Bytes) -> Result<(), ParleyError> {
    let gegner = ziel
        .gegner
        .as_ref()
        .ok_or_else(|| ParleyError::TransportNichtVerfuegbar("Gegner nicht gebunden".into()))?;
    if !gegner.ist_offen() {
        return Err(ParleyError::TransportNichtVerfuegbar(format!(
            "{} geschlossen",
            gegner.id()
        )));
    }
    gegner.frame_senden(payload)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
