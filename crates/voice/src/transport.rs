//! Transport-Abstraktion – Faehigkeiten einer Audio-Verbindung
//!
//! Registry, Relay und Aufnahme kennen Verbindungen nur ueber
//! [`VoiceTransport`]. Ob dahinter ein WebSocket mit rohen Binaer-Frames
//! oder ein SFU-ausgehandelter Media-Stream steckt, ist fuer sie egal.
//!
//! [`QueueTransport`] ist die Standard-Implementierung: eine begrenzte
//! Send-Queue, aus der ein Writer-Task (WebSocket) oder ein Test liest.

use bytes::Bytes;
use parking_lot::Mutex;
use parley_core::{ParleyError, SessionId, TransportId, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Standard-Groesse der Send-Queue pro Transport (Frames)
pub const SEND_QUEUE_GROESSE: usize = 128;

/// Grund fuer das Schliessen eines Transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchliessGrund {
    /// Session regulaer beendet
    Normal,
    /// Transportfehler auf Serverseite
    ServerFehler,
}

impl SchliessGrund {
    /// WebSocket-Close-Code (RFC 6455)
    pub fn code(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::ServerFehler => 1011,
        }
    }

    pub fn beschreibung(&self) -> &'static str {
        match self {
            Self::Normal => "Session beendet",
            Self::ServerFehler => "Serverfehler",
        }
    }
}

/// Fehler beim Senden eines Frames
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport geschlossen")]
    Geschlossen,

    #[error("Send-Queue voll – Frame verworfen")]
    QueueVoll,
}

impl From<TransportError> for ParleyError {
    fn from(e: TransportError) -> Self {
        ParleyError::TransportNichtVerfuegbar(e.to_string())
    }
}

/// Faehigkeiten einer Audio-Verbindung
pub trait VoiceTransport: Send + Sync {
    /// Prozessweit eindeutige ID
    fn id(&self) -> TransportId;

    /// Wird aufgerufen nachdem der Transport einem Teilnehmer-Slot
    /// zugeordnet wurde (bindTransport)
    fn gebunden(&self, _session_id: SessionId, _user_id: &UserId) {}

    /// Sendet einen Binaer-Frame unveraendert und ohne zu blockieren
    fn frame_senden(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Ist die Verbindung noch offen?
    fn ist_offen(&self) -> bool;

    /// Schliesst die Verbindung. Mehrfaches Schliessen ist ein No-op.
    fn schliessen(&self, grund: SchliessGrund);
}

/// Geteilter, nicht-besitzender Verweis auf einen Transport
pub type TransportHandle = Arc<dyn VoiceTransport>;

// ---------------------------------------------------------------------------
// QueueTransport
// ---------------------------------------------------------------------------

/// Transport mit begrenzter Send-Queue
///
/// Frames landen per `try_send` in der Queue (UDP-Semantik: bei voller
/// Queue wird verworfen). Das Schliessen wird ueber einen `watch`-Kanal
/// an den Leser signalisiert.
pub struct QueueTransport {
    id: TransportId,
    send_tx: mpsc::Sender<Bytes>,
    offen: AtomicBool,
    schliess_tx: watch::Sender<Option<SchliessGrund>>,
    bindung: Mutex<Option<(SessionId, UserId)>>,
}

impl QueueTransport {
    /// Erstellt einen neuen Transport und gibt die Empfangs-Queue zurueck
    pub fn neu(queue_groesse: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (send_tx, send_rx) = mpsc::channel(queue_groesse.max(1));
        let (schliess_tx, _) = watch::channel(None);
        let transport = Arc::new(Self {
            id: TransportId::naechste(),
            send_tx,
            offen: AtomicBool::new(true),
            schliess_tx,
            bindung: Mutex::new(None),
        });
        (transport, send_rx)
    }

    /// Abonniert das Schliess-Signal
    pub fn schliess_signal(&self) -> watch::Receiver<Option<SchliessGrund>> {
        self.schliess_tx.subscribe()
    }

    /// Grund mit dem der Transport geschlossen wurde
    pub fn schliess_grund(&self) -> Option<SchliessGrund> {
        *self.schliess_tx.borrow()
    }

    /// Session und Benutzer denen der Transport zugeordnet wurde
    pub fn bindung(&self) -> Option<(SessionId, UserId)> {
        self.bindung.lock().clone()
    }
}

impl VoiceTransport for QueueTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn gebunden(&self, session_id: SessionId, user_id: &UserId) {
        *self.bindung.lock() = Some((session_id, user_id.clone()));
    }

    fn frame_senden(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.ist_offen() {
            return Err(TransportError::Geschlossen);
        }
        self.send_tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueVoll,
            mpsc::error::TrySendError::Closed(_) => TransportError::Geschlossen,
        })
    }

    fn ist_offen(&self) -> bool {
        self.offen.load(Ordering::Acquire) && !self.send_tx.is_closed()
    }

    fn schliessen(&self, grund: SchliessGrund) {
        if self.offen.swap(false, Ordering::AcqRel) {
            self.schliess_tx.send_replace(Some(grund));
            tracing::debug!(transport = %self.id, code = grund.code(), "Transport geschlossen");
        }
    }
}

impl std::fmt::Debug for QueueTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTransport")
            .field("id", &self.id)
            .field("offen", &self.ist_offen())
            .finish()
    }
}
