//! TransportGateway – Ereignisse einer Transport-Verbindung
//!
//! Der Gateway ist die einzige Stelle, an der ein Transport (WebSocket oder
//! ein anderes Backend) mit Registry und Relay spricht. Jedes Backend meldet
//! nur Lebenszyklus-Ereignisse, die Logik dahinter ist transport-agnostisch.
//!
//! ```text
//! verbunden -> text_empfangen(register) -> binaer_empfangen* -> geschlossen
//!                                                  |
//!                                          transport_fehler
//! ```

use bytes::Bytes;
use parley_voice::{
    RelayEngine, RelayErgebnis, SchliessGrund, SessionInfo, SessionRegistry, SessionZustand,
    TransportHandle,
};

use crate::error::{SignalingError, SignalingResult};
use crate::message::ClientNachricht;

/// Verbindet Transport-Ereignisse mit Registry und Relay
#[derive(Clone)]
pub struct TransportGateway {
    registry: SessionRegistry,
    relay: RelayEngine,
}

impl TransportGateway {
    pub fn neu(registry: SessionRegistry, relay: RelayEngine) -> Self {
        Self { registry, relay }
    }

    /// Neue Verbindung (onConnect). Aendert keinen Zustand, die
    /// Registrierung folgt als erste Text-Nachricht.
    pub fn verbunden(&self, transport: &TransportHandle) {
        tracing::info!(transport = %transport.id(), "Transport verbunden, warte auf Registrierung");
    }

    /// Text-Nachricht (onMessage)
    ///
    /// Ungueltige Nachrichten und Registrierungen fuer unbekannte Sessions
    /// werden geloggt und ignoriert. Die Verbindung bleibt offen.
    pub fn text_empfangen(
        &self,
        transport: &TransportHandle,
        text: &str,
    ) -> SignalingResult<SessionZustand> {
        let transport_id = transport.id();

        if let Some((session_id, user_id)) = self.registry.transport_bindung(transport_id) {
            tracing::warn!(
                transport = %transport_id,
                session_id = %session_id,
                user_id = %user_id,
                "Erneute Registrierung auf gebundenem Transport ignoriert"
            );
            return Err(SignalingError::protokoll("Transport bereits registriert"));
        }

        let nachricht = ClientNachricht::dekodieren(text).map_err(|e| {
            tracing::warn!(transport = %transport_id, fehler = %e, "Ungueltige Text-Nachricht ignoriert");
            e
        })?;

        match nachricht {
            ClientNachricht::Register {
                user_id,
                session_id,
            } => {
                let zustand = self
                    .registry
                    .binden(session_id, &user_id, transport.clone())?;
                tracing::info!(
                    transport = %transport_id,
                    session_id = %session_id,
                    user_id = %user_id,
                    "Registrierung angenommen"
                );
                Ok(zustand)
            }
        }
    }

    /// Binaer-Frame (onBinary) – geht unveraendert an die Relay-Engine
    pub async fn binaer_empfangen(&self, transport: &TransportHandle, payload: Bytes) -> RelayErgebnis {
        self.relay.frame_empfangen(transport.id(), payload).await
    }

    /// Verbindung geschlossen (onClose)
    ///
    /// Loest nur den Slot. Die Session bleibt bestehen bis zum expliziten
    /// Disconnect, der Gegner kann weiterhin verbunden sein.
    pub fn geschlossen(&self, transport: &TransportHandle) {
        let transport_id = transport.id();
        match self.registry.transport_loesen(transport_id) {
            Some((session_id, user_id)) => {
                tracing::info!(
                    transport = %transport_id,
                    session_id = %session_id,
                    user_id = %user_id,
                    "Transport geschlossen"
                );
            }
            None => {
                tracing::debug!(transport = %transport_id, "Ungebundener Transport geschlossen");
            }
        }
    }

    /// Transportfehler (onTransportError) – schliesst mit Serverfehler-Status
    pub fn transport_fehler(&self, transport: &TransportHandle, fehler: &dyn std::fmt::Display) {
        tracing::warn!(transport = %transport.id(), fehler = %fehler, "Transportfehler");
        transport.schliessen(SchliessGrund::ServerFehler);
    }

    /// Schliesst beide Transports einer beendeten Session regulaer
    pub fn session_beendet(&self, info: &SessionInfo) {
        for transport in info.transports() {
            transport.schliessen(SchliessGrund::Normal);
        }
        tracing::debug!(session_id = %info.session_id, "Transports der Session geschlossen");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
