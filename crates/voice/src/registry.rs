//! SessionRegistry – Sessions, Teilnehmer-Slots und Transport-Index
//!
//! Eine Session bindet genau zwei verschiedene Benutzer. Jeder Benutzer hat
//! einen Slot, dem nach der Registrierung ein Transport zugeordnet wird.
//!
//! ## State Machine
//! ```text
//! Erstellt -> TeilweiseGebunden -> Aktiv -> Beendet
//!                  ^                 |
//!                  +--- Transport ---+
//!                       geschlossen
//! ```
//! `Beendet` ist endgueltig: die Session ist aus der Registry entfernt.
//!
//! ## Concurrency
//! Sessions, Benutzer-Index und Transport-Index liegen hinter einem
//! gemeinsamen Mutex. Erstellen, Binden und Beenden sind dadurch pro Session
//! serialisiert und Pruefen-und-Einfuegen ist atomar. IO (Finalisierung,
//! Transport-Hooks) passiert erst nach Freigabe des Locks.

use parking_lot::Mutex;
use parley_core::{ParleyError, Result, SessionId, TransportId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::recording::RecordingSink;
use crate::transport::{TransportHandle, VoiceTransport};

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Beide Slots ungebunden
    Erstellt,
    /// Ein Slot gebunden
    TeilweiseGebunden,
    /// Beide Slots gebunden, Relay aktiv
    Aktiv,
    /// Aus der Registry entfernt
    Beendet,
}

/// Nicht-besitzender Verweis auf den Transport eines Slots
///
/// Die Lebensdauer gehoert dem Transport-Adapter. Ist der Transport
/// verworfen, gilt der Slot als ungebunden.
#[derive(Clone)]
struct TransportVerweis {
    id: TransportId,
    transport: Weak<dyn VoiceTransport>,
}

impl TransportVerweis {
    fn neu(transport: &TransportHandle) -> Self {
        Self {
            id: transport.id(),
            transport: Arc::downgrade(transport),
        }
    }

    fn lebt(&self) -> bool {
        self.transport.strong_count() > 0
    }
}

/// Teilnehmer-Slot einer Session
#[derive(Clone)]
pub struct ParticipantSlot {
    pub user_id: UserId,
    /// Gesetzt bei Registrierung
    verweis: Option<TransportVerweis>,
}

impl ParticipantSlot {
    fn neu(user_id: UserId) -> Self {
        Self {
            user_id,
            verweis: None,
        }
    }

    pub fn ist_gebunden(&self) -> bool {
        self.verweis.as_ref().is_some_and(TransportVerweis::lebt)
    }

    /// ID des gebundenen Transports, solange dieser noch existiert
    pub fn transport_id(&self) -> Option<TransportId> {
        self.verweis.as_ref().filter(|v| v.lebt()).map(|v| v.id)
    }

    /// Gebundener Transport, `None` wenn ungebunden oder bereits verworfen
    pub fn transport(&self) -> Option<TransportHandle> {
        self.verweis.as_ref().and_then(|v| v.transport.upgrade())
    }

    /// ID aus dem Verweis, auch wenn der Transport schon verworfen ist
    fn verweis_id(&self) -> Option<TransportId> {
        self.verweis.as_ref().map(|v| v.id)
    }
}

impl std::fmt::Debug for ParticipantSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantSlot")
            .field("user_id", &self.user_id)
            .field("transport", &self.transport_id())
            .finish()
    }
}

/// Momentaufnahme einer Session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub teilnehmer_a: ParticipantSlot,
    pub teilnehmer_b: ParticipantSlot,
    pub erstellt: Instant,
}

impl SessionInfo {
    fn neu(session_id: SessionId, a: UserId, b: UserId) -> Self {
        Self {
            session_id,
            teilnehmer_a: ParticipantSlot::neu(a),
            teilnehmer_b: ParticipantSlot::neu(b),
            erstellt: Instant::now(),
        }
    }

    /// Zustand aus den Slot-Bindungen abgeleitet
    pub fn zustand(&self) -> SessionZustand {
        match (self.teilnehmer_a.ist_gebunden(), self.teilnehmer_b.ist_gebunden()) {
            (false, false) => SessionZustand::Erstellt,
            (true, true) => SessionZustand::Aktiv,
            _ => SessionZustand::TeilweiseGebunden,
        }
    }

    pub fn slot(&self, user_id: &UserId) -> Option<&ParticipantSlot> {
        if &self.teilnehmer_a.user_id == user_id {
            Some(&self.teilnehmer_a)
        } else if &self.teilnehmer_b.user_id == user_id {
            Some(&self.teilnehmer_b)
        } else {
            None
        }
    }

    fn slot_mut(&mut self, user_id: &UserId) -> Option<&mut ParticipantSlot> {
        if &self.teilnehmer_a.user_id == user_id {
            Some(&mut self.teilnehmer_a)
        } else if &self.teilnehmer_b.user_id == user_id {
            Some(&mut self.teilnehmer_b)
        } else {
            None
        }
    }

    /// Slot des jeweils anderen Teilnehmers
    pub fn gegner_von(&self, user_id: &UserId) -> Option<&ParticipantSlot> {
        if &self.teilnehmer_a.user_id == user_id {
            Some(&self.teilnehmer_b)
        } else if &self.teilnehmer_b.user_id == user_id {
            Some(&self.teilnehmer_a)
        } else {
            None
        }
    }

    pub fn ist_teilnehmer(&self, user_id: &UserId) -> bool {
        self.slot(user_id).is_some()
    }

    /// Paart die Session genau diese zwei Benutzer?
    pub fn paart(&self, a: &UserId, b: &UserId) -> bool {
        a != b && self.ist_teilnehmer(a) && self.ist_teilnehmer(b)
    }

    /// Alle aktuell gebundenen Transports
    pub fn transports(&self) -> Vec<TransportHandle> {
        [&self.teilnehmer_a, &self.teilnehmer_b]
            .into_iter()
            .filter_map(ParticipantSlot::transport)
            .collect()
    }
}

/// Aufgeloestes Relay-Ziel fuer einen eingehenden Frame
#[derive(Clone)]
pub struct RelayZiel {
    pub session_id: SessionId,
    pub absender: UserId,
    /// Transport des Gegners, nur wenn die Session aktiv ist
    pub gegner: Option<TransportHandle>,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, SessionInfo>,
    /// Benutzer -> aktive Session
    user_index: HashMap<UserId, SessionId>,
    /// Transport -> (Session, Benutzer)
    transport_index: HashMap<TransportId, (SessionId, UserId)>,
}

impl RegistryInner {
    /// Session und Absender eines Transports, dazu der Gegner-Slot wenn
    /// beide Seiten gebunden sind
    fn gegner_slot(
        &self,
        transport_id: TransportId,
    ) -> Option<(SessionId, &UserId, Option<&ParticipantSlot>)> {
        let (session_id, user_id) = self.transport_index.get(&transport_id)?;
        let session = self.sessions.get(session_id)?;
        let gegner = if session.zustand() == SessionZustand::Aktiv {
            session.gegner_von(user_id)
        } else {
            None
        };
        Some((*session_id, user_id, gegner))
    }
}

/// Zentrale Registry aller aktiven Sessions
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    aufnahme: Option<RecordingSink>,
    finalisierungs_fehler: Arc<AtomicU64>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry. Ohne `aufnahme` wird beim Beenden
    /// nichts finalisiert.
    pub fn neu(aufnahme: Option<RecordingSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            aufnahme,
            finalisierungs_fehler: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Legt eine Session fuer zwei Benutzer an (createSession)
    ///
    /// Schlaegt mit `PaarungsKonflikt` fehl wenn einer der beiden bereits
    /// eine aktive Session hat. Von zwei gleichzeitigen Aufrufen fuer
    /// ueberlappende Benutzer gewinnt genau einer.
    pub fn session_erstellen(&self, a: &UserId, b: &UserId) -> Result<SessionId> {
        if a == b {
            return Err(ParleyError::Validierung(format!(
                "Benutzer {a} kann nicht mit sich selbst gepaart werden"
            )));
        }

        let session_id = SessionId::new();
        {
            let mut inner = self.inner.lock();
            if let Some(belegt) = [a, b].into_iter().find(|u| inner.user_index.contains_key(*u)) {
                tracing::debug!(user_id = %belegt, "Session-Erstellung abgelehnt, Benutzer belegt");
                return Err(ParleyError::PaarungsKonflikt(belegt.to_string()));
            }
            inner
                .sessions
                .insert(session_id, SessionInfo::neu(session_id, a.clone(), b.clone()));
            inner.user_index.insert(a.clone(), session_id);
            inner.user_index.insert(b.clone(), session_id);
        }

        tracing::info!(
            session_id = %session_id,
            teilnehmer_a = %a,
            teilnehmer_b = %b,
            "Session erstellt"
        );
        Ok(session_id)
    }

    /// Ordnet einen Transport dem Slot von `user_id` zu (bind)
    ///
    /// Unbekannte Session, fremder Benutzer oder ein bereits anders belegter
    /// Slot fuehren zu einer Warnung und aendern nichts. Dasselbe Binden
    /// zweimal ist ein No-op. Ein Slot dessen Transport verworfen wurde,
    /// ohne geloest zu werden, darf neu gebunden werden.
    pub fn binden(
        &self,
        session_id: SessionId,
        user_id: &UserId,
        transport: TransportHandle,
    ) -> Result<SessionZustand> {
        let transport_id = transport.id();
        let zustand = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if let Some((sid, uid)) = inner.transport_index.get(&transport_id) {
                if *sid != session_id || uid != user_id {
                    tracing::warn!(
                        transport = %transport_id,
                        session_id = %sid,
                        user_id = %uid,
                        "Transport ist bereits einem anderen Slot zugeordnet"
                    );
                    return Err(ParleyError::Validierung(format!(
                        "{transport_id} bereits gebunden"
                    )));
                }
            }

            let Some(session) = inner.sessions.get_mut(&session_id) else {
                tracing::warn!(session_id = %session_id, user_id = %user_id, "Binden: Session unbekannt");
                return Err(ParleyError::Validierung(format!(
                    "Session {session_id} unbekannt"
                )));
            };
            let Some(slot) = session.slot_mut(user_id) else {
                tracing::warn!(
                    session_id = %session_id,
                    user_id = %user_id,
                    "Binden: Benutzer ist kein Teilnehmer"
                );
                return Err(ParleyError::Validierung(format!(
                    "{user_id} ist kein Teilnehmer von {session_id}"
                )));
            };

            let bisher = slot.verweis.as_ref().map(|v| (v.id, v.lebt()));
            let verwaist = match bisher {
                Some((vorhanden, _)) if vorhanden == transport_id => {
                    return Ok(session.zustand());
                }
                Some((alt, false)) => Some(alt),
                Some((vorhanden, true)) => {
                    tracing::warn!(
                        session_id = %session_id,
                        user_id = %user_id,
                        vorhanden = %vorhanden,
                        neu = %transport_id,
                        "Binden: Slot bereits an anderen Transport gebunden"
                    );
                    return Err(ParleyError::Validierung(format!(
                        "Slot von {user_id} bereits gebunden"
                    )));
                }
                None => None,
            };

            slot.verweis = Some(TransportVerweis::neu(&transport));
            let zustand = session.zustand();
            if let Some(alt) = verwaist {
                tracing::debug!(
                    session_id = %session_id,
                    user_id = %user_id,
                    alt = %alt,
                    "Verworfenen Transport im Slot ersetzt"
                );
                inner.transport_index.remove(&alt);
            }
            inner
                .transport_index
                .insert(transport_id, (session_id, user_id.clone()));
            zustand
        };

        transport.gebunden(session_id, user_id);
        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            transport = %transport_id,
            zustand = ?zustand,
            "Transport gebunden"
        );
        Ok(zustand)
    }

    /// Loest einen Transport aus seinem Slot (Transport geschlossen)
    ///
    /// Die Session bleibt bestehen, der Gegner kann weiter verbunden sein.
    pub fn transport_loesen(&self, transport_id: TransportId) -> Option<(SessionId, UserId)> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let (session_id, user_id) = inner.transport_index.remove(&transport_id)?;

        if let Some(slot) = inner
            .sessions
            .get_mut(&session_id)
            .and_then(|s| s.slot_mut(&user_id))
        {
            if slot.verweis_id() == Some(transport_id) {
                slot.verweis = None;
            }
        }
        drop(guard);

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            transport = %transport_id,
            "Transport geloest"
        );
        Some((session_id, user_id))
    }

    /// Slot des Gegners, nur wenn beide Seiten gebunden sind (resolveOpponent)
    pub fn gegner_aufloesen(&self, transport_id: TransportId) -> Option<ParticipantSlot> {
        let inner = self.inner.lock();
        let (_, _, gegner) = inner.gegner_slot(transport_id)?;
        gegner.cloned()
    }

    /// Absender, Session und ggf. Gegner-Transport in einem Lock-Durchgang
    pub fn relay_ziel(&self, transport_id: TransportId) -> Option<RelayZiel> {
        let inner = self.inner.lock();
        let (session_id, absender, gegner) = inner.gegner_slot(transport_id)?;
        Some(RelayZiel {
            session_id,
            absender: absender.clone(),
            gegner: gegner.and_then(ParticipantSlot::transport),
        })
    }

    /// Beendet eine Session (terminate)
    ///
    /// Entfernt sie samt Index-Eintraegen und stoesst die Finalisierung der
    /// Aufnahmen an. Transports werden nicht geschlossen: die zurueckgegebene
    /// Momentaufnahme enthaelt sie, damit der Aufrufer das erledigen kann.
    /// Nur der erste Aufruf pro Session liefert `Some`.
    pub async fn beenden(&self, session_id: SessionId) -> Option<SessionInfo> {
        let info = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let info = inner.sessions.remove(&session_id)?;
            for slot in [&info.teilnehmer_a, &info.teilnehmer_b] {
                inner.user_index.remove(&slot.user_id);
                if let Some(tid) = slot.verweis_id() {
                    inner.transport_index.remove(&tid);
                }
            }
            info
        };

        tracing::info!(
            session_id = %session_id,
            dauer_sek = info.erstellt.elapsed().as_secs(),
            "Session beendet"
        );

        if let Some(aufnahme) = &self.aufnahme {
            let bericht = aufnahme.finalisieren(session_id).await;
            if bericht.fehlgeschlagen > 0 {
                self.finalisierungs_fehler
                    .fetch_add(bericht.fehlgeschlagen as u64, Ordering::Relaxed);
                tracing::warn!(
                    session_id = %session_id,
                    fehlgeschlagen = bericht.fehlgeschlagen,
                    "Nicht alle Aufnahmen konnten finalisiert werden"
                );
            }
        }

        Some(info)
    }

    /// Aktive Session eines Benutzers
    pub fn session_von_user(&self, user_id: &UserId) -> Option<SessionId> {
        self.inner.lock().user_index.get(user_id).copied()
    }

    /// Session die genau diese zwei Benutzer paart
    pub fn session_fuer_paar(&self, a: &UserId, b: &UserId) -> Option<SessionId> {
        let inner = self.inner.lock();
        let session_id = inner.user_index.get(a)?;
        inner
            .sessions
            .get(session_id)
            .filter(|s| s.paart(a, b))
            .map(|s| s.session_id)
    }

    /// Momentaufnahme einer Session
    pub fn session(&self, session_id: SessionId) -> Option<SessionInfo> {
        self.inner.lock().sessions.get(&session_id).cloned()
    }

    /// Zustand einer Session, `Beendet` fuer unbekannte oder entfernte
    pub fn zustand(&self, session_id: SessionId) -> SessionZustand {
        self.inner
            .lock()
            .sessions
            .get(&session_id)
            .map(|s| s.zustand())
            .unwrap_or(SessionZustand::Beendet)
    }

    /// Session und Benutzer eines gebundenen Transports
    pub fn transport_bindung(&self, transport_id: TransportId) -> Option<(SessionId, UserId)> {
        self.inner.lock().transport_index.get(&transport_id).cloned()
    }

    /// Anzahl aktiver Sessions
    pub fn session_anzahl(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Aufnahmen die beim Beenden nicht finalisiert werden konnten
    pub fn finalisierungs_fehler(&self) -> u64 {
        self.finalisierungs_fehler.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
