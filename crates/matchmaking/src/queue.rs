//! MatchQueue – FIFO-Warteliste mit Rendezvous
//!
//! Ein Benutzer der keinen wartenden Gegner vorfindet, legt ein
//! `WaitingTicket` an und wartet auf dessen Rendezvous-Slot. Ein spaeterer
//! Aufruf von `gegner_suchen` entnimmt das aelteste Ticket und loest den Slot
//! mit der eigenen UserId auf.
//!
//! ## Design-Entscheidungen
//! - Ein einziger `parking_lot::Mutex` um die Warteliste: Pruefen, Entnehmen
//!   und Signalisieren passieren unter demselben Lock.
//! - Der Slot ist ein `tokio::sync::oneshot`: genau eine Aufloesung.
//! - Match gegen Zeitlimit: wer das Ticket zuerst unter dem Lock anfasst,
//!   gewinnt. Findet der Wartende sein Ticket nach dem Zeitlimit nicht mehr,
//!   liegt das Ergebnis bereits im Slot.
//! - Der Lock wird nie ueber ein `.await` gehalten.

use parking_lot::Mutex;
use parley_core::{ParleyError, UserId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Wartezeit auf einen Gegner
pub const STANDARD_WARTEZEIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// WaitingTicket
// ---------------------------------------------------------------------------

/// Eintrag eines wartenden Benutzers
///
/// Existiert nur solange der Benutzer wartet. Wird beim Match oder beim
/// Zeitlimit zerstoert.
#[derive(Debug)]
struct WaitingTicket {
    ticket_id: u64,
    user_id: UserId,
    frist: Instant,
    slot: oneshot::Sender<UserId>,
}

impl WaitingTicket {
    /// Ein Ticket ist vermittelbar solange die Frist laeuft und der
    /// Wartende noch zuhoert
    fn vermittelbar(&self, jetzt: Instant) -> bool {
        jetzt < self.frist && !self.slot.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Warteliste
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Warteliste {
    tickets: VecDeque<WaitingTicket>,
}

impl Warteliste {
    fn enthaelt(&self, user_id: &UserId) -> bool {
        self.tickets.iter().any(|t| &t.user_id == user_id)
    }

    /// Entnimmt das aelteste vermittelbare Ticket und loest es mit `sucher` auf
    ///
    /// Tickets deren Wartender nicht mehr zuhoert werden dabei entsorgt.
    /// Abgelaufene Tickets bleiben liegen, ihr Wartender raeumt sie selbst ab.
    fn gegner_entnehmen(&mut self, sucher: &UserId) -> Option<UserId> {
        let jetzt = Instant::now();
        self.tickets.retain(|t| !t.slot.is_closed());

        loop {
            let index = self.tickets.iter().position(|t| t.vermittelbar(jetzt))?;
            if &self.tickets[index].user_id == sucher {
                return None;
            }

            let ticket = self.tickets.remove(index)?;
            let gegner = ticket.user_id;
            match ticket.slot.send(sucher.clone()) {
                Ok(()) => {
                    tracing::debug!(
                        ticket = ticket.ticket_id,
                        wartend = %gegner,
                        sucher = %sucher,
                        "Rendezvous aufgeloest"
                    );
                    return Some(gegner);
                }
                Err(_) => {
                    // Wartender hat zwischen Pruefung und Senden aufgegeben
                    tracing::debug!(ticket = ticket.ticket_id, "Slot geschlossen, naechstes Ticket");
                }
            }
        }
    }

    fn einreihen(
        &mut self,
        ticket_id: u64,
        user_id: UserId,
        timeout: Duration,
    ) -> oneshot::Receiver<UserId> {
        let (slot, rx) = oneshot::channel();
        self.tickets.push_back(WaitingTicket {
            ticket_id,
            user_id,
            frist: Instant::now() + timeout,
            slot,
        });
        rx
    }

    fn entfernen(&mut self, ticket_id: u64) -> bool {
        match self.tickets.iter().position(|t| t.ticket_id == ticket_id) {
            Some(index) => self.tickets.remove(index).is_some(),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// MatchQueue
// ---------------------------------------------------------------------------

/// Ergebnis eines kombinierten Such-oder-Einreihen-Schritts
enum Vermittlung<'a> {
    Gepaart(UserId),
    Wartend(Wartekarte<'a>),
}

/// FIFO-Warteliste fuer Benutzer die einen Gegner suchen
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone, Default)]
pub struct MatchQueue {
    inner: Arc<MatchQueueInner>,
}

#[derive(Default)]
struct MatchQueueInner {
    warteliste: Mutex<Warteliste>,
    ticket_zaehler: AtomicU64,
}

impl MatchQueue {
    /// Erstellt eine neue leere MatchQueue
    pub fn neu() -> Self {
        Self::default()
    }

    /// Sucht einen wartenden Gegner (tryMatch)
    ///
    /// Entnimmt das aelteste Ticket eines anderen Benutzers und loest dessen
    /// Rendezvous-Slot mit `user_id` auf. Steht der Aufrufer selbst vorne
    /// oder wartet niemand, ist das Ergebnis `None`.
    pub fn gegner_suchen(&self, user_id: &UserId) -> Option<UserId> {
        self.inner.warteliste.lock().gegner_entnehmen(user_id)
    }

    /// Reiht `user_id` ein und wartet hoechstens `timeout` auf einen Gegner
    /// (waitForMatch)
    ///
    /// `Ok(None)` nach Ablauf der Wartezeit, das Ticket ist dann entfernt.
    /// Wartet der Benutzer bereits, wird kein zweites Ticket angelegt.
    pub async fn auf_gegner_warten(
        &self,
        user_id: UserId,
        timeout: Duration,
    ) -> Result<Option<UserId>, ParleyError> {
        let karte = {
            let mut liste = self.inner.warteliste.lock();
            if liste.enthaelt(&user_id) {
                return Err(ParleyError::BereitsWartend(user_id.to_string()));
            }
            self.karte_ausstellen(&mut liste, user_id, timeout)
        };
        Ok(karte.einloesen(timeout).await)
    }

    /// Sucht einen Gegner oder reiht ein, in einem Schritt unter dem Lock
    ///
    /// Verhindert, dass zwei gleichzeitige Sucher beide eine leere Liste
    /// sehen und sich danach gegenseitig verpassen.
    pub async fn vermitteln(
        &self,
        user_id: UserId,
        timeout: Duration,
    ) -> Result<Option<UserId>, ParleyError> {
        let vermittlung = {
            let mut liste = self.inner.warteliste.lock();
            if liste.enthaelt(&user_id) {
                return Err(ParleyError::BereitsWartend(user_id.to_string()));
            }
            match liste.gegner_entnehmen(&user_id) {
                Some(gegner) => Vermittlung::Gepaart(gegner),
                None => Vermittlung::Wartend(self.karte_ausstellen(&mut liste, user_id, timeout)),
            }
        };

        match vermittlung {
            Vermittlung::Gepaart(gegner) => Ok(Some(gegner)),
            Vermittlung::Wartend(karte) => Ok(karte.einloesen(timeout).await),
        }
    }

    /// Prueft ob ein Benutzer gerade wartet
    pub fn ist_wartend(&self, user_id: &UserId) -> bool {
        self.inner.warteliste.lock().enthaelt(user_id)
    }

    /// Anzahl wartender Tickets
    pub fn wartende_anzahl(&self) -> usize {
        self.inner.warteliste.lock().tickets.len()
    }

    /// Wartende Benutzer in FIFO-Reihenfolge
    pub fn wartende(&self) -> Vec<UserId> {
        self.inner
            .warteliste
            .lock()
            .tickets
            .iter()
            .map(|t| t.user_id.clone())
            .collect()
    }

    fn karte_ausstellen(
        &self,
        liste: &mut Warteliste,
        user_id: UserId,
        timeout: Duration,
    ) -> Wartekarte<'_> {
        let ticket_id = self.inner.ticket_zaehler.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(user_id = %user_id, ticket = ticket_id, "Benutzer wartet auf Gegner");
        let rx = liste.einreihen(ticket_id, user_id.clone(), timeout);
        Wartekarte {
            queue: &self.inner,
            ticket_id,
            user_id,
            rx,
            eingeloest: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Wartekarte
// ---------------------------------------------------------------------------

/// Wartende Seite eines Tickets
///
/// Wird die Karte verworfen bevor sie eingeloest wurde (abgebrochener
/// Request), entfernt `Drop` das Ticket aus der Warteliste.
struct Wartekarte<'a> {
    queue: &'a MatchQueueInner,
    ticket_id: u64,
    user_id: UserId,
    rx: oneshot::Receiver<UserId>,
    eingeloest: bool,
}

impl Wartekarte<'_> {
    async fn einloesen(mut self, timeout: Duration) -> Option<UserId> {
        let ergebnis = tokio::time::timeout(timeout, &mut self.rx).await;
        self.eingeloest = true;

        match ergebnis {
            Ok(Ok(gegner)) => {
                tracing::debug!(user_id = %self.user_id, gegner = %gegner, "Gegner gefunden");
                Some(gegner)
            }
            Ok(Err(_)) => {
                self.queue.warteliste.lock().entfernen(self.ticket_id);
                None
            }
            Err(_) => {
                let entfernt = self.queue.warteliste.lock().entfernen(self.ticket_id);
                if entfernt {
                    tracing::debug!(user_id = %self.user_id, "Wartezeit abgelaufen, kein Gegner");
                    None
                } else {
                    // Ticket wurde vor uns entnommen: das Match hat gewonnen
                    let gegner = self.rx.try_recv().ok();
                    tracing::debug!(
                        user_id = %self.user_id,
                        gegner = ?gegner,
                        "Match kurz vor Fristende"
                    );
                    gegner
                }
            }
        }
    }
}

impl Drop for Wartekarte<'_> {
    fn drop(&mut self) {
        if self.eingeloest {
            return;
        }
        if !self.queue.warteliste.lock().entfernen(self.ticket_id) {
            if let Ok(gegner) = self.rx.try_recv() {
                tracing::warn!(
                    user_id = %self.user_id,
                    gegner = %gegner,
                    "Warten abgebrochen nachdem ein Gegner zugeteilt wurde"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
