//! SessionEngine – explizit konstruierter Besitzer aller Registries
//!
//! Die Engine haelt Warteschlange, Session-Registry, Relay, Aufnahme und
//! Gateway. HTTP-Routen und Transport-Adapter bekommen sie per `Arc`
//! injiziert, es gibt keinen globalen Zustand.
//!
//! ## Ablauf `verbinden`
//! ```text
//! laufend? -> BereitsWartend
//! Session? -> BereitsVerbunden
//! vermitteln(user, wartezeit)
//!   Some(gegner) -> session_erstellen(user, gegner)
//!                   PaarungsKonflikt -> Session des Paares uebernehmen
//!   None         -> KeinGegner
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_core::{ParleyError, Result, SessionId, UserId};
use parley_matchmaking::{MatchQueue, STANDARD_WARTEZEIT};
use parley_voice::{
    AufnahmeKonfig, RecordingSink, RelayEngine, RelayStand, SessionRegistry, SEND_QUEUE_GROESSE,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::gateway::TransportGateway;

/// Standard-Obergrenze fuer Binaer-Frames (64 KiB)
pub const STANDARD_MAX_FRAME_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der Session-Engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximale Wartezeit auf einen Gegner
    pub wartezeit: Duration,
    /// Aufnahme-Einstellungen, `None` deaktiviert die Aufnahme
    pub aufnahme: Option<AufnahmeKonfig>,
    /// Send-Queue-Groesse pro Transport (Frames)
    pub send_queue_groesse: usize,
    /// Maximale Groesse eines Binaer-Frames
    pub max_frame_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wartezeit: STANDARD_WARTEZEIT,
            aufnahme: Some(AufnahmeKonfig::default()),
            send_queue_groesse: SEND_QUEUE_GROESSE,
            max_frame_bytes: STANDARD_MAX_FRAME_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Ergebnis- und Statistik-Typen
// ---------------------------------------------------------------------------

/// Erfolgreiches Pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verbindung {
    pub session_id: SessionId,
    pub gegner: UserId,
}

#[derive(Debug, Default)]
struct EngineStatistik {
    sessions_gesamt: AtomicU64,
    match_timeouts: AtomicU64,
}

/// Momentaufnahme aller Engine-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStand {
    pub aktive_sessions: usize,
    pub wartende: usize,
    pub sessions_gesamt: u64,
    pub match_timeouts: u64,
    pub relay: RelayStand,
    /// Aufnahmen die beim Beenden nicht finalisiert werden konnten
    pub finalisierungs_fehler: u64,
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// Zentrale Engine fuer Pairing, Sessions und Relay
pub struct SessionEngine {
    config: EngineConfig,
    queue: MatchQueue,
    registry: SessionRegistry,
    relay: RelayEngine,
    gateway: TransportGateway,
    aufnahme: Option<RecordingSink>,
    /// Benutzer mit laufendem `verbinden`
    laufend: DashMap<UserId, ()>,
    statistik: EngineStatistik,
}

impl SessionEngine {
    pub fn neu(config: EngineConfig) -> Self {
        let aufnahme = config.aufnahme.clone().map(RecordingSink::neu);
        let registry = SessionRegistry::neu(aufnahme.clone());
        let relay = RelayEngine::neu(registry.clone(), aufnahme.clone());
        let gateway = TransportGateway::neu(registry.clone(), relay.clone());

        match &aufnahme {
            Some(sink) => tracing::info!(
                verzeichnis = %sink.verzeichnis().display(),
                "Session-Engine erstellt, Aufnahme aktiv"
            ),
            None => tracing::info!("Session-Engine erstellt, Aufnahme deaktiviert"),
        }

        Self {
            config,
            queue: MatchQueue::neu(),
            registry,
            relay,
            gateway,
            aufnahme,
            laufend: DashMap::new(),
            statistik: EngineStatistik::default(),
        }
    }

    /// Sucht einen Gegner und erstellt die Session (HTTP connect)
    pub async fn verbinden(&self, user_id: UserId) -> Result<Verbindung> {
        let _guard = match self.laufend.entry(user_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(user_id = %user_id, "Verbinden abgelehnt, Anfrage laeuft bereits");
                return Err(ParleyError::BereitsWartend(user_id.to_string()));
            }
            Entry::Vacant(eintrag) => {
                eintrag.insert(());
                LaufendGuard {
                    laufend: &self.laufend,
                    user_id: user_id.clone(),
                }
            }
        };

        if self.queue.ist_wartend(&user_id) {
            tracing::warn!(user_id = %user_id, "Verbinden abgelehnt, Benutzer wartet bereits");
            return Err(ParleyError::BereitsWartend(user_id.to_string()));
        }
        if let Some(session_id) = self.registry.session_von_user(&user_id) {
            tracing::warn!(
                user_id = %user_id,
                session_id = %session_id,
                "Verbinden abgelehnt, Benutzer ist bereits verbunden"
            );
            return Err(ParleyError::BereitsVerbunden(user_id.to_string()));
        }

        match self.queue.vermitteln(user_id.clone(), self.config.wartezeit).await? {
            Some(gegner) => self.paar_sichern(user_id, gegner),
            None => {
                self.statistik.match_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::info!(user_id = %user_id, "Kein Gegner innerhalb der Wartezeit");
                Err(ParleyError::KeinGegner)
            }
        }
    }

    /// Beide Seiten des Rendezvous erstellen die Session; der Verlierer
    /// uebernimmt sie, sofern sie genau dieses Paar verbindet.
    fn paar_sichern(&self, user_id: UserId, gegner: UserId) -> Result<Verbindung> {
        match self.registry.session_erstellen(&user_id, &gegner) {
            Ok(session_id) => {
                self.statistik.sessions_gesamt.fetch_add(1, Ordering::Relaxed);
                Ok(Verbindung {
                    session_id,
                    gegner,
                })
            }
            Err(ParleyError::PaarungsKonflikt(belegt)) => {
                match self.registry.session_fuer_paar(&user_id, &gegner) {
                    Some(session_id) => {
                        tracing::debug!(
                            user_id = %user_id,
                            session_id = %session_id,
                            "Session des Gegners uebernommen"
                        );
                        Ok(Verbindung {
                            session_id,
                            gegner,
                        })
                    }
                    None => {
                        tracing::warn!(
                            user_id = %user_id,
                            gegner = %gegner,
                            belegt = %belegt,
                            "Pairing gescheitert, Benutzer anderweitig belegt"
                        );
                        Err(ParleyError::PaarungsKonflikt(belegt))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Beendet die Session eines Benutzers (HTTP disconnect)
    ///
    /// Finalisiert die Aufnahmen und schliesst danach beide Transports.
    pub async fn trennen(&self, user_id: &UserId) -> Result<SessionId> {
        let Some(session_id) = self.registry.session_von_user(user_id) else {
            tracing::warn!(user_id = %user_id, "Trennen abgelehnt, keine aktive Session");
            return Err(ParleyError::NichtVerbunden(user_id.to_string()));
        };

        match self.registry.beenden(session_id).await {
            Some(info) => {
                self.gateway.session_beendet(&info);
                tracing::info!(user_id = %user_id, session_id = %session_id, "Benutzer getrennt");
                Ok(session_id)
            }
            None => {
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Session wurde gleichzeitig beendet"
                );
                Err(ParleyError::NichtVerbunden(user_id.to_string()))
            }
        }
    }

    pub fn statistik(&self) -> EngineStand {
        EngineStand {
            aktive_sessions: self.registry.session_anzahl(),
            wartende: self.queue.wartende_anzahl(),
            sessions_gesamt: self.statistik.sessions_gesamt.load(Ordering::Relaxed),
            match_timeouts: self.statistik.match_timeouts.load(Ordering::Relaxed),
            relay: self.relay.statistik(),
            finalisierungs_fehler: self.registry.finalisierungs_fehler(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &TransportGateway {
        &self.gateway
    }

    pub fn aufnahme(&self) -> Option<&RecordingSink> {
        self.aufnahme.as_ref()
    }
}

impl Default for SessionEngine {
    fn default() -> Self {
        Self::neu(EngineConfig::default())
    }
}

/// Gibt den Benutzer nach `verbinden` wieder frei, auch bei Abbruch
struct LaufendGuard<'a> {
    laufend: &'a DashMap<UserId, ()>,
    user_id: UserId,
}

impl Drop for LaufendGuard<'_> {
    fn drop(&mut self) {
        self.laufend.remove(&self.user_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn uid(s: &str) -> UserId {
        UserId::neu(s).unwrap()
    }

    fn engine() -> Arc<SessionEngine> {
        Arc::new(SessionEngine::neu(EngineConfig {
            aufnahme: None,
            ..EngineConfig::default()
        }))
    }

    async fn warten_bis_wartend(engine: &SessionEngine, user: &UserId) {
        while !engine.queue().ist_wartend(user) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zwei_benutzer_werden_gepaart() {
        let engine = engine();
        let e = Arc::clone(&engine);
        let wartend = tokio::spawn(async move { e.verbinden(uid("a")).await });
        warten_bis_wartend(&engine, &uid("a")).await;

        let b = engine.verbinden(uid("b")).await.unwrap();
        let a = wartend.await.unwrap().unwrap();

        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.gegner, uid("b"));
        assert_eq!(b.gegner, uid("a"));

        let stand = engine.statistik();
        assert_eq!(stand.aktive_sessions, 1);
        assert_eq!(stand.sessions_gesamt, 1);
        assert_eq!(stand.wartende, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zeitlimit_ohne_gegner() {
        let engine = engine();
        let ergebnis = engine.verbinden(uid("allein")).await;

        assert!(matches!(ergebnis, Err(ParleyError::KeinGegner)));
        assert!(!engine.queue().ist_wartend(&uid("allein")));
        assert_eq!(engine.statistik().match_timeouts, 1);

        // Danach ist ein neuer Versuch erlaubt
        let e = Arc::clone(&engine);
        let erneut = tokio::spawn(async move { e.verbinden(uid("allein")).await });
        warten_bis_wartend(&engine, &uid("allein")).await;
        engine.verbinden(uid("spaet")).await.unwrap();
        assert!(erneut.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn zweites_verbinden_waehrend_warten() {
        let engine = engine();
        let e = Arc::clone(&engine);
        let erstes = tokio::spawn(async move { e.verbinden(uid("a")).await });
        warten_bis_wartend(&engine, &uid("a")).await;

        let zweites = engine.verbinden(uid("a")).await;
        assert!(matches!(zweites, Err(ParleyError::BereitsWartend(_))));

        assert!(matches!(
            erstes.await.unwrap(),
            Err(ParleyError::KeinGegner)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn bereits_verbunden() {
        let engine = engine();
        let e = Arc::clone(&engine);
        let wartend = tokio::spawn(async move { e.verbinden(uid("a")).await });
        warten_bis_wartend(&engine, &uid("a")).await;
        engine.verbinden(uid("b")).await.unwrap();
        wartend.await.unwrap().unwrap();

        assert!(matches!(
            engine.verbinden(uid("a")).await,
            Err(ParleyError::BereitsVerbunden(_))
        ));
    }

    #[tokio::test]
    async fn trennen_ohne_session() {
        let engine = engine();
        assert!(matches!(
            engine.trennen(&uid("niemand")).await,
            Err(ParleyError::NichtVerbunden(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn trennen_beendet_fuer_beide() {
        let engine = engine();
        let e = Arc::clone(&engine);
        let wartend = tokio::spawn(async move { e.verbinden(uid("a")).await });
        warten_bis_wartend(&engine, &uid("a")).await;
        let verbindung = engine.verbinden(uid("b")).await.unwrap();
        wartend.await.unwrap().unwrap();

        assert_eq!(engine.trennen(&uid("a")).await.unwrap(), verbindung.session_id);
        assert_eq!(engine.statistik().aktive_sessions, 0);
        assert!(matches!(
            engine.trennen(&uid("b")).await,
            Err(ParleyError::NichtVerbunden(_))
        ));
    }

    #[test]
    fn session_uebernahme_nach_wettlauf() {
        let engine = engine();
        // Gegner hat die Session bereits erstellt
        let sid = engine
            .registry()
            .session_erstellen(&uid("b"), &uid("a"))
            .unwrap();

        let verbindung = engine.paar_sichern(uid("a"), uid("b")).unwrap();
        assert_eq!(verbindung.session_id, sid);
        assert_eq!(engine.statistik().aktive_sessions, 1);
    }

    #[test]
    fn keine_uebernahme_fremder_session() {
        let engine = engine();
        engine
            .registry()
            .session_erstellen(&uid("b"), &uid("c"))
            .unwrap();

        assert!(matches!(
            engine.paar_sichern(uid("a"), uid("b")),
            Err(ParleyError::PaarungsKonflikt(_))
        ));
    }
}
