//! Kompletter Ablauf einer Session ueber die Engine:
//! connect -> register -> Audio in beide Richtungen -> disconnect -> Artefakte

use bytes::Bytes;
use parley_core::UserId;
use parley_signaling::{EngineConfig, SessionEngine};
use parley_voice::{
    AufnahmeKonfig, QueueTransport, RelayErgebnis, SchliessGrund, SessionZustand,
    TransportHandle, VoiceTransport,
};
use std::sync::Arc;

fn uid(s: &str) -> UserId {
    UserId::neu(s).unwrap()
}

fn engine_mit_aufnahme(verzeichnis: &std::path::Path) -> Arc<SessionEngine> {
    Arc::new(SessionEngine::neu(EngineConfig {
        aufnahme: Some(AufnahmeKonfig {
            verzeichnis: verzeichnis.to_path_buf(),
            endung: "mp4".into(),
        }),
        ..EngineConfig::default()
    }))
}

async fn paaren(engine: &Arc<SessionEngine>, a: &str, b: &str) -> parley_signaling::Verbindung {
    let e = Arc::clone(engine);
    let ua = uid(a);
    let wartend = tokio::spawn(async move { e.verbinden(ua).await });
    while !engine.queue().ist_wartend(&uid(a)) {
        tokio::task::yield_now().await;
    }
    let verbindung = engine.verbinden(uid(b)).await.unwrap();
    let gegenstueck = wartend.await.unwrap().unwrap();
    assert_eq!(verbindung.session_id, gegenstueck.session_id);
    verbindung
}

fn register(user: &str, sid: parley_core::SessionId) -> String {
    format!(r#"{{"type":"register","userId":"{user}","sessionId":"{sid}"}}"#)
}

#[tokio::test(start_paused = true)]
async fn session_von_connect_bis_artefakt() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_mit_aufnahme(dir.path());
    let gateway = engine.gateway().clone();

    let verbindung = paaren(&engine, "alice", "bob").await;
    let sid = verbindung.session_id;

    let (ta, mut rx_a) = QueueTransport::neu(16);
    let (tb, mut rx_b) = QueueTransport::neu(16);
    let ha: TransportHandle = ta.clone();
    let hb: TransportHandle = tb.clone();

    gateway.verbunden(&ha);
    gateway.verbunden(&hb);
    assert_eq!(
        gateway.text_empfangen(&ha, &register("alice", sid)).unwrap(),
        SessionZustand::TeilweiseGebunden
    );

    // Bob noch nicht registriert: verworfen, aber aufgenommen
    assert_eq!(
        gateway.binaer_empfangen(&ha, Bytes::from_static(b"A0")).await,
        RelayErgebnis::Verworfen
    );

    assert_eq!(
        gateway.text_empfangen(&hb, &register("bob", sid)).unwrap(),
        SessionZustand::Aktiv
    );

    gateway.binaer_empfangen(&ha, Bytes::from_static(b"A1")).await;
    gateway.binaer_empfangen(&hb, Bytes::from_static(b"B1")).await;
    gateway.binaer_empfangen(&ha, Bytes::from_static(b"A2")).await;

    assert_eq!(rx_b.recv().await.unwrap().as_ref(), b"A1");
    assert_eq!(rx_b.recv().await.unwrap().as_ref(), b"A2");
    assert!(rx_b.try_recv().is_err(), "A0 darf nicht nachgeliefert werden");
    assert_eq!(rx_a.recv().await.unwrap().as_ref(), b"B1");

    engine.trennen(&uid("alice")).await.unwrap();

    assert_eq!(ta.schliess_grund(), Some(SchliessGrund::Normal));
    assert_eq!(tb.schliess_grund(), Some(SchliessGrund::Normal));

    let sink = engine.aufnahme().unwrap();
    let alice = std::fs::read(sink.artefakt_pfad(sid, &uid("alice"))).unwrap();
    let bob = std::fs::read(sink.artefakt_pfad(sid, &uid("bob"))).unwrap();
    assert_eq!(alice, b"A0A1A2");
    assert_eq!(bob, b"B1");
    assert!(!sink.temp_pfad(sid, &uid("alice")).exists());

    let stand = engine.statistik();
    assert_eq!(stand.aktive_sessions, 0);
    assert_eq!(stand.relay.weitergeleitet, 3);
    assert_eq!(stand.relay.verworfen, 1);
}

#[tokio::test(start_paused = true)]
async fn schliessen_beendet_session_nicht() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_mit_aufnahme(dir.path());
    let gateway = engine.gateway().clone();

    let sid = paaren(&engine, "carol", "dave").await.session_id;
    let (tc, _rx_c) = QueueTransport::neu(4);
    let hc: TransportHandle = tc.clone();
    gateway.text_empfangen(&hc, &register("carol", sid)).unwrap();

    gateway.geschlossen(&hc);

    assert_eq!(engine.registry().zustand(sid), SessionZustand::Erstellt);
    assert_eq!(engine.registry().session_von_user(&uid("dave")), Some(sid));

    // Neuer Transport fuer denselben Benutzer kann sich wieder registrieren
    let (tc2, _rx_c2) = QueueTransport::neu(4);
    let hc2: TransportHandle = tc2;
    assert!(gateway.text_empfangen(&hc2, &register("carol", sid)).is_ok());
}

#[tokio::test(start_paused = true)]
async fn viele_gleichzeitige_connects_ergeben_perfektes_matching() {
    let engine = Arc::new(SessionEngine::neu(EngineConfig {
        aufnahme: None,
        ..EngineConfig::default()
    }));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let e = Arc::clone(&engine);
            tokio::spawn(async move { (i, e.verbinden(uid(&format!("user{i}"))).await) })
        })
        .collect();

    let mut gepaart = std::collections::HashMap::new();
    for h in handles {
        let (i, ergebnis) = h.await.unwrap();
        if let Ok(v) = ergebnis {
            gepaart.insert(format!("user{i}"), (v.session_id, v.gegner.to_string()));
        }
    }

    assert_eq!(gepaart.len(), 20, "bei gerader Anzahl findet jeder einen Gegner");
    for (user, (sid, gegner)) in &gepaart {
        let (sid_gegner, gegner_von_gegner) = &gepaart[gegner];
        assert_eq!(sid, sid_gegner);
        assert_eq!(gegner_von_gegner, user);
    }
    assert_eq!(engine.statistik().aktive_sessions, 10);
    assert_eq!(engine.statistik().sessions_gesamt, 10);
}

#[tokio::test]
async fn registrierung_fuer_unbekannte_session_laesst_transport_offen() {
    let engine = Arc::new(SessionEngine::default());
    let (t, _rx) = QueueTransport::neu(4);
    let h: TransportHandle = t.clone();

    let sid = parley_core::SessionId::new();
    assert!(engine.gateway().text_empfangen(&h, &register("eve", sid)).is_err());
    assert!(t.ist_offen());
    assert_eq!(
        engine.gateway().binaer_empfangen(&h, Bytes::from_static(b"x")).await,
        RelayErgebnis::Unbekannt
    );
}
