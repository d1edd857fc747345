//! parley-server – Bibliotheks-Root
//!
//! Baut die Session-Engine aus der Konfiguration und stellt sie zusammen
//! mit Metriken und Health-Check ueber einen Axum-Server bereit.

pub mod config;

use anyhow::Result;
use axum::Router;
use config::ServerConfig;
use parley_observability::{
    health_router, metrics_router, request_trace_layer, ParleyMetrics, StatistikQuelle,
    StatistikStand,
};
use parley_signaling::{speech_router, EngineStand, SessionEngine};
use std::sync::Arc;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    engine: Arc<SessionEngine>,
}

impl Server {
    /// Erstellt einen neuen Server samt Engine aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        let engine = Arc::new(SessionEngine::neu(config.engine_config()));
        Self { config, engine }
    }

    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }

    /// Alle HTTP-Routen: Speech-API, WebSocket und optional Observability
    pub fn router(&self) -> Result<Router> {
        let mut app = speech_router(Arc::clone(&self.engine));

        if self.config.observability.aktiviert {
            let engine = Arc::clone(&self.engine);
            let quelle: StatistikQuelle = Arc::new(move || statistik_stand(&engine.statistik()));
            app = app
                .merge(metrics_router(ParleyMetrics::neu()?, Arc::clone(&quelle)))
                .merge(health_router(quelle));
        }

        Ok(app.layer(request_trace_layer()))
    }

    /// Startet den HTTP-Server und laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        let adresse = self.config.http_bind_adresse();
        let app = self.router()?;

        let listener = tokio::net::TcpListener::bind(&adresse).await?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %adresse,
            wartezeit_sek = self.config.matchmaking.wartezeit_sek,
            aufnahme = self.config.aufnahme.aktiviert,
            observability = self.config.observability.aktiviert,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Bildet den Engine-Stand auf die Metrik-Momentaufnahme ab
pub fn statistik_stand(stand: &EngineStand) -> StatistikStand {
    StatistikStand {
        aktive_sessions: stand.aktive_sessions as u64,
        wartende: stand.wartende as u64,
        sessions_gesamt: stand.sessions_gesamt,
        match_timeouts: stand.match_timeouts,
        frames_weitergeleitet: stand.relay.weitergeleitet,
        frames_verworfen: stand.relay.verworfen,
        aufnahme_fehler: stand.relay.aufnahme_fehler + stand.finalisierungs_fehler,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht registriert werden");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server(observability: bool) -> Server {
        let mut config = ServerConfig::default();
        config.aufnahme.aktiviert = false;
        config.observability.aktiviert = observability;
        Server::neu(config)
    }

    #[tokio::test]
    async fn health_und_metrics_erreichbar() {
        let app = server(true).router().unwrap();

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ohne_observability_kein_health() {
        let app = server(false).router().unwrap();
        let antwort = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn stand_abbildung() {
        let mut stand = EngineStand {
            aktive_sessions: 2,
            wartende: 1,
            sessions_gesamt: 5,
            match_timeouts: 3,
            ..EngineStand::default()
        };
        stand.relay.verworfen = 7;
        stand.relay.aufnahme_fehler = 2;
        stand.finalisierungs_fehler = 1;
        let abgebildet = statistik_stand(&stand);
        assert_eq!(abgebildet.aktive_sessions, 2);
        assert_eq!(abgebildet.match_timeouts, 3);
        assert_eq!(abgebildet.frames_verworfen, 7);
        assert_eq!(abgebildet.aufnahme_fehler, 3);
    }
}
