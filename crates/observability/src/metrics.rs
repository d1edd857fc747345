//! Prometheus-kompatible Metriken fuer Parley
//!
//! Registrierte Metriken:
//! - `parley_sessions_active` – Gauge: Aktive Sessions
//! - `parley_waiting_users` – Gauge: Benutzer in der Warteschlange
//! - `parley_sessions_total` – Counter: Erstellte Sessions
//! - `parley_match_timeouts_total` – Counter: Connects ohne Gegner
//! - `parley_frames_relayed_total` – Counter: Weitergeleitete Audio-Frames
//! - `parley_frames_dropped_total` – Counter: Verworfene Audio-Frames
//! - `parley_recording_errors_total` – Counter: Fehlgeschlagene Aufnahme-Writes
//!   und Finalisierungen
//!
//! Die Engine zaehlt selbst mit Atomics. Bei jedem Scrape wird eine
//! [`StatistikStand`]-Momentaufnahme geholt und per
//! [`ParleyMetrics::synchronisieren`] uebernommen.

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Zaehlerstaende der Engine zu einem Zeitpunkt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatistikStand {
    pub aktive_sessions: u64,
    pub wartende: u64,
    pub sessions_gesamt: u64,
    pub match_timeouts: u64,
    pub frames_weitergeleitet: u64,
    pub frames_verworfen: u64,
    pub aufnahme_fehler: u64,
}

/// Liefert den aktuellen Stand (z.B. aus `SessionEngine::statistik`)
pub type StatistikQuelle = Arc<dyn Fn() -> StatistikStand + Send + Sync>;

/// Alle Parley-Prometheus-Metriken
#[derive(Clone)]
pub struct ParleyMetrics {
    pub registry: Arc<Registry>,

    pub sessions_active: IntGauge,
    pub waiting_users: IntGauge,
    pub sessions_total: IntCounter,
    pub match_timeouts_total: IntCounter,
    pub frames_relayed_total: IntCounter,
    pub frames_dropped_total: IntCounter,
    pub recording_errors_total: IntCounter,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn counter(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

/// Counter nur vorwaerts bewegen
fn nachziehen(counter: &IntCounter, stand: u64) {
    let aktuell = counter.get();
    if stand > aktuell {
        counter.inc_by(stand - aktuell);
    }
}

impl ParleyMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sessions_active = gauge(&registry, "parley_sessions_active", "Anzahl aktiver Sessions")?;
        let waiting_users = gauge(
            &registry,
            "parley_waiting_users",
            "Anzahl Benutzer die auf einen Gegner warten",
        )?;
        let sessions_total = counter(
            &registry,
            "parley_sessions_total",
            "Gesamtanzahl erstellter Sessions",
        )?;
        let match_timeouts_total = counter(
            &registry,
            "parley_match_timeouts_total",
            "Connects ohne Gegner innerhalb der Wartezeit",
        )?;
        let frames_relayed_total = counter(
            &registry,
            "parley_frames_relayed_total",
            "An den Gegner weitergeleitete Audio-Frames",
        )?;
        let frames_dropped_total = counter(
            &registry,
            "parley_frames_dropped_total",
            "Verworfene Audio-Frames (Gegner nicht erreichbar)",
        )?;
        let recording_errors_total = counter(
            &registry,
            "parley_recording_errors_total",
            "Fehlgeschlagene Aufnahme-Schreibvorgaenge und Finalisierungen",
        )?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_active,
            waiting_users,
            sessions_total,
            match_timeouts_total,
            frames_relayed_total,
            frames_dropped_total,
            recording_errors_total,
        })
    }

    /// Uebernimmt eine Momentaufnahme der Engine-Zaehler
    pub fn synchronisieren(&self, stand: &StatistikStand) {
        self.sessions_active
            .set(i64::try_from(stand.aktive_sessions).unwrap_or(i64::MAX));
        self.waiting_users
            .set(i64::try_from(stand.wartende).unwrap_or(i64::MAX));
        nachziehen(&self.sessions_total, stand.sessions_gesamt);
        nachziehen(&self.match_timeouts_total, stand.match_timeouts);
        nachziehen(&self.frames_relayed_total, stand.frames_weitergeleitet);
        nachziehen(&self.frames_dropped_total, stand.frames_verworfen);
        nachziehen(&self.recording_errors_total, stand.aufnahme_fehler);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct MetricsState {
    metriken: ParleyMetrics,
    quelle: StatistikQuelle,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: ParleyMetrics, quelle: StatistikQuelle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(MetricsState { metriken, quelle })
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    state.metriken.synchronisieren(&(state.quelle)());
    match state.metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(fehler = %err, "Metriken-Export fehlgeschlagen");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn synchronisieren_uebernimmt_stand() {
        let metriken = ParleyMetrics::neu().unwrap();
        metriken.synchronisieren(&StatistikStand {
            aktive_sessions: 3,
            wartende: 1,
            sessions_gesamt: 7,
            match_timeouts: 2,
            frames_weitergeleitet: 100,
            frames_verworfen: 4,
            aufnahme_fehler: 0,
        });

        assert_eq!(metriken.sessions_active.get(), 3);
        assert_eq!(metriken.waiting_users.get(), 1);
        assert_eq!(metriken.sessions_total.get(), 7);
        assert_eq!(metriken.frames_relayed_total.get(), 100);

        // Gauge faellt, Counter bleibt monoton
        metriken.synchronisieren(&StatistikStand {
            aktive_sessions: 1,
            sessions_gesamt: 5,
            frames_weitergeleitet: 150,
            ..StatistikStand::default()
        });
        assert_eq!(metriken.sessions_active.get(), 1);
        assert_eq!(metriken.sessions_total.get(), 7);
        assert_eq!(metriken.frames_relayed_total.get(), 150);
    }

    #[test]
    fn export_prometheus_format() {
        let metriken = ParleyMetrics::neu().unwrap();
        metriken.frames_dropped_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("parley_frames_dropped_total 1"));
        assert!(output.contains("parley_sessions_active"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[tokio::test]
    async fn scrape_liest_quelle() {
        let metriken = ParleyMetrics::neu().unwrap();
        let quelle: StatistikQuelle = Arc::new(|| StatistikStand {
            aktive_sessions: 2,
            match_timeouts: 9,
            ..StatistikStand::default()
        });
        let app = metrics_router(metriken.clone(), quelle);

        let antwort = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);

        let body = axum::body::to_bytes(antwort.into_body(), 1 << 20).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("parley_sessions_active 2"));
        assert!(text.contains("parley_match_timeouts_total 9"));
    }
}
