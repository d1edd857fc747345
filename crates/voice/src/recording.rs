//! RecordingSink – Aufnahme der Audio-Frames pro Benutzer
//!
//! Waehrend einer Session landen die Frames eines Benutzers in
//! `<wurzel>/<sessionId>/<userId>.tmp`. Beim Beenden der Session werden alle
//! temporaeren Dateien zu `<userId>-<sessionId>.<endung>` umbenannt.
//!
//! ## Design-Entscheidungen
//! - Jeder Anhaengevorgang oeffnet, schreibt und schliesst die Datei selbst.
//!   Ein Absturz verliert hoechstens den letzten Chunk.
//! - Pro `(SessionId, UserId)` ein async Mutex, damit sich zwei gleichzeitige
//!   Frames fuer dieselbe Datei nicht verschraenken.
//! - Nach Beginn der Finalisierung werden weitere Chunks der Session
//!   abgelehnt, es entsteht keine neue `.tmp`-Datei mehr.

use dashmap::DashMap;
use parley_core::{SessionId, UserId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Endung der temporaeren Aufnahmedateien
const TEMP_ENDUNG: &str = "tmp";

/// Wie lange eine finalisierte Session gegen spaete Chunks gesperrt bleibt
const FINALISIERT_NACHLAUF: Duration = Duration::from_secs(60);

/// Konfiguration der Aufnahme
#[derive(Debug, Clone)]
pub struct AufnahmeKonfig {
    /// Wurzelverzeichnis fuer alle Session-Verzeichnisse
    pub verzeichnis: PathBuf,
    /// Endung der fertigen Artefakte (ohne Punkt)
    pub endung: String,
}

impl Default for AufnahmeKonfig {
    fn default() -> Self {
        Self {
            verzeichnis: PathBuf::from("deploy/artifact"),
            endung: "mp4".into(),
        }
    }
}

/// Ergebnis einer Finalisierung
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinalisierungsBericht {
    /// Pfade der erzeugten Artefakte
    pub artefakte: Vec<PathBuf>,
    /// Anzahl der Dateien deren Umbenennung fehlschlug
    pub fehlgeschlagen: usize,
}

/// Schreibt Audio-Chunks in temporaere Dateien und finalisiert sie
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct RecordingSink {
    inner: Arc<RecordingSinkInner>,
}

struct RecordingSinkInner {
    konfig: AufnahmeKonfig,
    datei_locks: DashMap<(SessionId, UserId), Arc<Mutex<()>>>,
    finalisiert: DashMap<SessionId, Instant>,
}

impl RecordingSink {
    pub fn neu(konfig: AufnahmeKonfig) -> Self {
        Self {
            inner: Arc::new(RecordingSinkInner {
                konfig,
                datei_locks: DashMap::new(),
                finalisiert: DashMap::new(),
            }),
        }
    }

    /// Wurzelverzeichnis der Aufnahmen
    pub fn verzeichnis(&self) -> &Path {
        &self.inner.konfig.verzeichnis
    }

    /// Verzeichnis einer Session
    pub fn session_verzeichnis(&self, session_id: SessionId) -> PathBuf {
        self.inner.konfig.verzeichnis.join(session_id.to_string())
    }

    /// Pfad der temporaeren Datei eines Benutzers
    pub fn temp_pfad(&self, session_id: SessionId, user_id: &UserId) -> PathBuf {
        self.session_verzeichnis(session_id)
            .join(format!("{user_id}.{TEMP_ENDUNG}"))
    }

    /// Pfad des fertigen Artefakts eines Benutzers
    pub fn artefakt_pfad(&self, session_id: SessionId, user_id: &UserId) -> PathBuf {
        self.session_verzeichnis(session_id).join(self.artefakt_name(session_id, user_id.as_str()))
    }

    fn artefakt_name(&self, session_id: SessionId, basis: &str) -> String {
        format!("{basis}-{session_id}.{}", self.inner.konfig.endung)
    }

    /// Haengt `daten` an die temporaere Datei von `user_id` an (appendChunk)
    ///
    /// Gibt `Ok(false)` zurueck wenn die Session bereits finalisiert wird.
    pub async fn chunk_anhaengen(
        &self,
        session_id: SessionId,
        user_id: &UserId,
        daten: &[u8],
    ) -> std::io::Result<bool> {
        let lock = self.datei_lock(session_id, user_id);
        let _guard = lock.lock().await;

        if self.inner.finalisiert.contains_key(&session_id) {
            tracing::debug!(
                session_id = %session_id,
                user_id = %user_id,
                "Chunk nach Finalisierung verworfen"
            );
            return Ok(false);
        }

        let verzeichnis = self.session_verzeichnis(session_id);
        tokio::fs::create_dir_all(&verzeichnis).await?;

        let pfad = verzeichnis.join(format!("{user_id}.{TEMP_ENDUNG}"));
        let mut datei = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&pfad)
            .await?;
        datei.write_all(daten).await?;
        datei.flush().await?;

        tracing::trace!(
            session_id = %session_id,
            user_id = %user_id,
            bytes = daten.len(),
            "Chunk aufgenommen"
        );
        Ok(true)
    }

    /// Benennt alle `.tmp`-Dateien der Session in Artefakte um (finalize)
    ///
    /// Fehlt das Verzeichnis, wird nur gewarnt. Ein fehlgeschlagenes
    /// Umbenennen haelt die uebrigen Dateien nicht auf.
    pub async fn finalisieren(&self, session_id: SessionId) -> FinalisierungsBericht {
        self.inner
            .finalisiert
            .retain(|_, seit| seit.elapsed() < FINALISIERT_NACHLAUF);
        self.inner.finalisiert.insert(session_id, Instant::now());

        // Laufende Schreibvorgaenge der Session abwarten
        let schluessel: Vec<(SessionId, UserId)> = self
            .inner
            .datei_locks
            .iter()
            .filter(|e| e.key().0 == session_id)
            .map(|e| e.key().clone())
            .collect();
        for key in schluessel {
            if let Some((_, lock)) = self.inner.datei_locks.remove(&key) {
                let _guard = lock.lock().await;
            }
        }

        let mut bericht = FinalisierungsBericht::default();
        let verzeichnis = self.session_verzeichnis(session_id);
        if !tokio::fs::try_exists(&verzeichnis).await.unwrap_or(false) {
            tracing::warn!(
                session_id = %session_id,
                "Kein Aufnahmeverzeichnis fuer Session, nichts zu finalisieren"
            );
            return bericht;
        }

        tracing::info!(session_id = %session_id, "Aufnahmen werden finalisiert");

        let mut eintraege = match tokio::fs::read_dir(&verzeichnis).await {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    fehler = %e,
                    "Aufnahmeverzeichnis nicht lesbar"
                );
                return bericht;
            }
        };

        loop {
            let eintrag = match eintraege.next_entry().await {
                Ok(Some(eintrag)) => eintrag,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(session_id = %session_id, fehler = %e, "Verzeichnis-Eintrag nicht lesbar");
                    bericht.fehlgeschlagen += 1;
                    break;
                }
            };

            let dateiname = eintrag.file_name();
            let Some(basis) = dateiname
                .to_str()
                .and_then(|n| n.strip_suffix(&format!(".{TEMP_ENDUNG}")))
            else {
                continue;
            };

            let ziel = verzeichnis.join(self.artefakt_name(session_id, basis));
            match tokio::fs::rename(eintrag.path(), &ziel).await {
                Ok(()) => {
                    tracing::info!(artefakt = %ziel.display(), "Aufnahme finalisiert");
                    bericht.artefakte.push(ziel);
                }
                Err(e) => {
                    tracing::error!(
                        datei = %eintrag.path().display(),
                        fehler = %e,
                        "Finalisierung fehlgeschlagen"
                    );
                    bericht.fehlgeschlagen += 1;
                }
            }
        }

        bericht
    }

    fn datei_lock(&self, session_id: SessionId, user_id: &UserId) -> Arc<Mutex<()>> {
        // Arc klonen und Shard-Lock sofort freigeben, nie ueber .await halten
        Arc::clone(
            self.inner
                .datei_locks
                .entry((session_id, user_id.clone()))
                .or_default()
                .value(),
        )
    }
}
