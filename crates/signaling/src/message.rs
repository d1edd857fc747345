//! Text-Nachrichten eines Transports
//!
//! Einziger Nachrichtentyp ist die Registrierung:
//! `{"type":"register","userId":"<id>","sessionId":"<uuid>"}`

use parley_core::{SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::SignalingResult;

/// Nachricht Client -> Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientNachricht {
    Register {
        #[serde(rename = "userId")]
        user_id: UserId,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
}

impl ClientNachricht {
    /// Dekodiert einen Text-Frame
    pub fn dekodieren(text: &str) -> SignalingResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrierung_dekodieren() {
        let sid = SessionId::new();
        let text = format!(r#"{{"type":"register","userId":"alice","sessionId":"{sid}"}}"#);
        let nachricht = ClientNachricht::dekodieren(&text).unwrap();
        assert_eq!(
            nachricht,
            ClientNachricht::Register {
                user_id: UserId::neu("alice").unwrap(),
                session_id: sid,
            }
        );
    }

    #[test]
    fn unbekannter_typ_abgelehnt() {
        let text = r#"{"type":"hello","userId":"alice"}"#;
        assert!(ClientNachricht::dekodieren(text).is_err());
    }

    #[test]
    fn ungueltige_user_id_abgelehnt() {
        let sid = SessionId::new();
        let text = format!(r#"{{"type":"register","userId":"../x","sessionId":"{sid}"}}"#);
        assert!(ClientNachricht::dekodieren(&text).is_err());
    }

    #[test]
    fn ungueltige_session_id_abgelehnt() {
        let text = r#"{"type":"register","userId":"alice","sessionId":"keine-uuid"}"#;
        assert!(ClientNachricht::dekodieren(text).is_err());
    }
}
