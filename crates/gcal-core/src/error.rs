//! Error types for gcal-core

use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

/// Main error type for gcal-core
#[derive(Error, Debug)]
pub enum Error {
    /// Actor does not hold the access role
    #[error("permission denied")]
    PermissionDenied,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Canonical message not found within the discovery window
    #[error("calendar message not found")]
    RenderTargetMissing,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Text for the ephemeral reply shown to the invoking user
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => "❌ Du hast keine Berechtigung!".to_string(),
            Self::Validation(reason) => format!("❌ Ungültige Eingabe: {}", reason),
            Self::StoreUnavailable(_) => {
                "⚠️ Der Kalender ist gerade nicht erreichbar. Bitte versuche es erneut.".to_string()
            }
            Self::RenderTargetMissing => {
                "⚠️ Die Kalender-Nachricht wurde nicht gefunden. Bitte führe `/setup` erneut aus."
                    .to_string()
            }
            Self::Transport(_) => {
                "⚠️ Discord hat die Aktualisierung abgelehnt. Bitte versuche es später erneut."
                    .to_string()
            }
            Self::Timeout(_) => {
                "⚠️ Die Anfrage hat zu lange gedauert. Bitte versuche es erneut.".to_string()
            }
            Self::Config(_) => "⚠️ Der Bot ist falsch konfiguriert.".to_string(),
        }
    }

    /// Whether the same request may succeed if simply repeated
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Timeout(_))
    }
}

/// Result type alias for gcal-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_retriable());
        assert!(Error::StoreUnavailable(StoreError::Pool("exhausted".into())).is_retriable());
        assert!(!Error::PermissionDenied.is_retriable());
        assert!(!Error::RenderTargetMissing.is_retriable());
    }

    #[test]
    fn test_user_message_mentions_setup_when_target_missing() {
        assert!(Error::RenderTargetMissing.user_message().contains("/setup"));
    }

    #[test]
    fn test_validation_message_carries_reason() {
        let msg = Error::Validation("Titel darf nicht leer sein".into()).user_message();
        assert!(msg.contains("Titel darf nicht leer sein"));
    }
}
