//! Error types for gcal-discord

use thiserror::Error;

/// gcal-discord error type
#[derive(Error, Debug)]
pub enum DiscordError {
    #[error("Discord token not set")]
    TokenNotSet,

    #[error("Calendar error: {0}")]
    Calendar(#[from] gcal_core::Error),

    #[error("Serenity error: {0}")]
    SerenityError(#[from] serenity::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DiscordError>;
