//! gcal-discord: Discord front end for the guild calendar
//!
//! Connects to the Discord gateway with serenity 0.12 / poise 0.6, implements
//! [`gcal_core::CalendarTransport`] over the Discord HTTP API and turns
//! button presses, dialog submissions and membership events into calls on
//! the coordinator and the membership mirror.

pub mod bot;
pub mod commands;
pub mod components;
pub mod error;
pub mod handler;
pub mod transport;

pub use bot::CalendarBot;
pub use error::{DiscordError, Result};
pub use transport::SerenityTransport;
