//! Slash and prefix commands (poise implementation)

mod help;
mod list;
mod setup;

use std::sync::Arc;

use gcal_core::{CalendarCoordinator, MirrorQueue};

/// User data stored and accessible in all command invocations and event
/// handlers
pub struct Data {
    pub coordinator: Arc<CalendarCoordinator>,
    /// Queue of the membership mirror worker; `None` when mirroring is
    /// disabled
    pub mirror: Option<MirrorQueue>,
}

/// Error type for commands
pub type Error = crate::error::DiscordError;

pub use help::help;
pub use list::termine;
pub use setup::setup;

/// Get all commands for registration
pub fn get_commands() -> Vec<poise::Command<Data, Error>> {
    vec![setup(), help(), termine()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        let names: Vec<String> = get_commands().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["setup", "help", "termine"]);
    }

    #[test]
    fn test_setup_is_guild_only_and_restricted() {
        let command = setup();
        assert!(command.guild_only);
        assert!(command.prefix_action.is_some());
        assert!(command.slash_action.is_some());
        assert!(
            command
                .required_permissions
                .contains(poise::serenity_prelude::Permissions::MANAGE_GUILD)
        );
    }
}
