//! /help command

use gcal_core::IdentityScheme;

use crate::commands::Data;
use crate::error::Result;

fn help_text(channel: &str, role: &str, scheme: IdentityScheme) -> String {
    let (listing, removal) = match scheme {
        IdentityScheme::Numeric => (
            "Alle Termine mit ihrer ID anzeigen",
            "ID des Termins angeben (z.B. `12` oder `#12`)",
        ),
        IdentityScheme::Title => (
            "Alle Termine anzeigen",
            "genauen Titel des Termins angeben; alle Termine mit diesem Titel werden entfernt",
        ),
    };

    format!(
        r#"**📅 Server Kalender**

Der Bot pflegt eine Kalender-Nachricht im Kanal #{channel}.

**Befehle:**

- `/setup` (oder `$setup`) - Rolle, Kanal und Kalender-Nachricht anlegen. Benötigt "Server verwalten".
- `/termine` - {listing}
- `/help` - Diese Hilfe anzeigen

**Termine bearbeiten:**

1. **➕ Termin hinzufügen**: Titel, Datum und Uhrzeit eintragen
2. **➖ Termin entfernen**: {removal}

Nur Mitglieder mit der Rolle "{role}" dürfen Termine bearbeiten.
"#
    )
}

/// Show help information about the calendar bot
#[poise::command(slash_command, rename = "help")]
pub async fn help(ctx: poise::Context<'_, Data, crate::error::DiscordError>) -> Result<()> {
    let coordinator = &ctx.data().coordinator;
    let settings = coordinator.settings();
    let response = help_text(
        &settings.channel_name,
        &settings.role_name,
        coordinator.identity_scheme(),
    );

    ctx.send(poise::CreateReply::default().content(response).ephemeral(true))
        .await?;

    Ok(())
}
