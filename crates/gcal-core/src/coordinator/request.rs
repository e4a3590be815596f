//! Typed requests coming from the UI layer and their outcomes

use crate::Error;
use crate::model::{Event, GuildId, RoleId, UserId};
use crate::store::EventSelector;

/// The user behind a request, with the roles they held when they submitted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
}

impl Actor {
    pub fn new(user_id: UserId, role_ids: Vec<RoleId>) -> Self {
        Self { user_id, role_ids }
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.role_ids.contains(&role_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    pub guild_id: GuildId,
    pub invoker: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub guild_id: GuildId,
    pub actor: Actor,
    pub title: String,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    pub guild_id: GuildId,
    pub actor: Actor,
    /// Event id (numeric stores) or exact title (title-only stores)
    pub identifier: String,
}

/// Everything the coordinator can be asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarRequest {
    Setup(SetupRequest),
    Add(AddRequest),
    Remove(RemoveRequest),
}

impl CalendarRequest {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::Setup(r) => r.guild_id,
            Self::Add(r) => r.guild_id,
            Self::Remove(r) => r.guild_id,
        }
    }
}

/// Ephemeral reply for the invoking user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub ok: bool,
    pub text: String,
}

impl Acknowledgement {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            ok: false,
            text: error.user_message(),
        }
    }
}

/// Flags for what `setup` had to create
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SetupReport {
    pub role_created: bool,
    pub channel_created: bool,
    pub message_created: bool,
}

impl SetupReport {
    pub fn acknowledgement(&self) -> Acknowledgement {
        if self.role_created || self.channel_created || self.message_created {
            Acknowledgement::success("✅ Kalender wurde eingerichtet!")
        } else {
            Acknowledgement::success("✅ Kalender ist bereits eingerichtet und wurde aktualisiert.")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Added(Event),
    Removed { selector: EventSelector, count: usize },
}

/// A committed mutation plus the result of re-rendering it.
///
/// `render` failing means the store changed but the canonical message may
/// still show the previous state.
#[derive(Debug)]
pub struct MutationReport {
    pub outcome: MutationOutcome,
    pub render: Result<(), Error>,
}

impl MutationReport {
    pub fn is_complete(&self) -> bool {
        self.render.is_ok()
    }

    pub fn acknowledgement(&self) -> Acknowledgement {
        let committed = match &self.outcome {
            MutationOutcome::Added(event) => match event.id {
                Some(id) => format!("✅ Termin \"{}\" hinzugefügt (#{}).", event.title, id),
                None => format!("✅ Termin \"{}\" hinzugefügt.", event.title),
            },
            MutationOutcome::Removed { count: 0, .. } => {
                "ℹ️ Kein passender Termin gefunden, nichts entfernt.".to_string()
            }
            MutationOutcome::Removed { count: 1, .. } => "✅ Termin entfernt.".to_string(),
            MutationOutcome::Removed { count, .. } => format!("✅ {} Termine entfernt.", count),
        };

        match &self.render {
            Ok(()) => Acknowledgement::success(committed),
            Err(e) => Acknowledgement {
                ok: false,
                text: format!(
                    "{}\n⚠️ Gespeichert, aber die Kalender-Nachricht konnte nicht aktualisiert werden. {}",
                    committed,
                    stale_render_hint(e)
                ),
            },
        }
    }
}

/// Follow-up advice once the change is stored but not shown
fn stale_render_hint(error: &Error) -> &'static str {
    match error {
        Error::RenderTargetMissing => "Bitte führe `/setup` erneut aus.",
        _ => {
            "Bitte nicht erneut eintragen; die Nachricht wird beim nächsten Bearbeiten oder mit `/setup` aktualisiert."
        }
    }
}
