//! Discord building blocks for the calendar message: embed, buttons and the
//! add/remove dialogs, plus translation of submitted dialogs into
//! [`CalendarRequest`]s.

use std::collections::HashMap;

use serenity::all::{
    ActionRowComponent, ButtonStyle, Colour, CreateActionRow, CreateButton, CreateEmbed,
    CreateEmbedFooter, CreateInputText, CreateModal, InputTextStyle, Member, ModalInteraction,
    User,
};

use gcal_core::{
    Actor, AddRequest, CalendarRequest, DisplayPayload, GuildId, IdentityScheme, MemberRecord,
    NewEvent, RemoveRequest, RoleId, UserId,
};

pub const ADD_BUTTON_ID: &str = "gcal:add";
pub const REMOVE_BUTTON_ID: &str = "gcal:remove";
pub const ADD_MODAL_ID: &str = "gcal:add_modal";
pub const REMOVE_MODAL_ID: &str = "gcal:remove_modal";

pub const TITLE_INPUT: &str = "title";
pub const DATE_INPUT: &str = "date";
pub const TIME_INPUT: &str = "time";
pub const IDENTIFIER_INPUT: &str = "identifier";

/// Which calendar button was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarAction {
    Add,
    Remove,
}

impl CalendarAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            ADD_BUTTON_ID => Some(Self::Add),
            REMOVE_BUTTON_ID => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Which dialog was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalKind {
    Add,
    Remove,
}

impl ModalKind {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            ADD_MODAL_ID => Some(Self::Add),
            REMOVE_MODAL_ID => Some(Self::Remove),
            _ => None,
        }
    }
}

pub fn calendar_embed(payload: &DisplayPayload) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(&payload.title)
        .colour(Colour::BLUE)
        .fields(
            payload
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.value.clone(), false)),
        );

    // Discord rejects an empty footer text
    if !payload.footer.is_empty() {
        embed = embed.footer(CreateEmbedFooter::new(&payload.footer));
    }
    embed
}

pub fn calendar_buttons() -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(ADD_BUTTON_ID)
            .label("Termin hinzufügen")
            .emoji('➕')
            .style(ButtonStyle::Success),
        CreateButton::new(REMOVE_BUTTON_ID)
            .label("Termin entfernen")
            .emoji('➖')
            .style(ButtonStyle::Danger),
    ])]
}

pub fn add_modal() -> CreateModal {
    CreateModal::new(ADD_MODAL_ID, "Termin hinzufügen").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Titel", TITLE_INPUT)
                .placeholder("z.B. Raid-Abend")
                .max_length(NewEvent::MAX_TITLE_LEN as u16),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Datum", DATE_INPUT)
                .placeholder("z.B. 24.12.2025")
                .max_length(NewEvent::MAX_DATE_TIME_LEN as u16),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Uhrzeit", TIME_INPUT)
                .placeholder("z.B. 20:00")
                .max_length(NewEvent::MAX_DATE_TIME_LEN as u16),
        ),
    ])
}

/// The remove dialog asks for an id or a title depending on the store
pub fn remove_modal(scheme: IdentityScheme) -> CreateModal {
    let (label, placeholder) = match scheme {
        IdentityScheme::Numeric => ("Termin-ID", "z.B. 12 oder #12"),
        IdentityScheme::Title => ("Titel des Termins", "Genauer Titel"),
    };

    CreateModal::new(REMOVE_MODAL_ID, "Termin entfernen").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, label, IDENTIFIER_INPUT)
                .placeholder(placeholder)
                .max_length(NewEvent::MAX_TITLE_LEN as u16),
        ),
    ])
}

/// Text input values of a submitted dialog, keyed by input id
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModalInputs {
    values: HashMap<String, String>,
}

impl ModalInputs {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(id, value)| (id.to_string(), value.unwrap_or_default().to_string()))
            .collect();
        Self { values }
    }

    pub fn from_interaction(interaction: &ModalInteraction) -> Self {
        Self::from_pairs(
            interaction
                .data
                .components
                .iter()
                .flat_map(|row| row.components.iter())
                .filter_map(|component| match component {
                    ActionRowComponent::InputText(input) => {
                        Some((input.custom_id.as_str(), input.value.as_deref()))
                    }
                    _ => None,
                }),
        )
    }

    /// Missing inputs read as empty and fail validation downstream
    pub fn get(&self, id: &str) -> &str {
        self.values.get(id).map(String::as_str).unwrap_or_default()
    }

    pub fn into_request(self, kind: ModalKind, guild_id: GuildId, actor: Actor) -> CalendarRequest {
        match kind {
            ModalKind::Add => CalendarRequest::Add(AddRequest {
                guild_id,
                actor,
                title: self.get(TITLE_INPUT).to_string(),
                date: self.get(DATE_INPUT).to_string(),
                time: self.get(TIME_INPUT).to_string(),
            }),
            ModalKind::Remove => CalendarRequest::Remove(RemoveRequest {
                guild_id,
                actor,
                identifier: self.get(IDENTIFIER_INPUT).to_string(),
            }),
        }
    }
}

pub fn actor_from(user: &User, member: Option<&Member>) -> Actor {
    let role_ids = member
        .map(|m| m.roles.iter().map(|r| RoleId(r.get())).collect())
        .unwrap_or_default();
    Actor::new(UserId(user.id.get()), role_ids)
}

/// Nickname, then global name, then username
pub fn display_name(username: &str, global_name: Option<&str>, nick: Option<&str>) -> String {
    [nick, global_name]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .unwrap_or(username)
        .to_string()
}

pub fn member_record(member: &Member) -> MemberRecord {
    MemberRecord {
        user_id: UserId(member.user.id.get()),
        guild_id: GuildId(member.guild_id.get()),
        username: member.user.name.clone(),
        display_name: display_name(
            &member.user.name,
            member.user.global_name.as_deref(),
            member.nick.as_deref(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_ids_roundtrip_to_actions() {
        assert_eq!(CalendarAction::from_custom_id(ADD_BUTTON_ID), Some(CalendarAction::Add));
        assert_eq!(
            CalendarAction::from_custom_id(REMOVE_BUTTON_ID),
            Some(CalendarAction::Remove)
        );
        assert_eq!(CalendarAction::from_custom_id("edit_calendar"), None);
        assert_eq!(ModalKind::from_custom_id(ADD_MODAL_ID), Some(ModalKind::Add));
        assert_eq!(ModalKind::from_custom_id(ADD_BUTTON_ID), None);
    }

    #[test]
    fn test_add_inputs_become_add_request() {
        let inputs = ModalInputs::from_pairs([
            (TITLE_INPUT, Some("Raid")),
            (DATE_INPUT, Some("24.12.2025")),
            (TIME_INPUT, Some("20:00")),
        ]);
        let actor = Actor::new(UserId(5), vec![RoleId(9)]);

        match inputs.into_request(ModalKind::Add, GuildId(1), actor.clone()) {
            CalendarRequest::Add(request) => {
                assert_eq!(request.guild_id, GuildId(1));
                assert_eq!(request.actor, actor);
                assert_eq!(request.title, "Raid");
                assert_eq!(request.date, "24.12.2025");
                assert_eq!(request.time, "20:00");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_missing_inputs_read_as_empty() {
        let inputs = ModalInputs::from_pairs([(IDENTIFIER_INPUT, None)]);
        assert_eq!(inputs.get(IDENTIFIER_INPUT), "");
        assert_eq!(inputs.get("unknown"), "");

        match inputs.into_request(ModalKind::Remove, GuildId(1), Actor::new(UserId(1), vec![])) {
            CalendarRequest::Remove(request) => assert!(request.identifier.is_empty()),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_display_name_precedence() {
        assert_eq!(display_name("anna", Some("Anna"), Some("Anni")), "Anni");
        assert_eq!(display_name("anna", Some("Anna"), None), "Anna");
        assert_eq!(display_name("anna", None, None), "anna");
        assert_eq!(display_name("anna", Some("Anna"), Some("  ")), "Anna");
        assert_eq!(display_name("anna", None, Some("  ")), "anna");
    }
}
