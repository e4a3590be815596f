//! Data model shared by the store, renderer and coordinator

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(
    /// Community (guild) identifier, the partition key for all state
    GuildId
);
snowflake_id!(
    /// Platform user identifier
    UserId
);
snowflake_id!(
    /// Platform channel identifier
    ChannelId
);
snowflake_id!(
    /// Platform message identifier
    MessageId
);
snowflake_id!(
    /// Platform role identifier
    RoleId
);

/// Store-assigned event identifier.
///
/// Allocated by SQLite `AUTOINCREMENT`, so an id is never handed out twice
/// even after the row carrying it has been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single calendar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// `None` for stores without an id scheme (JSON file backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    pub guild_id: GuildId,
    pub title: String,
    /// Opaque string; ordering is lexical
    pub date: String,
    /// Opaque string; ordering is lexical
    pub time: String,
}

impl Event {
    /// Key used for calendar ordering: `(date, time)` compared as strings
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.date, &self.time)
    }
}

/// Validated input for a new event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    pub time: String,
}

impl NewEvent {
    pub const MAX_TITLE_LEN: usize = 100;
    pub const MAX_DATE_TIME_LEN: usize = 32;

    /// Trim and validate dialog input
    pub fn parse(title: &str, date: &str, time: &str) -> crate::Result<Self> {
        let title = required("Titel", title, Self::MAX_TITLE_LEN)?;
        let date = required("Datum", date, Self::MAX_DATE_TIME_LEN)?;
        let time = required("Uhrzeit", time, Self::MAX_DATE_TIME_LEN)?;
        Ok(Self { title, date, time })
    }
}

fn required(field: &str, value: &str, max_len: usize) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(crate::Error::Validation(format!("{} darf nicht leer sein", field)));
    }
    if value.chars().count() > max_len {
        return Err(crate::Error::Validation(format!(
            "{} darf höchstens {} Zeichen lang sein",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

/// Mirrored guild member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub username: String,
    pub display_name: String,
}

/// Reference to the message that renders a guild's calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}
