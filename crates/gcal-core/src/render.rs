//! Calendar rendering: event list → display payload. Pure, no I/O.

use serde::{Deserialize, Serialize};

use crate::model::Event;

/// Discord embeds carry at most 25 fields
pub const MAX_FIELDS: usize = 25;

pub const PLACEHOLDER_NAME: &str = "Keine Termine";
pub const PLACEHOLDER_VALUE: &str = "Noch keine Termine eingetragen.";

/// One `(name, value)` row of the rendered calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayField {
    pub name: String,
    pub value: String,
}

impl DisplayField {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Transport-neutral description of the canonical message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub title: String,
    pub fields: Vec<DisplayField>,
    pub footer: String,
}

impl DisplayPayload {
    /// Whether this payload is the "no events" placeholder
    pub fn is_placeholder(&self) -> bool {
        self.fields.len() == 1
            && self.fields[0].name == PLACEHOLDER_NAME
            && self.fields[0].value == PLACEHOLDER_VALUE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub title: String,
    /// Suffix entries with `(#id)` so users know what to pass to "remove"
    pub show_event_ids: bool,
    pub footer: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            title: "📅 Server Kalender".to_string(),
            show_event_ids: true,
            footer: String::new(),
        }
    }
}

/// Render `events` in the order given.
///
/// Callers pass the store's list, which is already sorted by `(date, time)`.
pub fn render(events: &[Event], options: &RenderOptions) -> DisplayPayload {
    let fields = if events.is_empty() {
        vec![DisplayField::new(PLACEHOLDER_NAME, PLACEHOLDER_VALUE)]
    } else if events.len() <= MAX_FIELDS {
        events.iter().map(|e| event_field(e, options)).collect()
    } else {
        let shown = MAX_FIELDS - 1;
        let mut fields: Vec<_> = events[..shown].iter().map(|e| event_field(e, options)).collect();
        fields.push(DisplayField::new(
            format!("… und {} weitere", events.len() - shown),
            "Ältere Termine bitte entfernen.",
        ));
        fields
    };

    DisplayPayload {
        title: options.title.clone(),
        fields,
        footer: options.footer.clone(),
    }
}

fn event_field(event: &Event, options: &RenderOptions) -> DisplayField {
    let name = format!("{} | {}", event.date, event.time);
    let value = match event.id {
        Some(id) if options.show_event_ids => format!("{} (#{})", event.title, id),
        _ => event.title.clone(),
    };
    DisplayField::new(name, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventId, GuildId};

    fn event(id: Option<i64>, title: &str, date: &str, time: &str) -> Event {
        Event {
            id: id.map(EventId),
            guild_id: GuildId(1),
            title: title.to_string(),
            date: date.to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn test_empty_renders_single_placeholder() {
        let payload = render(&[], &RenderOptions::default());
        assert_eq!(payload.fields.len(), 1);
        assert!(payload.is_placeholder());
    }

    #[test]
    fn test_field_format() {
        let options = RenderOptions {
            show_event_ids: false,
            ..RenderOptions::default()
        };
        let payload = render(&[event(Some(3), "Standup", "01.01.2025", "09:00")], &options);
        assert_eq!(payload.fields, vec![DisplayField::new("01.01.2025 | 09:00", "Standup")]);
        assert!(!payload.is_placeholder());
    }

    #[test]
    fn test_id_suffix() {
        let payload = render(
            &[event(Some(3), "Standup", "01.01.2025", "09:00")],
            &RenderOptions::default(),
        );
        assert_eq!(payload.fields[0].value, "Standup (#3)");

        // no id scheme, no suffix
        let payload = render(&[event(None, "Standup", "d", "t")], &RenderOptions::default());
        assert_eq!(payload.fields[0].value, "Standup");
    }

    #[test]
    fn test_preserves_input_order() {
        let events = vec![
            event(Some(2), "Review", "01.01.2025", "08:00"),
            event(Some(1), "Standup", "01.01.2025", "09:00"),
        ];
        let payload = render(&events, &RenderOptions::default());
        assert_eq!(payload.fields[0].name, "01.01.2025 | 08:00");
        assert_eq!(payload.fields[1].name, "01.01.2025 | 09:00");
    }

    #[test]
    fn test_overflow_collapses_tail() {
        let events: Vec<_> = (0..30)
            .map(|i| event(Some(i), &format!("E{}", i), "d", &format!("{:02}", i)))
            .collect();
        let payload = render(&events, &RenderOptions::default());

        assert_eq!(payload.fields.len(), MAX_FIELDS);
        assert_eq!(payload.fields[MAX_FIELDS - 1].name, "… und 6 weitere");
    }

    #[test]
    fn test_exactly_max_fields_has_no_overflow() {
        let events: Vec<_> = (0..MAX_FIELDS as i64)
            .map(|i| event(Some(i), "E", "d", "t"))
            .collect();
        let payload = render(&events, &RenderOptions::default());
        assert_eq!(payload.fields.len(), MAX_FIELDS);
        assert!(payload.fields.iter().all(|f| f.value.starts_with('E')));
    }
}
