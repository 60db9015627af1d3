//! Calendar event model.
//!
//! Persistence and Google Calendar synchronisation live outside the core;
//! this module only owns the record shape and its invariants.

use crate::clock::EpochMillis;
use crate::model::actor::ActorId;
use crate::model::memo::MemoId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Sent,
    Cancelled,
}

/// Who is invited: whole departments plus explicit addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParticipants {
    pub departments: Vec<String>,
    pub emails: Vec<String>,
}

impl EventParticipants {
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty() && self.emails.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub start: EpochMillis,
    pub end: EpochMillis,
    pub all_day: bool,
    pub category: String,
    pub memo_id: Option<MemoId>,
    pub created_by: ActorId,
    pub participants: EventParticipants,
    pub status: EventStatus,
    /// Participant e-mail to external calendar event id.
    pub google_event_ids: BTreeMap<String, String>,
}

impl CalendarEvent {
    pub fn new(
        title: impl Into<String>,
        start: EpochMillis,
        end: EpochMillis,
        created_by: ActorId,
        participants: EventParticipants,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            start,
            end,
            all_day: false,
            category: "general".to_string(),
            memo_id: None,
            created_by,
            participants,
            status: EventStatus::Scheduled,
            google_event_ids: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.title.trim().is_empty() {
            return Err(EventValidationError::BlankTitle);
        }
        // All-day events may share start and end on the same day.
        if self.end < self.start || (!self.all_day && self.end == self.start) {
            return Err(EventValidationError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.participants.is_empty() {
            return Err(EventValidationError::NoParticipants);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    BlankTitle,
    InvalidRange { start: EpochMillis, end: EpochMillis },
    NoParticipants,
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "event title must not be blank"),
            Self::InvalidRange { start, end } => {
                write!(f, "event end {end} must be after start {start}")
            }
            Self::NoParticipants => write!(f, "event needs a department or e-mail participant"),
        }
    }
}

impl Error for EventValidationError {}

#[cfg(test)]
mod tests {
    use super::{CalendarEvent, EventParticipants, EventStatus, EventValidationError};
    use uuid::Uuid;

    fn participants() -> EventParticipants {
        EventParticipants {
            departments: vec!["CS".to_string()],
            emails: Vec::new(),
        }
    }

    #[test]
    fn validates_time_range() {
        let event = CalendarEvent::new(
            "Faculty meeting",
            1_000,
            2_000,
            Uuid::new_v4(),
            participants(),
        );
        assert!(event.validate().is_ok());
        assert_eq!(event.status, EventStatus::Scheduled);

        let backwards = CalendarEvent::new("Broken", 2_000, 1_000, Uuid::new_v4(), participants());
        assert!(matches!(
            backwards.validate(),
            Err(EventValidationError::InvalidRange { .. })
        ));

        let mut all_day = CalendarEvent::new("Holiday", 0, 0, Uuid::new_v4(), participants());
        all_day.all_day = true;
        assert!(all_day.validate().is_ok());
    }

    #[test]
    fn requires_participants() {
        let event = CalendarEvent::new(
            "Nobody",
            0,
            10,
            Uuid::new_v4(),
            EventParticipants::default(),
        );
        assert_eq!(event.validate(), Err(EventValidationError::NoParticipants));
    }
}
