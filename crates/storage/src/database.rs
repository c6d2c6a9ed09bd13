//! Storage records and the per-connection database handle

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use meeting_protocol::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = i64;
pub type SlotId = i64;
pub type MeetingId = i64;

/// Wire and display format of slot timestamps
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found")]
    NotFound,

    #[error("Record already exists")]
    AlreadyExists,

    #[error("Slot already booked")]
    SlotBooked,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Registered account
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Which meeting kinds a slot accepts (wire codes 0, 1, 2)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Individual,
    Group,
    Both,
}

impl SlotKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Individual),
            1 => Some(Self::Group),
            2 => Some(Self::Both),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Individual => 0,
            Self::Group => 1,
            Self::Both => 2,
        }
    }

    /// Label used in list payloads
    pub fn label(self) -> &'static str {
        match self {
            Self::Individual => "Individual",
            Self::Group => "Group",
            Self::Both => "Both",
        }
    }

    pub fn allows_individual(self) -> bool {
        matches!(self, Self::Individual | Self::Both)
    }

    pub fn allows_group(self) -> bool {
        matches!(self, Self::Group | Self::Both)
    }
}

/// Time window offered by a teacher
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: SlotId,
    pub teacher_id: UserId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub kind: SlotKind,
    pub booked: bool,
}

impl Slot {
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Pending,
    Cancelled,
}

/// A booked slot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Meeting {
    pub id: MeetingId,
    pub slot_id: SlotId,
    pub teacher_id: UserId,
    /// Student who made the booking
    pub student_id: UserId,
    pub is_group: bool,
    pub status: MeetingStatus,
    /// Additional group members, booker excluded
    pub members: Vec<UserId>,
}

impl Meeting {
    /// Booker or group member
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.student_id == user_id || self.members.contains(&user_id)
    }
}

/// Free slot joined with its teacher's name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSlot {
    pub slot: Slot,
    pub teacher_name: String,
}

/// Pending meeting as listed to one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingView {
    pub meeting_id: MeetingId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Teacher name for students, booker name for teachers
    pub counterpart: String,
    pub is_group: bool,
}

/// One past or upcoming meeting between a teacher and a student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub meeting_id: MeetingId,
    pub start: NaiveDateTime,
}

/// Restricts meeting listings by start date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    All,
    /// Meetings starting on this day
    Day(NaiveDate),
    /// Meetings starting in this day's ISO week
    Week(NaiveDate),
}

impl DateFilter {
    pub fn matches(self, start: NaiveDateTime) -> bool {
        match self {
            Self::All => true,
            Self::Day(day) => start.date() == day,
            Self::Week(day) => start.date().iso_week() == day.iso_week(),
        }
    }
}

/// Private storage handle owned by one connection
///
/// Calls are synchronous and may block.
pub trait Database: Send {
    fn find_user(&self, username: &str) -> Result<Option<User>, StorageError>;

    fn get_user(&self, user_id: UserId) -> Result<Option<User>, StorageError>;

    /// Fails with [`StorageError::AlreadyExists`] for a taken username
    fn create_user(
        &mut self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StorageError>;

    /// All students except `exclude`, ordered by username
    fn list_students(&self, exclude: UserId) -> Result<Vec<User>, StorageError>;

    /// Students who booked or joined a meeting on the teacher's slots
    fn students_of_teacher(&self, teacher_id: UserId) -> Result<Vec<User>, StorageError>;

    /// Whether any of the teacher's slots overlaps `[start, end)`
    fn has_overlap(
        &self,
        teacher_id: UserId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<SlotId>,
    ) -> Result<bool, StorageError>;

    fn create_slot(
        &mut self,
        teacher_id: UserId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        kind: SlotKind,
    ) -> Result<Slot, StorageError>;

    fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>, StorageError>;

    fn update_slot(
        &mut self,
        slot_id: SlotId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        kind: SlotKind,
    ) -> Result<(), StorageError>;

    fn delete_slot(&mut self, slot_id: SlotId) -> Result<(), StorageError>;

    /// Unbooked slots, optionally for one teacher, ordered by start
    fn free_slots(&self, teacher_id: Option<UserId>) -> Result<Vec<FreeSlot>, StorageError>;

    /// All of a teacher's slots, ordered by start
    fn teacher_slots(&self, teacher_id: UserId) -> Result<Vec<Slot>, StorageError>;

    /// Create a meeting and mark its slot booked in one step.
    ///
    /// Fails with [`StorageError::SlotBooked`] if the slot was taken.
    fn book_slot(
        &mut self,
        slot_id: SlotId,
        student_id: UserId,
        is_group: bool,
        members: &[UserId],
    ) -> Result<Meeting, StorageError>;

    fn get_meeting(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, StorageError>;

    /// Cancel a pending meeting and free its slot
    fn cancel_meeting(&mut self, meeting_id: MeetingId) -> Result<(), StorageError>;

    /// Pending meetings the student booked or joined
    fn student_meetings(
        &self,
        student_id: UserId,
        filter: DateFilter,
    ) -> Result<Vec<MeetingView>, StorageError>;

    /// Pending meetings on the teacher's slots
    fn teacher_appointments(
        &self,
        teacher_id: UserId,
        filter: DateFilter,
    ) -> Result<Vec<MeetingView>, StorageError>;

    /// Meetings of any status between teacher and student, newest first
    fn history(
        &self,
        teacher_id: UserId,
        student_id: UserId,
    ) -> Result<Vec<HistoryEntry>, StorageError>;
}

/// Opens private database handles, one per connection
pub trait Backend: Send + Sync {
    fn open(&self) -> Result<Box<dyn Database>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    #[test]
    fn test_slot_kind_codes() {
        for code in 0..3 {
            assert_eq!(SlotKind::from_code(code).unwrap().code(), code);
        }
        assert_eq!(SlotKind::from_code(3), None);
        assert!(SlotKind::Both.allows_group() && SlotKind::Both.allows_individual());
        assert!(!SlotKind::Group.allows_individual());
        assert!(!SlotKind::Individual.allows_group());
    }

    #[test]
    fn test_overlap_is_half_open() {
        let slot = Slot {
            id: 1,
            teacher_id: 1,
            start: at("2026-03-02 09:00:00"),
            end: at("2026-03-02 10:00:00"),
            kind: SlotKind::Both,
            booked: false,
        };
        assert!(slot.overlaps(at("2026-03-02 09:30:00"), at("2026-03-02 10:30:00")));
        assert!(!slot.overlaps(at("2026-03-02 10:00:00"), at("2026-03-02 11:00:00")));
        assert!(!slot.overlaps(at("2026-03-02 08:00:00"), at("2026-03-02 09:00:00")));
    }

    #[test]
    fn test_date_filter() {
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let start = at("2026-03-05 14:00:00");
        assert!(DateFilter::All.matches(start));
        assert!(DateFilter::Week(monday).matches(start));
        assert!(!DateFilter::Day(monday).matches(start));
        assert!(!DateFilter::Week(monday).matches(at("2026-03-09 09:00:00")));
    }
}
