//! In-memory database backend with optional JSON snapshot
//!
//! Every handle opened from one [`MemoryBackend`] sees the same tables, the
//! way separate client connections see one database server. When a snapshot
//! path is configured, each mutation rewrites the snapshot before returning.

use crate::database::{
    Backend, DateFilter, Database, FreeSlot, HistoryEntry, Meeting, MeetingId, MeetingStatus,
    MeetingView, Slot, SlotId, SlotKind, StorageError, User, UserId,
};
use chrono::NaiveDateTime;
use meeting_protocol::Role;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct Tables {
    users: BTreeMap<UserId, User>,
    slots: BTreeMap<SlotId, Slot>,
    meetings: BTreeMap<MeetingId, Meeting>,
    last_user_id: UserId,
    last_slot_id: SlotId,
    last_meeting_id: MeetingId,
}

impl Tables {
    fn username(&self, user_id: UserId) -> String {
        self.users
            .get(&user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn meeting_view(&self, meeting: &Meeting, counterpart: UserId) -> Option<MeetingView> {
        let slot = self.slots.get(&meeting.slot_id)?;
        Some(MeetingView {
            meeting_id: meeting.id,
            start: slot.start,
            end: slot.end,
            counterpart: self.username(counterpart),
            is_group: meeting.is_group,
        })
    }
}

struct Shared {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
}

/// Backend holding all tables in process memory
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    /// Create an empty, purely in-memory backend
    pub fn new() -> Self {
        Self::from_tables(Tables::default(), None)
    }

    /// Create a backend persisted to `path`, loading it if it exists
    pub fn with_snapshot(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let tables: Tables = serde_json::from_str(&content)?;
            info!(
                "Loaded snapshot {} ({} users, {} slots, {} meetings)",
                path.display(),
                tables.users.len(),
                tables.slots.len(),
                tables.meetings.len()
            );
            tables
        } else {
            Tables::default()
        };
        Ok(Self::from_tables(tables, Some(path)))
    }

    fn from_tables(tables: Tables, snapshot: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(tables),
                snapshot,
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn open(&self) -> Result<Box<dyn Database>, StorageError> {
        Ok(Box::new(MemoryDatabase {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// One handle onto a [`MemoryBackend`]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StorageError> {
        Ok(f(&self.shared.tables.read()))
    }

    /// Apply `f` to a copy of the tables; the copy replaces the live tables
    /// only once `f` and the snapshot write have both succeeded.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut tables = self.shared.tables.write();
        let mut next = tables.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.shared.snapshot {
            save_snapshot(path, &next)?;
        }
        *tables = next;
        Ok(out)
    }
}

fn save_snapshot(path: &Path, tables: &Tables) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(tables)?)?;
    std::fs::rename(&tmp, path)?;
    debug!("Snapshot written to {}", path.display());
    Ok(())
}

impl Database for MemoryDatabase {
    fn find_user(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.read(|t| t.users.values().find(|u| u.username == username).cloned())
    }

    fn get_user(&self, user_id: UserId) -> Result<Option<User>, StorageError> {
        self.read(|t| t.users.get(&user_id).cloned())
    }

    fn create_user(
        &mut self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StorageError> {
        self.mutate(|t| {
            if t.users.values().any(|u| u.username == username) {
                return Err(StorageError::AlreadyExists);
            }
            t.last_user_id += 1;
            let user = User {
                id: t.last_user_id,
                username: username.to_owned(),
                password_hash: password_hash.to_owned(),
                role,
            };
            t.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    fn list_students(&self, exclude: UserId) -> Result<Vec<User>, StorageError> {
        self.read(|t| {
            let mut students: Vec<User> = t
                .users
                .values()
                .filter(|u| u.role == Role::Student && u.id != exclude)
                .cloned()
                .collect();
            students.sort_by(|a, b| a.username.cmp(&b.username));
            students
        })
    }

    fn students_of_teacher(&self, teacher_id: UserId) -> Result<Vec<User>, StorageError> {
        self.read(|t| {
            let ids: BTreeSet<UserId> = t
                .meetings
                .values()
                .filter(|m| m.teacher_id == teacher_id)
                .flat_map(|m| std::iter::once(m.student_id).chain(m.members.iter().copied()))
                .collect();
            let mut students: Vec<User> =
                ids.iter().filter_map(|id| t.users.get(id).cloned()).collect();
            students.sort_by(|a, b| a.username.cmp(&b.username));
            students
        })
    }

    fn has_overlap(
        &self,
        teacher_id: UserId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<SlotId>,
    ) -> Result<bool, StorageError> {
        self.read(|t| {
            t.slots.values().any(|s| {
                s.teacher_id == teacher_id && Some(s.id) != exclude && s.overlaps(start, end)
            })
        })
    }

    fn create_slot(
        &mut self,
        teacher_id: UserId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        kind: SlotKind,
    ) -> Result<Slot, StorageError> {
        self.mutate(|t| {
            t.last_slot_id += 1;
            let slot = Slot {
                id: t.last_slot_id,
                teacher_id,
                start,
                end,
                kind,
                booked: false,
            };
            t.slots.insert(slot.id, slot.clone());
            Ok(slot)
        })
    }

    fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>, StorageError> {
        self.read(|t| t.slots.get(&slot_id).cloned())
    }

    fn update_slot(
        &mut self,
        slot_id: SlotId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        kind: SlotKind,
    ) -> Result<(), StorageError> {
        self.mutate(|t| {
            let slot = t.slots.get_mut(&slot_id).ok_or(StorageError::NotFound)?;
            if slot.booked {
                return Err(StorageError::SlotBooked);
            }
            slot.start = start;
            slot.end = end;
            slot.kind = kind;
            Ok(())
        })
    }

    fn delete_slot(&mut self, slot_id: SlotId) -> Result<(), StorageError> {
        self.mutate(|t| {
            let slot = t.slots.get(&slot_id).ok_or(StorageError::NotFound)?;
            if slot.booked {
                return Err(StorageError::SlotBooked);
            }
            t.slots.remove(&slot_id);
            Ok(())
        })
    }

    fn free_slots(&self, teacher_id: Option<UserId>) -> Result<Vec<FreeSlot>, StorageError> {
        self.read(|t| {
            let mut free: Vec<FreeSlot> = t
                .slots
                .values()
                .filter(|s| !s.booked && teacher_id.is_none_or(|id| s.teacher_id == id))
                .map(|s| FreeSlot {
                    slot: s.clone(),
                    teacher_name: t.username(s.teacher_id),
                })
                .collect();
            free.sort_by_key(|f| (f.slot.start, f.slot.id));
            free
        })
    }

    fn teacher_slots(&self, teacher_id: UserId) -> Result<Vec<Slot>, StorageError> {
        self.read(|t| {
            let mut slots: Vec<Slot> = t
                .slots
                .values()
                .filter(|s| s.teacher_id == teacher_id)
                .cloned()
                .collect();
            slots.sort_by_key(|s| (s.start, s.id));
            slots
        })
    }

    fn book_slot(
        &mut self,
        slot_id: SlotId,
        student_id: UserId,
        is_group: bool,
        members: &[UserId],
    ) -> Result<Meeting, StorageError> {
        self.mutate(|t| {
            let slot = t.slots.get_mut(&slot_id).ok_or(StorageError::NotFound)?;
            if slot.booked {
                return Err(StorageError::SlotBooked);
            }
            slot.booked = true;
            let teacher_id = slot.teacher_id;

            let mut unique = BTreeSet::new();
            let members: Vec<UserId> = members
                .iter()
                .copied()
                .filter(|&id| id != student_id && unique.insert(id))
                .collect();

            t.last_meeting_id += 1;
            let meeting = Meeting {
                id: t.last_meeting_id,
                slot_id,
                teacher_id,
                student_id,
                is_group,
                status: MeetingStatus::Pending,
                members,
            };
            t.meetings.insert(meeting.id, meeting.clone());
            Ok(meeting)
        })
    }

    fn get_meeting(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, StorageError> {
        self.read(|t| t.meetings.get(&meeting_id).cloned())
    }

    fn cancel_meeting(&mut self, meeting_id: MeetingId) -> Result<(), StorageError> {
        self.mutate(|t| {
            let meeting = t
                .meetings
                .get_mut(&meeting_id)
                .filter(|m| m.status == MeetingStatus::Pending)
                .ok_or(StorageError::NotFound)?;
            meeting.status = MeetingStatus::Cancelled;
            let slot_id = meeting.slot_id;
            if let Some(slot) = t.slots.get_mut(&slot_id) {
                slot.booked = false;
            }
            Ok(())
        })
    }

    fn student_meetings(
        &self,
        student_id: UserId,
        filter: DateFilter,
    ) -> Result<Vec<MeetingView>, StorageError> {
        self.read(|t| {
            let mut views: Vec<MeetingView> = t
                .meetings
                .values()
                .filter(|m| m.status == MeetingStatus::Pending && m.has_participant(student_id))
                .filter_map(|m| t.meeting_view(m, m.teacher_id))
                .filter(|v| filter.matches(v.start))
                .collect();
            views.sort_by_key(|v| (v.start, v.meeting_id));
            views
        })
    }

    fn teacher_appointments(
        &self,
        teacher_id: UserId,
        filter: DateFilter,
    ) -> Result<Vec<MeetingView>, StorageError> {
        self.read(|t| {
            let mut views: Vec<MeetingView> = t
                .meetings
                .values()
                .filter(|m| m.status == MeetingStatus::Pending && m.teacher_id == teacher_id)
                .filter_map(|m| t.meeting_view(m, m.student_id))
                .filter(|v| filter.matches(v.start))
                .collect();
            views.sort_by_key(|v| (v.start, v.meeting_id));
            views
        })
    }

    fn history(
        &self,
        teacher_id: UserId,
        student_id: UserId,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        self.read(|t| {
            let mut entries: Vec<HistoryEntry> = t
                .meetings
                .values()
                .filter(|m| m.teacher_id == teacher_id && m.has_participant(student_id))
                .filter_map(|m| {
                    t.slots.get(&m.slot_id).map(|s| HistoryEntry {
                        meeting_id: m.id,
                        start: s.start,
                    })
                })
                .collect();
            entries.sort_by(|a, b| b.start.cmp(&a.start).then(b.meeting_id.cmp(&a.meeting_id)));
            entries
        })
    }
}
