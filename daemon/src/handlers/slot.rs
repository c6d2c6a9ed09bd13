//! Slot management and directory listings

use super::{
    Command, HandlerContext, HandlerResult, Rejection, done, flag, parse_id, success,
    success_list, trimmed_fields,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use meeting_protocol::{FRAME_DELIMITER, Request, Role, StatusCode, SUBFIELD_DELIMITER};
use meeting_storage::{DATETIME_FORMAT, Slot, SlotId, SlotKind, StorageError, User, UserId};
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

fn parse_date(field: &str) -> Result<NaiveDate, Rejection> {
    NaiveDate::parse_from_str(field, DATE_FORMAT).map_err(|_| Rejection::invalid_format())
}

/// `HH:MM`, or `HH:MM:SS`
fn parse_time(field: &str) -> Result<NaiveTime, Rejection> {
    NaiveTime::parse_from_str(field, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(field, TIME_FORMAT))
        .map_err(|_| Rejection::invalid_format())
}

/// `YYYY-MM-DD HH:MM:SS`, or without seconds
pub(super) fn parse_datetime(field: &str) -> Result<NaiveDateTime, Rejection> {
    NaiveDateTime::parse_from_str(field, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(field, "%Y-%m-%d %H:%M"))
        .map_err(|_| Rejection::invalid_format())
}

fn parse_kind(field: &str) -> Result<SlotKind, Rejection> {
    field
        .parse()
        .ok()
        .and_then(SlotKind::from_code)
        .ok_or(Rejection::new(StatusCode::BadRequest, "INVALID_TYPE"))
}

fn check_window(start: NaiveDateTime, end: NaiveDateTime) -> Result<(), Rejection> {
    if start >= end {
        return Err(Rejection::new(StatusCode::BadRequest, "INVALID_TIME"));
    }
    Ok(())
}

fn not_found() -> Rejection {
    Rejection::new(StatusCode::NotFound, "NOT_FOUND")
}

fn in_use() -> Rejection {
    Rejection::new(StatusCode::UsernameExists, "IN_USE")
}

fn time_overlap() -> Rejection {
    Rejection::new(StatusCode::UsernameExists, "TIME_OVERLAP")
}

fn slot_conflict(e: StorageError) -> Rejection {
    match e {
        StorageError::NotFound => not_found(),
        StorageError::SlotBooked => in_use(),
        other => other.into(),
    }
}

/// A slot owned by `teacher_id`; other teachers' slots are reported missing
fn owned_slot(ctx: &HandlerContext, teacher_id: UserId, slot_id: SlotId) -> Result<Slot, Rejection> {
    ctx.db
        .get_slot(slot_id)?
        .filter(|s| s.teacher_id == teacher_id)
        .ok_or_else(not_found)
}

fn student_record(user: &User) -> String {
    format!("{}&{}", user.id, user.username)
}

/// `date||HH:MM||HH:MM||type`
pub(super) fn add_slot(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let fields = trimmed_fields(&req.data, FRAME_DELIMITER);
    let [date, start, end, kind] = fields.as_slice() else {
        return Err(Rejection::invalid_format());
    };
    let kind = parse_kind(kind)?;
    let date = parse_date(date)?;
    let start = date.and_time(parse_time(start)?);
    let end = date.and_time(parse_time(end)?);
    check_window(start, end)?;

    if ctx.db.has_overlap(claims.user_id, start, end, None)? {
        return Err(time_overlap());
    }

    let slot = ctx.db.create_slot(claims.user_id, start, end, kind)?;
    info!("Slot {} added by teacher {}", slot.id, claims.user_id);
    Ok(success(Command::AddSlot, [slot.id.to_string()]))
}

/// `slot_id&start&end&type`
pub(super) fn update_slot(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let fields = trimmed_fields(&req.data, SUBFIELD_DELIMITER);
    let [slot_id, start, end, kind] = fields.as_slice() else {
        return Err(Rejection::invalid_format());
    };
    let slot_id = parse_id(slot_id)?;
    let kind = parse_kind(kind)?;
    let start = parse_datetime(start)?;
    let end = parse_datetime(end)?;
    check_window(start, end)?;

    let slot = owned_slot(ctx, claims.user_id, slot_id)?;
    if slot.booked {
        return Err(in_use());
    }
    if ctx.db.has_overlap(claims.user_id, start, end, Some(slot_id))? {
        return Err(time_overlap());
    }

    ctx.db
        .update_slot(slot_id, start, end, kind)
        .map_err(slot_conflict)?;
    info!("Slot {} updated by teacher {}", slot_id, claims.user_id);
    Ok(done(Command::UpdateSlot))
}

/// `slot_id`
pub(super) fn delete_slot(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let slot_id = parse_id(&req.data)?;

    let slot = owned_slot(ctx, claims.user_id, slot_id)?;
    if slot.booked {
        return Err(in_use());
    }

    ctx.db.delete_slot(slot_id).map_err(slot_conflict)?;
    info!("Slot {} deleted by teacher {}", slot_id, claims.user_id);
    Ok(done(Command::DeleteSlot))
}

/// `teacher_id`, or `0`/empty for every teacher
pub(super) fn list_free_slots(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    ctx.authenticate(req)?;
    let teacher = match req.data.trim() {
        "" | "0" => None,
        id => Some(parse_id(id)?),
    };

    let records = ctx
        .db
        .free_slots(teacher)?
        .iter()
        .map(|free| {
            let slot = &free.slot;
            format!(
                "{}&{}&{}&{}&{}&{}",
                slot.id,
                slot.teacher_id,
                free.teacher_name,
                slot.start.format(DATETIME_FORMAT),
                slot.end.format(DATETIME_FORMAT),
                slot.kind.label()
            )
        })
        .collect();
    Ok(success_list(Command::ListFreeSlots, records))
}

pub(super) fn list_my_slots(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;

    let records = ctx
        .db
        .teacher_slots(claims.user_id)?
        .iter()
        .map(|slot| {
            format!(
                "{}&{}&{}&{}&{}&{}",
                slot.id,
                slot.start.format(DATE_FORMAT),
                slot.start.format(TIME_FORMAT),
                slot.end.format(TIME_FORMAT),
                slot.kind.label(),
                flag(slot.booked)
            )
        })
        .collect();
    Ok(success_list(Command::ListMySlots, records))
}

/// Students who have had a meeting with the calling teacher
pub(super) fn list_students(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let records = ctx
        .db
        .students_of_teacher(claims.user_id)?
        .iter()
        .map(student_record)
        .collect();
    Ok(success_list(Command::ListStudents, records))
}

/// Every student but the caller, for picking group members
pub(super) fn list_all_students(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authenticate(req)?;
    let records = ctx
        .db
        .list_students(claims.user_id)?
        .iter()
        .map(student_record)
        .collect();
    Ok(success_list(Command::ListAllStudents, records))
}
