//! Booking, meeting listings and minutes

use super::{
    Command, HandlerContext, HandlerResult, Rejection, done, flag, parse_id, success,
    success_list, trimmed_fields,
};
use chrono::{Local, NaiveDate};
use meeting_protocol::{
    FRAME_DELIMITER, LIST_DELIMITER, Request, Role, StatusCode, SUBFIELD_DELIMITER,
    split_fields_n,
};
use meeting_storage::{
    DATETIME_FORMAT, DateFilter, MeetingStatus, MeetingView, Slot, SlotId, StorageError, UserId,
};
use tracing::info;

/// `date` for today, `week` for this ISO week, anything else for all
fn date_filter(data: &str, today: NaiveDate) -> DateFilter {
    match data.trim() {
        "date" => DateFilter::Day(today),
        "week" => DateFilter::Week(today),
        _ => DateFilter::All,
    }
}

fn meeting_record(view: &MeetingView) -> String {
    format!(
        "{}&{}&{}&{}&{}",
        view.meeting_id,
        view.start.format(DATETIME_FORMAT),
        view.end.format(DATETIME_FORMAT),
        view.counterpart,
        flag(view.is_group)
    )
}

fn slot_not_found() -> Rejection {
    Rejection::new(StatusCode::NotFound, "SLOT_NOT_FOUND")
}

fn slot_not_free() -> Rejection {
    Rejection::new(StatusCode::Conflict, "SLOT_NOT_FREE")
}

/// A slot belonging to `teacher_id`
fn teacher_slot(ctx: &HandlerContext, teacher_id: UserId, slot_id: SlotId) -> Result<Slot, Rejection> {
    let slot = ctx
        .db
        .get_slot(slot_id)?
        .filter(|s| s.teacher_id == teacher_id)
        .ok_or_else(slot_not_found)?;
    Ok(slot)
}

fn booking_conflict(e: StorageError) -> Rejection {
    match e {
        StorageError::NotFound => slot_not_found(),
        StorageError::SlotBooked => slot_not_free(),
        other => other.into(),
    }
}

/// `teacher_id&slot_id`
pub(super) fn book_individual(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Student)?;
    let fields = trimmed_fields(&req.data, SUBFIELD_DELIMITER);
    let [teacher_id, slot_id] = fields.as_slice() else {
        return Err(Rejection::invalid_format());
    };
    let teacher_id = parse_id(teacher_id)?;
    let slot_id = parse_id(slot_id)?;

    let slot = teacher_slot(ctx, teacher_id, slot_id)?;
    if !slot.kind.allows_individual() {
        return Err(Rejection::new(StatusCode::Forbidden, "SLOT_NOT_SUITABLE"));
    }
    if slot.booked {
        return Err(slot_not_free());
    }

    let meeting = ctx
        .db
        .book_slot(slot_id, claims.user_id, false, &[])
        .map_err(booking_conflict)?;
    info!(
        "Meeting {} booked on slot {} by student {}",
        meeting.id, slot_id, claims.user_id
    );
    Ok(success(Command::BookIndividual, [meeting.id.to_string()]))
}

/// `teacher_id&slot_id[&member|member...]`
pub(super) fn book_group(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Student)?;
    let fields = trimmed_fields(&req.data, SUBFIELD_DELIMITER);
    let (teacher_id, slot_id, members) = match fields.as_slice() {
        [teacher_id, slot_id] => (teacher_id, slot_id, ""),
        [teacher_id, slot_id, members] => (teacher_id, slot_id, members.as_str()),
        _ => return Err(Rejection::invalid_format()),
    };
    let teacher_id = parse_id(teacher_id)?;
    let slot_id = parse_id(slot_id)?;
    let members = trimmed_fields(members, LIST_DELIMITER)
        .iter()
        .filter(|id| !id.is_empty())
        .map(|id| parse_id(id))
        .collect::<Result<Vec<UserId>, _>>()?;

    let slot = teacher_slot(ctx, teacher_id, slot_id)?;
    if !slot.kind.allows_group() {
        return Err(Rejection::new(StatusCode::UsernameExists, "SLOT_NOT_SUITABLE"));
    }
    if slot.booked {
        return Err(slot_not_free());
    }

    for &member in &members {
        let is_student = ctx
            .db
            .get_user(member)?
            .is_some_and(|u| u.role == Role::Student);
        if !is_student {
            return Err(Rejection::new(StatusCode::NotFound, "MEMBER_NOT_FOUND"));
        }
    }

    let meeting = ctx
        .db
        .book_slot(slot_id, claims.user_id, true, &members)
        .map_err(booking_conflict)?;
    info!(
        "Group meeting {} booked on slot {} by student {} with {} members",
        meeting.id,
        slot_id,
        claims.user_id,
        meeting.members.len()
    );
    Ok(success(Command::BookGroup, [meeting.id.to_string()]))
}

/// `meeting_id`; only the booking student may cancel
pub(super) fn cancel_meeting(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authenticate(req)?;
    let meeting_id = parse_id(&req.data)?;
    let not_found = || Rejection::new(StatusCode::NotFound, "NOT_FOUND");

    let meeting = ctx
        .db
        .get_meeting(meeting_id)?
        .filter(|m| m.status == MeetingStatus::Pending)
        .ok_or_else(not_found)?;
    if meeting.student_id != claims.user_id {
        return Err(Rejection::forbidden());
    }

    ctx.db.cancel_meeting(meeting_id).map_err(|e| match e {
        StorageError::NotFound => not_found(),
        other => other.into(),
    })?;
    info!("Meeting {} cancelled by student {}", meeting_id, claims.user_id);
    Ok(done(Command::CancelMeeting))
}

/// The caller's pending meetings as a student, booked or joined
pub(super) fn list_meetings(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authenticate(req)?;
    let filter = date_filter(&req.data, Local::now().date_naive());
    let records = ctx
        .db
        .student_meetings(claims.user_id, filter)?
        .iter()
        .map(meeting_record)
        .collect();
    Ok(success_list(Command::ListMeetings, records))
}

pub(super) fn list_appointments(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let filter = date_filter(&req.data, Local::now().date_naive());
    let records = ctx
        .db
        .teacher_appointments(claims.user_id, filter)?
        .iter()
        .map(meeting_record)
        .collect();
    Ok(success_list(Command::ListAppointments, records))
}

/// `meeting_id||content`; content is stored verbatim
pub(super) fn add_minutes(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let fields = split_fields_n(&req.data, FRAME_DELIMITER, 2);
    let [meeting_id, content] = fields.as_slice() else {
        return Err(Rejection::invalid_format());
    };
    let meeting_id = parse_id(meeting_id)?;

    let meeting = ctx
        .db
        .get_meeting(meeting_id)?
        .ok_or(Rejection::new(StatusCode::NotFound, "MEETING_NOT_FOUND"))?;
    if meeting.teacher_id != claims.user_id {
        return Err(Rejection::forbidden());
    }

    ctx.minutes.put(meeting_id, content)?;
    info!("Minutes saved for meeting {}", meeting_id);
    Ok(done(Command::AddMinutes))
}

/// `meeting_id`; readable by the meeting's teacher and participants
pub(super) fn get_minutes(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authenticate(req)?;
    let meeting_id = parse_id(&req.data)?;
    let not_found = || Rejection::new(StatusCode::NotFound, "NOT_FOUND");

    let meeting = ctx.db.get_meeting(meeting_id)?.ok_or_else(not_found)?;
    if meeting.teacher_id != claims.user_id && !meeting.has_participant(claims.user_id) {
        return Err(Rejection::forbidden());
    }

    let content = ctx.minutes.get(meeting_id)?.ok_or_else(not_found)?;
    Ok(success(Command::GetMinutes, [content]))
}

/// `student_id`; newest first, flagging meetings with minutes
pub(super) fn view_history(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let claims = ctx.authorize(req, Role::Teacher)?;
    let student_id = parse_id(&req.data)?;

    let records = ctx
        .db
        .history(claims.user_id, student_id)?
        .iter()
        .map(|entry| {
            format!(
                "{}&{}&{}",
                entry.meeting_id,
                entry.start.format(DATETIME_FORMAT),
                flag(ctx.minutes.exists(entry.meeting_id))
            )
        })
        .collect();
    Ok(success_list(Command::ViewHistory, records))
}
