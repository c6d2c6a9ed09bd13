//! Command catalog and dispatch
//!
//! Every handler receives the decoded [`Request`] and the connection's
//! [`HandlerContext`]. Handlers that need an identity validate the token
//! themselves; the connection layer never inspects it. Outcomes are reported
//! as `<COMMAND>_<OUTCOME>` payloads under a status from the closed catalog.

mod auth;
mod meeting;
mod slot;

use meeting_crypto::{TokenError, TokenService};
use meeting_protocol::{
    FRAME_DELIMITER, Request, Response, Role, StatusCode, TokenClaims, join_fields, split_fields,
};
use meeting_storage::{Database, MinutesError, MinutesStore, StorageError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Everything a handler may touch, owned by one connection
pub struct HandlerContext {
    /// Shared, immutable token service
    pub tokens: Arc<TokenService>,

    /// This connection's private database handle
    pub db: Box<dyn Database>,

    pub minutes: MinutesStore,
}

impl HandlerContext {
    pub fn new(tokens: Arc<TokenService>, db: Box<dyn Database>, minutes: MinutesStore) -> Self {
        Self { tokens, db, minutes }
    }

    /// Validate the request token
    fn authenticate(&self, req: &Request) -> Result<TokenClaims, Rejection> {
        self.tokens.validate(req.token.trim()).map_err(|e| {
            debug!("{} token rejected: {}", req.command, e);
            Rejection::new(StatusCode::TokenInvalid, "INVALID_TOKEN")
        })
    }

    /// Validate the request token and require a role
    fn authorize(&self, req: &Request, role: Role) -> Result<TokenClaims, Rejection> {
        let claims = self.authenticate(req)?;
        if claims.role != role {
            return Err(Rejection::forbidden());
        }
        Ok(claims)
    }
}

/// The closed set of commands the server understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    Login,
    Logout,
    AddSlot,
    UpdateSlot,
    DeleteSlot,
    ListFreeSlots,
    ListMySlots,
    ListStudents,
    ListAllStudents,
    BookIndividual,
    BookGroup,
    CancelMeeting,
    ListMeetings,
    ListAppointments,
    AddMinutes,
    GetMinutes,
    ViewHistory,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::Register,
        Command::Login,
        Command::Logout,
        Command::AddSlot,
        Command::UpdateSlot,
        Command::DeleteSlot,
        Command::ListFreeSlots,
        Command::ListMySlots,
        Command::ListStudents,
        Command::ListAllStudents,
        Command::BookIndividual,
        Command::BookGroup,
        Command::CancelMeeting,
        Command::ListMeetings,
        Command::ListAppointments,
        Command::AddMinutes,
        Command::GetMinutes,
        Command::ViewHistory,
    ];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            Command::Register => "REGISTER",
            Command::Login => "LOGIN",
            Command::Logout => "LOGOUT",
            Command::AddSlot => "ADD_SLOT",
            Command::UpdateSlot => "UPDATE_SLOT",
            Command::DeleteSlot => "DELETE_SLOT",
            Command::ListFreeSlots => "LIST_FREE_SLOTS",
            Command::ListMySlots => "LIST_MY_SLOTS",
            Command::ListStudents => "LIST_STUDENTS",
            Command::ListAllStudents => "LIST_ALL_STUDENTS",
            Command::BookIndividual => "BOOK_INDIVIDUAL",
            Command::BookGroup => "BOOK_GROUP",
            Command::CancelMeeting => "CANCEL_MEETING",
            Command::ListMeetings => "LIST_MEETINGS",
            Command::ListAppointments => "LIST_APPOINTMENTS",
            Command::AddMinutes => "ADD_MINUTES",
            Command::GetMinutes => "GET_MINUTES",
            Command::ViewHistory => "VIEW_HISTORY",
        }
    }

    /// Exact, case-sensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handler outcome other than success
#[derive(Debug)]
pub(crate) enum Rejection {
    /// Expected domain outcome: status plus payload suffix
    Status(StatusCode, &'static str),

    Storage(StorageError),

    Minutes(MinutesError),

    Token(TokenError),
}

impl Rejection {
    fn new(status: StatusCode, outcome: &'static str) -> Self {
        Rejection::Status(status, outcome)
    }

    fn invalid_format() -> Self {
        Rejection::new(StatusCode::BadRequest, "INVALID_FORMAT")
    }

    fn forbidden() -> Self {
        Rejection::new(StatusCode::Forbidden, "FORBIDDEN")
    }

    fn into_response(self, command: Command) -> Response {
        match self {
            Rejection::Status(status, outcome) => Response::new(status, format!("{command}_{outcome}")),
            Rejection::Storage(e) => {
                error!("{} storage failure: {}", command, e);
                Response::new(StatusCode::InternalError, format!("{command}_INTERNAL_ERROR"))
            }
            Rejection::Minutes(e) => {
                error!("{} minutes failure: {}", command, e);
                Response::new(StatusCode::InternalError, format!("{command}_FILE_ERROR"))
            }
            Rejection::Token(e) => {
                error!("{} token issue failure: {}", command, e);
                Response::new(StatusCode::InternalError, format!("{command}_INTERNAL_ERROR"))
            }
        }
    }
}

impl From<StorageError> for Rejection {
    fn from(e: StorageError) -> Self {
        Rejection::Storage(e)
    }
}

impl From<MinutesError> for Rejection {
    fn from(e: MinutesError) -> Self {
        Rejection::Minutes(e)
    }
}

impl From<TokenError> for Rejection {
    fn from(e: TokenError) -> Self {
        Rejection::Token(e)
    }
}

pub(crate) type HandlerResult = Result<Response, Rejection>;

/// Route one request to its handler and render the outcome
pub fn dispatch(ctx: &mut HandlerContext, req: &Request) -> Response {
    let Some(command) = Command::from_name(&req.command) else {
        return Response::new(
            StatusCode::BadRequest,
            format!("UNKNOWN_COMMAND: {}", req.command),
        );
    };

    let result = match command {
        Command::Register => auth::register(ctx, req),
        Command::Login => auth::login(ctx, req),
        Command::Logout => auth::logout(ctx, req),
        Command::AddSlot => slot::add_slot(ctx, req),
        Command::UpdateSlot => slot::update_slot(ctx, req),
        Command::DeleteSlot => slot::delete_slot(ctx, req),
        Command::ListFreeSlots => slot::list_free_slots(ctx, req),
        Command::ListMySlots => slot::list_my_slots(ctx, req),
        Command::ListStudents => slot::list_students(ctx, req),
        Command::ListAllStudents => slot::list_all_students(ctx, req),
        Command::BookIndividual => meeting::book_individual(ctx, req),
        Command::BookGroup => meeting::book_group(ctx, req),
        Command::CancelMeeting => meeting::cancel_meeting(ctx, req),
        Command::ListMeetings => meeting::list_meetings(ctx, req),
        Command::ListAppointments => meeting::list_appointments(ctx, req),
        Command::AddMinutes => meeting::add_minutes(ctx, req),
        Command::GetMinutes => meeting::get_minutes(ctx, req),
        Command::ViewHistory => meeting::view_history(ctx, req),
    };

    result.unwrap_or_else(|rejection| rejection.into_response(command))
}

/// Bare `<COMMAND>_SUCCESS`
fn done(command: Command) -> Response {
    Response::ok(format!("{command}_SUCCESS"))
}

/// `<COMMAND>_SUCCESS` followed by extra payload fields
fn success<I, S>(command: Command, extra: I) -> Response
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut fields = vec![format!("{command}_SUCCESS")];
    fields.extend(extra.into_iter().map(|s| s.as_ref().to_owned()));
    Response::ok(join_fields(fields, FRAME_DELIMITER))
}

/// `<COMMAND>_SUCCESS||rec||rec...`, or `<COMMAND>_SUCCESS||EMPTY`
fn success_list(command: Command, records: Vec<String>) -> Response {
    if records.is_empty() {
        success(command, ["EMPTY"])
    } else {
        success(command, records)
    }
}

/// Split and trim one level of `data`
fn trimmed_fields(data: &str, delimiter: &str) -> Vec<String> {
    split_fields(data, delimiter)
        .into_iter()
        .map(|f| f.trim().to_owned())
        .collect()
}

fn parse_id(field: &str) -> Result<i64, Rejection> {
    field.trim().parse().map_err(|_| Rejection::invalid_format())
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}
