//! REGISTER, LOGIN and LOGOUT

use super::{Command, HandlerContext, HandlerResult, Rejection, done, success, trimmed_fields};
use meeting_crypto::{TOKEN_FIELD_DELIMITER, hash_password, verify_password};
use meeting_protocol::{
    FRAME_DELIMITER, LIST_DELIMITER, Request, Role, StatusCode, SUBFIELD_DELIMITER,
};
use meeting_storage::StorageError;
use tracing::info;

/// Usernames appear in token fields, LOGIN subfields and list records
fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && ![TOKEN_FIELD_DELIMITER, SUBFIELD_DELIMITER, LIST_DELIMITER]
            .iter()
            .any(|d| username.contains(*d))
}

/// `username||password||role`
pub(super) fn register(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let fields = trimmed_fields(&req.data, FRAME_DELIMITER);
    let [username, password, role] = fields.as_slice() else {
        return Err(Rejection::invalid_format());
    };
    // LOGIN splits `username&password`, so neither half may hold `&`
    if !valid_username(username) || password.is_empty() || password.contains(SUBFIELD_DELIMITER) {
        return Err(Rejection::invalid_format());
    }
    let role: Role = role
        .parse()
        .map_err(|_| Rejection::new(StatusCode::BadRequest, "INVALID_ROLE"))?;

    let user = match ctx.db.create_user(username, &hash_password(password), role) {
        Ok(user) => user,
        Err(StorageError::AlreadyExists) => {
            return Err(Rejection::new(StatusCode::UsernameExists, "USERNAME_EXISTS"));
        }
        Err(e) => return Err(e.into()),
    };

    let token = ctx.tokens.issue(user.id, &user.username, user.role)?;
    info!("Registered user {} ({}) as {}", user.id, user.username, user.role);
    Ok(success(Command::Register, [token.as_str(), user.role.as_str()]))
}

/// `username&password`
pub(super) fn login(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    let fields = trimmed_fields(&req.data, SUBFIELD_DELIMITER);
    let [username, password] = fields.as_slice() else {
        return Err(Rejection::invalid_format());
    };
    if username.is_empty() || password.is_empty() {
        return Err(Rejection::invalid_format());
    }

    let user = ctx
        .db
        .find_user(username)?
        .ok_or(Rejection::new(StatusCode::NotFound, "USER_NOT_FOUND"))?;
    if !verify_password(password, &user.password_hash) {
        return Err(Rejection::new(StatusCode::WrongPassword, "WRONG_PASSWORD"));
    }

    let token = ctx.tokens.issue(user.id, &user.username, user.role)?;
    info!("User {} ({}) logged in", user.id, user.username);
    Ok(success(Command::Login, [token.as_str(), user.role.as_str()]))
}

/// Tokens are stateless, so logout only confirms the caller held a valid one
pub(super) fn logout(ctx: &mut HandlerContext, req: &Request) -> HandlerResult {
    match ctx.authenticate(req) {
        Ok(claims) => {
            info!("User {} logged out", claims.user_id);
            Ok(done(Command::Logout))
        }
        Err(_) => Err(Rejection::new(StatusCode::Forbidden, "NOT_LOGGED_IN")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;

    #[test]
    fn test_register_then_login() {
        let mut fx = Fixture::new();

        let res = fx.send("REGISTER", "", " bob||secret||student");
        assert_eq!(res.status, StatusCode::Ok);
        let fields = res.fields();
        assert_eq!(fields[0], "REGISTER_SUCCESS");
        assert_eq!(fields[2], "student");
        let first_token = fields[1].clone();
        let registered = fx.ctx.tokens.validate(&first_token).unwrap();

        let res = fx.send("LOGIN", "", "bob&secret");
        assert_eq!(res.status, StatusCode::Ok);
        let fields = res.fields();
        assert_eq!(fields[0], "LOGIN_SUCCESS");
        assert_eq!(fields[2], "student");
        let logged_in = fx.ctx.tokens.validate(&fields[1]).unwrap();

        assert_ne!(fields[1], first_token);
        assert_eq!(logged_in.user_id, registered.user_id);
        assert_eq!(logged_in.role, Role::Student);
    }

    #[test]
    fn test_register_rejections() {
        let mut fx = Fixture::new();
        fx.user("alice", Role::Student);

        let cases = [
            ("alice||pw", StatusCode::BadRequest, "REGISTER_INVALID_FORMAT"),
            ("||pw||student", StatusCode::BadRequest, "REGISTER_INVALID_FORMAT"),
            ("a:b||pw||student", StatusCode::BadRequest, "REGISTER_INVALID_FORMAT"),
            ("a&b||pw||student", StatusCode::BadRequest, "REGISTER_INVALID_FORMAT"),
            ("a|b||pw||student", StatusCode::BadRequest, "REGISTER_INVALID_FORMAT"),
            ("carol||p&w||student", StatusCode::BadRequest, "REGISTER_INVALID_FORMAT"),
            ("carol||pw||admin", StatusCode::BadRequest, "REGISTER_INVALID_ROLE"),
            ("alice||pw||student", StatusCode::UsernameExists, "REGISTER_USERNAME_EXISTS"),
        ];
        for (data, status, payload) in cases {
            let res = fx.send("REGISTER", "", data);
            assert_eq!((res.status, res.payload.as_str()), (status, payload), "{data}");
        }
    }

    #[test]
    fn test_registered_account_can_log_in() {
        let mut fx = Fixture::new();
        let res = fx.send("REGISTER", "", "dana||p|w:1||teacher");
        assert_eq!(res.status, StatusCode::Ok);

        let res = fx.send("LOGIN", "", "dana&p|w:1");
        assert_eq!(res.status, StatusCode::Ok);
        assert_eq!(res.fields()[0], "LOGIN_SUCCESS");
    }

    #[test]
    fn test_login_rejections() {
        let mut fx = Fixture::new();
        fx.user("alice", Role::Student);

        let res = fx.send("LOGIN", "", "alice&wrongpass");
        assert_eq!(res.status, StatusCode::WrongPassword);
        assert_eq!(res.payload, "LOGIN_WRONG_PASSWORD");

        let res = fx.send("LOGIN", "", "nobody&secret");
        assert_eq!(res.status, StatusCode::NotFound);
        assert_eq!(res.payload, "LOGIN_USER_NOT_FOUND");

        let res = fx.send("LOGIN", "", "alice");
        assert_eq!(res.payload, "LOGIN_INVALID_FORMAT");
    }

    #[test]
    fn test_logout() {
        let mut fx = Fixture::new();
        let (_, token) = fx.user("alice", Role::Student);

        assert_eq!(fx.send("LOGOUT", &token, "").payload, "LOGOUT_SUCCESS");
        // stateless: the token is still usable afterwards
        assert_eq!(fx.send("LOGOUT", &token, "").payload, "LOGOUT_SUCCESS");

        let res = fx.send("LOGOUT", "", "");
        assert_eq!(res.status, StatusCode::Forbidden);
        assert_eq!(res.payload, "LOGOUT_NOT_LOGGED_IN");
    }
}
