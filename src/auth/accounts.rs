//! Account lifecycle: registration, login and logout.

use chrono::{TimeDelta, Utc};
use rocket::FromForm;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use validator::Validate;

use crate::db::{
    authenticate_user, create_user, create_user_session, find_user_by_email,
    find_user_by_username, invalidate_session,
};
use crate::error::AppError;
use crate::validation::{USERNAME_PATTERN, ValidateExt};

use super::{User, UserSession};

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Clone, FromForm, Validate)]
pub struct RegisterForm {
    #[validate(
        length(min = 1, max = 80, message = "Username must be between 1 and 80 characters"),
        regex(
            path = *USERNAME_PATTERN,
            message = "Username may only contain letters, digits, '_', '.' and '-'"
        )
    )]
    pub username: String,
    #[validate(
        email(message = "Please enter a valid email address"),
        length(max = 120, message = "Email must be at most 120 characters")
    )]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub is_teacher: bool,
}

#[derive(Debug, Clone, FromForm)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Creates a new account and returns its id.
#[instrument(skip_all, fields(username = %form.username, is_teacher = form.is_teacher))]
pub async fn register(pool: &Pool<Sqlite>, form: RegisterForm) -> Result<i64, AppError> {
    let form = form.validated()?;

    if find_user_by_username(pool, &form.username).await?.is_some() {
        return Err(AppError::Validation("Username already exists".to_string()));
    }

    if find_user_by_email(pool, &form.email).await?.is_some() {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    match create_user(
        pool,
        &form.username,
        &form.email,
        &form.password,
        form.is_teacher,
    )
    .await
    {
        Ok(id) => {
            info!(user_id = id, "Registered new user");
            Ok(id)
        }
        // Lost a race with a concurrent registration for the same name or email.
        Err(err) if err.is_unique_violation() => Err(AppError::Validation(
            "Username or email already registered".to_string(),
        )),
        Err(err) => Err(err),
    }
}

/// Verifies credentials and opens a new session. Unknown users and wrong
/// passwords fail with the same message.
#[instrument(skip_all, fields(username = %username))]
pub async fn login(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    session_ttl_hours: i64,
) -> Result<(User, UserSession), AppError> {
    let Some(user) = authenticate_user(pool, username, password).await? else {
        return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
    };

    let now = Utc::now().naive_utc();
    let expires_at = TimeDelta::try_hours(session_ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            AppError::Internal(format!(
                "Session lifetime of {} hours is out of range",
                session_ttl_hours
            ))
        })?;
    let token = UserSession::generate_token();

    let id = create_user_session(pool, user.id, &token, expires_at).await?;

    info!(user_id = user.id, "Login successful");

    let session = UserSession {
        id,
        user_id: user.id,
        token,
        created_at: now,
        expires_at,
    };

    Ok((user, session))
}

#[instrument(skip_all)]
pub async fn logout(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    invalidate_session(pool, token).await
}
