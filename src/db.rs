use std::str::FromStr;

use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Pool, QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::models::{
    Course, CourseFilter, DbCourse, DbEnrollment, DbLesson, DbMaterial, Enrollment, Lesson,
    Material, MaterialOwner,
};

#[cfg(not(test))]
const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_HASH_COST: u32 = 4;

static DUMMY_PASSWORD_HASH: Lazy<String> = Lazy::new(|| {
    bcrypt::hash("not-a-real-password", PASSWORD_HASH_COST).unwrap_or_default()
});

const COURSE_SELECT: &str = "SELECT c.id, c.title, c.description, c.created_at, c.instructor_id,
        u.username AS instructor_name, c.category, c.level
     FROM courses c
     JOIN users u ON u.id = c.instructor_id";

#[instrument]
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    info!("Connecting to SQLite database");
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, is_teacher, bio, profile_picture FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by username");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, is_teacher, bio, profile_picture FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn find_user_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by email");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, is_teacher, bio, profile_picture FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip_all, fields(username = %username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let credentials =
        sqlx::query_as::<_, (i64, String)>("SELECT id, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    let Some((id, password_hash)) = credentials else {
        // Unknown users cost one bcrypt verify, same as a wrong password.
        let _ = bcrypt::verify(password, &DUMMY_PASSWORD_HASH);
        return Ok(None);
    };

    // A malformed stored hash counts as a failed match.
    if !bcrypt::verify(password, &password_hash).unwrap_or(false) {
        return Ok(None);
    }

    get_user(pool, id).await.map(Some)
}

#[instrument(skip_all, fields(username = %username, email = %email, is_teacher = is_teacher))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    email: &str,
    password: &str,
    is_teacher: bool,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let hashed_password = bcrypt::hash(password, PASSWORD_HASH_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, email, password, is_teacher) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(email)
    .bind(hashed_password)
    .bind(is_teacher)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument]
pub async fn create_course(
    pool: &Pool<Sqlite>,
    instructor_id: i64,
    title: &str,
    description: &str,
    category: Option<&str>,
    level: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating course");
    let res = sqlx::query(
        "INSERT INTO courses (title, description, instructor_id, category, level)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(title)
    .bind(description)
    .bind(instructor_id)
    .bind(category)
    .bind(level)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_course(pool: &Pool<Sqlite>, id: i64) -> Result<Course, AppError> {
    info!("Fetching course by ID");
    let sql = format!("{} WHERE c.id = ?", COURSE_SELECT);
    let row = sqlx::query_as::<_, DbCourse>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(course) => Ok(Course::from(course)),
        _ => Err(AppError::NotFound(format!("Course with id {} not found", id))),
    }
}

#[instrument]
pub async fn get_all_courses(pool: &Pool<Sqlite>) -> Result<Vec<Course>, AppError> {
    info!("Getting all courses");
    let sql = format!("{} ORDER BY c.id", COURSE_SELECT);
    let rows = sqlx::query_as::<_, DbCourse>(&sql).fetch_all(pool).await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

#[instrument]
pub async fn find_courses_by_instructor(
    pool: &Pool<Sqlite>,
    instructor_id: i64,
) -> Result<Vec<Course>, AppError> {
    info!("Getting courses by instructor");
    let sql = format!("{} WHERE c.instructor_id = ? ORDER BY c.id", COURSE_SELECT);
    let rows = sqlx::query_as::<_, DbCourse>(&sql)
        .bind(instructor_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

/// Escapes `LIKE` wildcards so the query text is matched literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[instrument]
pub async fn search_courses(
    pool: &Pool<Sqlite>,
    filter: &CourseFilter,
) -> Result<Vec<Course>, AppError> {
    info!("Searching courses");
    let mut builder = QueryBuilder::<Sqlite>::new(COURSE_SELECT);
    builder.push(" WHERE 1 = 1");

    if !filter.query.is_empty() {
        let pattern = format!("%{}%", escape_like(&filter.query));
        builder
            .push(" AND (c.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR c.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }

    if !filter.category.is_empty() {
        builder
            .push(" AND c.category = ")
            .push_bind(filter.category.clone());
    }

    if !filter.level.is_empty() {
        builder.push(" AND c.level = ").push_bind(filter.level.clone());
    }

    builder.push(" ORDER BY c.id");

    let rows = builder
        .build_query_as::<DbCourse>()
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

#[instrument]
pub async fn get_distinct_categories(pool: &Pool<Sqlite>) -> Result<Vec<String>, AppError> {
    info!("Getting distinct course categories");
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT DISTINCT category FROM courses
         WHERE category IS NOT NULL AND category <> ''
         ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(category,)| category).collect())
}

#[instrument]
pub async fn create_lesson(
    pool: &Pool<Sqlite>,
    course_id: i64,
    title: &str,
    content: &str,
    order: i64,
) -> Result<i64, AppError> {
    info!("Creating lesson");
    let res = sqlx::query(
        "INSERT INTO lessons (title, content, course_id, sort_order) VALUES (?, ?, ?, ?)",
    )
    .bind(title)
    .bind(content)
    .bind(course_id)
    .bind(order)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_lesson(pool: &Pool<Sqlite>, id: i64) -> Result<Lesson, AppError> {
    info!("Fetching lesson by ID");
    let row = sqlx::query_as::<_, DbLesson>(
        "SELECT id, title, content, course_id, created_at, sort_order FROM lessons WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(lesson) => Ok(Lesson::from(lesson)),
        _ => Err(AppError::NotFound(format!("Lesson with id {} not found", id))),
    }
}

#[instrument]
pub async fn get_lessons_for_course(
    pool: &Pool<Sqlite>,
    course_id: i64,
) -> Result<Vec<Lesson>, AppError> {
    info!("Getting lessons for course");
    let rows = sqlx::query_as::<_, DbLesson>(
        "SELECT id, title, content, course_id, created_at, sort_order FROM lessons
         WHERE course_id = ?
         ORDER BY sort_order, id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Lesson::from).collect())
}

#[instrument(skip(executor))]
pub async fn find_enrollment<'e, E>(
    executor: E,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Finding enrollment");
    let row = sqlx::query_as::<_, DbEnrollment>(
        "SELECT e.id, e.user_id, e.course_id, c.title AS course_title, e.enrolled_at, e.progress
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         WHERE e.user_id = ? AND e.course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Enrollment::from))
}

#[instrument(skip(executor))]
pub async fn insert_enrollment<'e, E>(
    executor: E,
    user_id: i64,
    course_id: i64,
) -> Result<i64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Inserting enrollment");
    let res = sqlx::query("INSERT INTO enrollments (user_id, course_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(course_id)
        .execute(executor)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn find_enrollments_by_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Enrollment>, AppError> {
    info!("Getting enrollments for user");
    let rows = sqlx::query_as::<_, DbEnrollment>(
        "SELECT e.id, e.user_id, e.course_id, c.title AS course_title, e.enrolled_at, e.progress
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         WHERE e.user_id = ?
         ORDER BY e.id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Enrollment::from).collect())
}

#[instrument]
pub async fn create_material(
    pool: &Pool<Sqlite>,
    owner: MaterialOwner,
    parent_id: i64,
    title: &str,
    file_path: &str,
) -> Result<Material, AppError> {
    info!("Recording uploaded material");
    let sql = format!(
        "INSERT INTO {} ({}, title, file_path) VALUES (?, ?, ?)",
        owner.table(),
        owner.parent_column()
    );
    let res = sqlx::query(&sql)
        .bind(parent_id)
        .bind(title)
        .bind(file_path)
        .execute(pool)
        .await?;

    let id = res.last_insert_rowid();
    let sql = format!(
        "SELECT id, {} AS parent_id, title, file_path, uploaded_at FROM {} WHERE id = ?",
        owner.parent_column(),
        owner.table()
    );
    let row = sqlx::query_as::<_, DbMaterial>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?;

    Ok(Material::from(row))
}

#[instrument]
pub async fn get_materials(
    pool: &Pool<Sqlite>,
    owner: MaterialOwner,
    parent_id: i64,
) -> Result<Vec<Material>, AppError> {
    info!("Getting materials");
    let sql = format!(
        "SELECT id, {col} AS parent_id, title, file_path, uploaded_at FROM {table}
         WHERE {col} = ?
         ORDER BY id",
        col = owner.parent_column(),
        table = owner.table()
    );
    let rows = sqlx::query_as::<_, DbMaterial>(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Material::from).collect())
}
