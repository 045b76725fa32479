use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub instructor_id: i64,
    pub instructor_name: String, // Denormalized for convenience
    pub category: Option<String>,
    pub level: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCourse {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub instructor_id: Option<i64>,
    pub instructor_name: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
}

impl From<DbCourse> for Course {
    fn from(course: DbCourse) -> Self {
        Self {
            id: course.id.unwrap_or_default(),
            title: course.title.unwrap_or_default(),
            description: course.description.unwrap_or_default(),
            created_at: to_utc(course.created_at),
            instructor_id: course.instructor_id.unwrap_or_default(),
            instructor_name: course.instructor_name.unwrap_or_default(),
            category: course.category,
            level: course.level,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub course_id: i64,
    pub created_at: DateTime<Utc>,
    pub order: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbLesson {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub course_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub sort_order: Option<i64>,
}

impl From<DbLesson> for Lesson {
    fn from(lesson: DbLesson) -> Self {
        Self {
            id: lesson.id.unwrap_or_default(),
            title: lesson.title.unwrap_or_default(),
            content: lesson.content.unwrap_or_default(),
            course_id: lesson.course_id.unwrap_or_default(),
            created_at: to_utc(lesson.created_at),
            order: lesson.sort_order.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub course_title: String, // Denormalized for convenience
    pub enrolled_at: DateTime<Utc>,
    pub progress: i64,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbEnrollment {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub course_id: Option<i64>,
    pub course_title: Option<String>,
    pub enrolled_at: Option<NaiveDateTime>,
    pub progress: Option<i64>,
}

impl From<DbEnrollment> for Enrollment {
    fn from(db: DbEnrollment) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            course_id: db.course_id.unwrap_or_default(),
            course_title: db.course_title.unwrap_or_default(),
            enrolled_at: to_utc(db.enrolled_at),
            progress: db.progress.unwrap_or_default(),
        }
    }
}

/// A stored upload attached to a course or to a lesson. `parent_id` is the
/// course id or the lesson id respectively.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Material {
    pub id: i64,
    pub parent_id: i64,
    pub title: String,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbMaterial {
    pub id: Option<i64>,
    pub parent_id: Option<i64>,
    pub title: Option<String>,
    pub file_path: Option<String>,
    pub uploaded_at: Option<NaiveDateTime>,
}

impl From<DbMaterial> for Material {
    fn from(db: DbMaterial) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            parent_id: db.parent_id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            file_path: db.file_path.unwrap_or_default(),
            uploaded_at: to_utc(db.uploaded_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialOwner {
    Course,
    Lesson,
}

impl MaterialOwner {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            MaterialOwner::Course => "course_materials",
            MaterialOwner::Lesson => "lesson_materials",
        }
    }

    pub(crate) fn parent_column(&self) -> &'static str {
        match self {
            MaterialOwner::Course => "course_id",
            MaterialOwner::Lesson => "lesson_id",
        }
    }
}

/// Search constraints; an empty string places no constraint on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseFilter {
    pub query: String,
    pub category: String,
    pub level: String,
}
