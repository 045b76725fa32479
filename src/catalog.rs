//! Course, lesson and enrollment operations.
//!
//! Every operation takes the acting user explicitly; nothing here reads the
//! request or session.

use std::path::{Component, Path};

use rocket::FromForm;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{error, info, instrument};
use validator::Validate;

use crate::auth::{Permission, User};
use crate::db;
use crate::error::AppError;
use crate::models::{Course, CourseFilter, Enrollment, Lesson, Material, MaterialOwner};
use crate::validation::ValidateExt;

pub const ONLY_TEACHERS: &str = "Only teachers can create courses";
pub const ONLY_INSTRUCTOR: &str = "Only the course instructor can add lessons";
pub const ONLY_INSTRUCTOR_MATERIALS: &str = "Only the course instructor can add materials";
pub const CANNOT_ENROLL: &str = "Your account cannot enroll in courses";
pub const CANNOT_VIEW_PROFILE: &str = "Your account cannot view its profile";
pub const ALREADY_ENROLLED: &str = "You are already enrolled in this course!";
pub const OWN_COURSE: &str = "You cannot enroll in your own course!";
pub const ENROLLMENT_FAILED: &str =
    "An error occurred while enrolling in the course. Please try again.";

#[derive(Debug, Clone, FromForm, Validate)]
pub struct CourseForm {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(length(max = 50, message = "Category must be at most 50 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 20, message = "Level must be at most 20 characters"))]
    pub level: Option<String>,
}

#[derive(Debug, Clone, FromForm, Validate)]
pub struct LessonForm {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    pub order: Option<i64>,
}

/// Names a file that is already stored under the upload directory.
#[derive(Debug, Clone, FromForm, Validate)]
pub struct MaterialForm {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 200, message = "File path must be between 1 and 200 characters"))]
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonDetail {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseDetail {
    pub course: Course,
    pub lessons: Vec<LessonDetail>,
    pub materials: Vec<Material>,
    pub is_enrolled: bool,
    pub is_instructor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub user: User,
    pub enrollments: Vec<Enrollment>,
    pub created_courses: Vec<Course>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn require_instructor(user: &User, course: &Course, message: &str) -> Result<(), AppError> {
    if user.id == course.instructor_id {
        Ok(())
    } else {
        tracing::warn!(
            user_id = user.id,
            course_id = course.id,
            instructor_id = course.instructor_id,
            "Caller is not the course instructor"
        );
        Err(AppError::Authorization(message.to_string()))
    }
}

#[instrument(skip(pool, form), fields(instructor_id = instructor.id))]
pub async fn create_course(
    pool: &Pool<Sqlite>,
    instructor: &User,
    form: CourseForm,
) -> Result<Course, AppError> {
    instructor.require_permission(Permission::CreateCourses, ONLY_TEACHERS)?;
    let form = form.validated()?;

    let category = non_empty(form.category);
    let level = non_empty(form.level);

    let id = db::create_course(
        pool,
        instructor.id,
        &form.title,
        &form.description,
        category.as_deref(),
        level.as_deref(),
    )
    .await?;

    info!(course_id = id, "Course created");
    db::get_course(pool, id).await
}

#[instrument(skip(pool, form), fields(instructor_id = instructor.id))]
pub async fn create_lesson(
    pool: &Pool<Sqlite>,
    instructor: &User,
    course_id: i64,
    form: LessonForm,
) -> Result<Lesson, AppError> {
    let course = db::get_course(pool, course_id).await?;
    require_instructor(instructor, &course, ONLY_INSTRUCTOR)?;
    let form = form.validated()?;

    let id = db::create_lesson(
        pool,
        course.id,
        &form.title,
        &form.content,
        form.order.unwrap_or(0),
    )
    .await?;

    info!(lesson_id = id, "Lesson created");
    db::get_lesson(pool, id).await
}

/// Enrolls `user` in the course. The existence check and the insert share
/// one transaction; the unique index on (user_id, course_id) settles races.
#[instrument(skip(pool), fields(user_id = user.id))]
pub async fn enroll(pool: &Pool<Sqlite>, user: &User, course_id: i64) -> Result<Enrollment, AppError> {
    user.require_permission(Permission::EnrollInCourses, CANNOT_ENROLL)?;
    let course = db::get_course(pool, course_id).await?;

    let mut tx = pool.begin().await?;

    if db::find_enrollment(&mut *tx, user.id, course.id).await?.is_some() {
        return Err(AppError::Conflict(ALREADY_ENROLLED.to_string()));
    }

    if user.id == course.instructor_id {
        return Err(AppError::Authorization(OWN_COURSE.to_string()));
    }

    let inserted = match db::insert_enrollment(&mut *tx, user.id, course.id).await {
        Ok(id) => tx.commit().await.map(|_| id).map_err(AppError::from),
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Failed to roll back enrollment");
            }
            Err(err)
        }
    };

    match inserted {
        Ok(id) => {
            info!(enrollment_id = id, "User enrolled");
        }
        Err(err) if err.is_unique_violation() => {
            return Err(AppError::Conflict(ALREADY_ENROLLED.to_string()));
        }
        Err(err) => {
            err.log_and_record("Enrollment insert");
            return Err(AppError::Unavailable(ENROLLMENT_FAILED.to_string()));
        }
    }

    db::find_enrollment(pool, user.id, course.id)
        .await?
        .ok_or_else(|| AppError::Internal("Enrollment vanished after commit".to_string()))
}

#[instrument(skip(pool))]
pub async fn search(pool: &Pool<Sqlite>, filter: &CourseFilter) -> Result<Vec<Course>, AppError> {
    db::search_courses(pool, filter).await
}

#[instrument(skip(pool))]
pub async fn list_categories(pool: &Pool<Sqlite>) -> Result<Vec<String>, AppError> {
    db::get_distinct_categories(pool).await
}

#[instrument(skip(pool))]
pub async fn list_courses(pool: &Pool<Sqlite>) -> Result<Vec<Course>, AppError> {
    db::get_all_courses(pool).await
}

#[instrument(skip(pool, viewer))]
pub async fn course_detail(
    pool: &Pool<Sqlite>,
    viewer: Option<&User>,
    course_id: i64,
) -> Result<CourseDetail, AppError> {
    let course = db::get_course(pool, course_id).await?;

    let mut lessons = Vec::new();
    for lesson in db::get_lessons_for_course(pool, course.id).await? {
        let materials = db::get_materials(pool, MaterialOwner::Lesson, lesson.id).await?;
        lessons.push(LessonDetail { lesson, materials });
    }

    let materials = db::get_materials(pool, MaterialOwner::Course, course.id).await?;

    let is_enrolled = match viewer {
        Some(user) => db::find_enrollment(pool, user.id, course.id)
            .await?
            .is_some(),
        None => false,
    };
    let is_instructor = viewer.is_some_and(|user| user.id == course.instructor_id);

    Ok(CourseDetail {
        course,
        lessons,
        materials,
        is_enrolled,
        is_instructor,
    })
}

#[instrument(skip(pool, user), fields(user_id = user.id))]
pub async fn profile(pool: &Pool<Sqlite>, user: &User) -> Result<Profile, AppError> {
    user.require_permission(Permission::ViewOwnProfile, CANNOT_VIEW_PROFILE)?;

    let enrollments = db::find_enrollments_by_user(pool, user.id).await?;

    let created_courses = if user.is_teacher() {
        db::find_courses_by_instructor(pool, user.id).await?
    } else {
        Vec::new()
    };

    Ok(Profile {
        user: user.clone(),
        enrollments,
        created_courses,
    })
}

/// Checks that `file_path` names an existing file inside `upload_dir` and
/// returns it in normalized form.
fn stored_upload_path(upload_dir: &Path, file_path: &str) -> Result<String, AppError> {
    let relative = Path::new(file_path);
    let inside_upload_dir = !relative.is_absolute()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

    if !inside_upload_dir {
        return Err(AppError::Validation(
            "Material path must be relative to the upload directory".to_string(),
        ));
    }

    if !upload_dir.join(relative).is_file() {
        return Err(AppError::Validation(format!(
            "No uploaded file found at {}",
            file_path
        )));
    }

    let normalized: Vec<_> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    Ok(normalized.join("/"))
}

#[instrument(skip(pool, upload_dir, form), fields(instructor_id = instructor.id))]
pub async fn attach_course_material(
    pool: &Pool<Sqlite>,
    upload_dir: &Path,
    instructor: &User,
    course_id: i64,
    form: MaterialForm,
) -> Result<Material, AppError> {
    let course = db::get_course(pool, course_id).await?;
    require_instructor(instructor, &course, ONLY_INSTRUCTOR_MATERIALS)?;
    let form = form.validated()?;

    let file_path = stored_upload_path(upload_dir, &form.file_path)?;
    db::create_material(pool, MaterialOwner::Course, course.id, &form.title, &file_path).await
}

#[instrument(skip(pool, upload_dir, form), fields(instructor_id = instructor.id))]
pub async fn attach_lesson_material(
    pool: &Pool<Sqlite>,
    upload_dir: &Path,
    instructor: &User,
    lesson_id: i64,
    form: MaterialForm,
) -> Result<Material, AppError> {
    let lesson = db::get_lesson(pool, lesson_id).await?;
    let course = db::get_course(pool, lesson.course_id).await?;
    require_instructor(instructor, &course, ONLY_INSTRUCTOR_MATERIALS)?;
    let form = form.validated()?;

    let file_path = stored_upload_path(upload_dir, &form.file_path)?;
    db::create_material(pool, MaterialOwner::Lesson, lesson.id, &form.title, &file_path).await
}
