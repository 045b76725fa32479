use rocket::State;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::request::FlashMessage;
use rocket::response::{self, Flash, Redirect, Responder};
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::auth::accounts::{self, LoginForm, RegisterForm};
use crate::auth::{FlashView, Permission, SESSION_COOKIE, User};
use crate::catalog::{
    self, CourseDetail, CourseForm, LessonForm, MaterialForm, ONLY_INSTRUCTOR, ONLY_TEACHERS,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{Course, CourseFilter, Enrollment};

/// Failure outcome of a page route: either a flash message with a redirect,
/// or an error rendered as its status code (used for 404s).
pub enum Rejection {
    Redirect(Flash<Redirect>),
    Error(AppError),
}

impl Rejection {
    fn flash(err: AppError, to: Redirect, context: &str) -> Self {
        match err {
            AppError::NotFound(_) => Rejection::Error(err),
            _ => {
                err.log_and_record(context);
                Rejection::Redirect(Flash::error(to, err.user_message()))
            }
        }
    }
}

impl From<AppError> for Rejection {
    fn from(err: AppError) -> Self {
        Rejection::Error(err)
    }
}

impl<'r> Responder<'r, 'static> for Rejection {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> response::Result<'static> {
        match self {
            Rejection::Redirect(flash) => flash.respond_to(req),
            Rejection::Error(err) => err.respond_to(req),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct IndexPage {
    pub courses: Vec<Course>,
    pub categories: Vec<String>,
    pub flash: Option<FlashView>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FormPage {
    pub flash: Option<FlashView>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProfilePage {
    pub user: User,
    pub enrollments: Vec<Enrollment>,
    pub created_courses: Vec<Course>,
    pub flash: Option<FlashView>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CourseDetailPage {
    #[serde(flatten)]
    pub detail: CourseDetail,
    pub flash: Option<FlashView>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateLessonPage {
    pub course: Course,
    pub flash: Option<FlashView>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SearchPage {
    pub courses: Vec<Course>,
    pub categories: Vec<String>,
    pub query: String,
    pub selected_category: String,
    pub selected_level: String,
}

#[get("/")]
pub async fn index(
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Json<IndexPage>, Rejection> {
    let courses = catalog::list_courses(db).await?;
    let categories = catalog::list_categories(db).await?;

    Ok(Json(IndexPage {
        courses,
        categories,
        flash: flash.map(FlashView::from),
    }))
}

#[get("/login")]
pub fn login_page(flash: Option<FlashMessage<'_>>) -> Json<FormPage> {
    Json(FormPage {
        flash: flash.map(FlashView::from),
    })
}

#[post("/login", data = "<form>")]
pub async fn process_login(
    form: Form<LoginForm>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Redirect, Flash<Redirect>> {
    info!("Login attempt: {}", &form.username);

    match accounts::login(db, &form.username, &form.password, config.session_ttl_hours).await {
        Ok((_user, session)) => {
            cookies.add_private(
                Cookie::build((SESSION_COOKIE, session.token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(config.session_ttl_hours)),
            );
            Ok(Redirect::to(uri!(index)))
        }
        Err(err) => {
            err.log_and_record("Login");
            Err(Flash::error(
                Redirect::to(uri!(login_page)),
                err.user_message(),
            ))
        }
    }
}

#[get("/register")]
pub fn register_page(flash: Option<FlashMessage<'_>>) -> Json<FormPage> {
    Json(FormPage {
        flash: flash.map(FlashView::from),
    })
}

#[post("/register", data = "<form>")]
pub async fn process_register(
    form: Form<RegisterForm>,
    db: &State<Pool<Sqlite>>,
) -> Flash<Redirect> {
    match accounts::register(db, form.into_inner()).await {
        Ok(_) => Flash::success(
            Redirect::to(uri!(login_page)),
            "Registration successful. Please log in.",
        ),
        Err(err) => {
            err.log_and_record("Registration");
            Flash::error(Redirect::to(uri!(register_page)), err.user_message())
        }
    }
}

#[get("/logout")]
pub async fn logout(_user: User, cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Redirect {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(err) = accounts::logout(db, &token).await {
            err.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Redirect::to(uri!(index))
}

#[get("/profile")]
pub async fn profile(
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Json<ProfilePage>, Rejection> {
    let profile = catalog::profile(db, &user).await?;

    Ok(Json(ProfilePage {
        user: profile.user,
        enrollments: profile.enrollments,
        created_courses: profile.created_courses,
        flash: flash.map(FlashView::from),
    }))
}

#[get("/course/create")]
pub fn create_course_page(
    user: User,
    flash: Option<FlashMessage<'_>>,
) -> Result<Json<FormPage>, Flash<Redirect>> {
    if !user.has_permission(Permission::CreateCourses) {
        return Err(Flash::error(Redirect::to(uri!(index)), ONLY_TEACHERS));
    }

    Ok(Json(FormPage {
        flash: flash.map(FlashView::from),
    }))
}

#[post("/course/create", data = "<form>")]
pub async fn process_create_course(
    user: User,
    form: Form<CourseForm>,
    db: &State<Pool<Sqlite>>,
) -> Flash<Redirect> {
    match catalog::create_course(db, &user, form.into_inner()).await {
        Ok(course) => Flash::success(
            Redirect::to(uri!(course_detail(course.id))),
            "Course created successfully!",
        ),
        Err(err) => {
            err.log_and_record("Create course");
            let target = match err {
                AppError::Authorization(_) => uri!(index),
                _ => uri!(create_course_page),
            };
            Flash::error(Redirect::to(target), err.user_message())
        }
    }
}

#[get("/course/<id>")]
pub async fn course_detail(
    id: i64,
    user: Option<User>,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Json<CourseDetailPage>, Rejection> {
    let detail = catalog::course_detail(db, user.as_ref(), id).await?;

    Ok(Json(CourseDetailPage {
        detail,
        flash: flash.map(FlashView::from),
    }))
}

#[get("/course/<id>/enroll")]
pub async fn enroll(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Flash<Redirect>, Rejection> {
    match catalog::enroll(db, &user, id).await {
        Ok(_) => Ok(Flash::success(
            Redirect::to(uri!(course_detail(id))),
            "Successfully enrolled in the course!",
        )),
        Err(err) => Err(Rejection::flash(
            err,
            Redirect::to(uri!(course_detail(id))),
            "Enroll",
        )),
    }
}

#[get("/course/<id>/lesson/create")]
pub async fn create_lesson_page(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Json<CreateLessonPage>, Rejection> {
    let course = crate::db::get_course(db, id).await?;

    if course.instructor_id != user.id {
        return Err(Rejection::Redirect(Flash::error(
            Redirect::to(uri!(course_detail(id))),
            ONLY_INSTRUCTOR,
        )));
    }

    Ok(Json(CreateLessonPage {
        course,
        flash: flash.map(FlashView::from),
    }))
}

#[post("/course/<id>/lesson/create", data = "<form>")]
pub async fn process_create_lesson(
    id: i64,
    user: User,
    form: Form<LessonForm>,
    db: &State<Pool<Sqlite>>,
) -> Result<Flash<Redirect>, Rejection> {
    match catalog::create_lesson(db, &user, id, form.into_inner()).await {
        Ok(_) => Ok(Flash::success(
            Redirect::to(uri!(course_detail(id))),
            "Lesson added successfully!",
        )),
        Err(AppError::Validation(msg)) => Err(Rejection::flash(
            AppError::Validation(msg),
            Redirect::to(uri!(create_lesson_page(id))),
            "Create lesson",
        )),
        Err(err) => Err(Rejection::flash(
            err,
            Redirect::to(uri!(course_detail(id))),
            "Create lesson",
        )),
    }
}

#[post("/course/<id>/material", data = "<form>")]
pub async fn add_course_material(
    id: i64,
    user: User,
    form: Form<MaterialForm>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Flash<Redirect>, Rejection> {
    match catalog::attach_course_material(db, &config.upload_dir, &user, id, form.into_inner())
        .await
    {
        Ok(_) => Ok(Flash::success(
            Redirect::to(uri!(course_detail(id))),
            "Material added successfully!",
        )),
        Err(err) => Err(Rejection::flash(
            err,
            Redirect::to(uri!(course_detail(id))),
            "Add course material",
        )),
    }
}

#[post("/lesson/<id>/material", data = "<form>")]
pub async fn add_lesson_material(
    id: i64,
    user: User,
    form: Form<MaterialForm>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Flash<Redirect>, Rejection> {
    let course_id = crate::db::get_lesson(db, id).await?.course_id;

    match catalog::attach_lesson_material(db, &config.upload_dir, &user, id, form.into_inner())
        .await
    {
        Ok(_) => Ok(Flash::success(
            Redirect::to(uri!(course_detail(course_id))),
            "Material added successfully!",
        )),
        Err(err) => Err(Rejection::flash(
            err,
            Redirect::to(uri!(course_detail(course_id))),
            "Add lesson material",
        )),
    }
}

#[get("/search?<q>&<category>&<level>")]
pub async fn search(
    q: Option<String>,
    category: Option<String>,
    level: Option<String>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SearchPage>, Rejection> {
    let filter = CourseFilter {
        query: q.unwrap_or_default(),
        category: category.unwrap_or_default(),
        level: level.unwrap_or_default(),
    };

    let courses = catalog::search(db, &filter).await?;
    let categories = catalog::list_categories(db).await?;

    Ok(Json(SearchPage {
        courses,
        categories,
        query: filter.query,
        selected_category: filter.category,
        selected_level: filter.level,
    }))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
