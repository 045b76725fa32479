#[cfg(test)]
pub mod test_utils {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Once;

    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use uuid::Uuid;

    use crate::config::AppConfig;
    use crate::db::{create_course, create_lesson, create_user, insert_enrollment, run_migrations};
    use crate::error::AppError;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        courses: Vec<TestCourse>,
        lessons: Vec<TestLesson>,
        enrollments: Vec<(String, String)>,
    }

    pub struct TestUser {
        pub username: String,
        pub email: String,
        pub password: String,
        pub is_teacher: bool,
    }

    pub struct TestCourse {
        pub title: String,
        pub description: String,
        pub category: Option<String>,
        pub level: Option<String>,
        pub instructor: String,
    }

    pub struct TestLesson {
        pub course_title: String,
        pub title: String,
        pub order: i64,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn student(self, username: &str) -> Self {
            self.user_with_password(username, STANDARD_PASSWORD, false)
        }

        pub fn teacher(self, username: &str) -> Self {
            self.user_with_password(username, STANDARD_PASSWORD, true)
        }

        pub fn user_with_password(mut self, username: &str, password: &str, is_teacher: bool) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password: password.to_string(),
                is_teacher,
            });
            self
        }

        pub fn course(
            mut self,
            title: &str,
            description: &str,
            category: Option<&str>,
            level: Option<&str>,
            instructor: &str,
        ) -> Self {
            self.courses.push(TestCourse {
                title: title.to_string(),
                description: description.to_string(),
                category: category.map(String::from),
                level: level.map(String::from),
                instructor: instructor.to_string(),
            });
            self
        }

        pub fn lesson(mut self, course_title: &str, title: &str, order: i64) -> Self {
            self.lessons.push(TestLesson {
                course_title: course_title.to_string(),
                title: title.to_string(),
                order,
            });
            self
        }

        pub fn enrollment(mut self, username: &str, course_title: &str) -> Self {
            self.enrollments
                .push((username.to_string(), course_title.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::Builder::from_env(
                    env_logger::Env::default().default_filter_or("debug"),
                )
                .is_test(true)
                .try_init();
            });

            // One connection keeps the shared in-memory database alive and
            // avoids shared-cache table locks between connections.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            run_migrations(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut course_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(
                    &pool,
                    &user.username,
                    &user.email,
                    &user.password,
                    user.is_teacher,
                )
                .await?;

                user_id_map.insert(user.username.clone(), user_id);
            }

            for course in &self.courses {
                let instructor_id = user_id_map.get(&course.instructor).copied().ok_or_else(|| {
                    AppError::NotFound(format!("Test instructor {} not seeded", course.instructor))
                })?;

                let course_id = create_course(
                    &pool,
                    instructor_id,
                    &course.title,
                    &course.description,
                    course.category.as_deref(),
                    course.level.as_deref(),
                )
                .await?;

                course_id_map.insert(course.title.clone(), course_id);
            }

            for lesson in &self.lessons {
                if let Some(course_id) = course_id_map.get(&lesson.course_title).copied() {
                    create_lesson(
                        &pool,
                        course_id,
                        &lesson.title,
                        &format!("Content of {}", lesson.title),
                        lesson.order,
                    )
                    .await?;
                }
            }

            for (username, course_title) in &self.enrollments {
                if let (Some(user_id), Some(course_id)) = (
                    user_id_map.get(username).copied(),
                    course_id_map.get(course_title).copied(),
                ) {
                    insert_enrollment(&pool, user_id, course_id).await?;
                }
            }

            Ok(TestDb {
                pool,
                user_id_map,
                course_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub course_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn course_id(&self, title: &str) -> Option<i64> {
            self.course_id_map.get(title).copied()
        }

        pub async fn user(&self, username: &str) -> crate::auth::User {
            let id = self.user_id(username).expect("User not seeded");
            crate::db::get_user(&self.pool, id)
                .await
                .expect("Failed to load seeded user")
        }
    }

    /// A teacher with one course, plus a student; the common fixture for
    /// route tests.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .teacher("teacher_user")
            .student("student_user")
            .course(
                "Intro to Python",
                "Learn the basics of Python programming",
                Some("programming"),
                Some("beginner"),
                "teacher_user",
            )
            .course(
                "Advanced Databases",
                "Indexes, transactions and query planning",
                Some("databases"),
                Some("advanced"),
                "teacher_user",
            )
            .lesson("Intro to Python", "Variables", 1)
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("course-enrollment-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("Failed to create scratch directory");
        dir
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            upload_dir: scratch_dir(),
            ..AppConfig::default()
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with_config(test_db, test_config()).await
    }

    pub async fn setup_test_client_with_config(
        test_db: TestDb,
        config: AppConfig,
    ) -> (Client, TestDb) {
        let rocket = crate::init_rocket(test_db.pool.clone(), config);
        let client = Client::untracked(rocket)
            .await
            .expect("Failed to build Rocket client");

        (client, test_db)
    }

    pub async fn login_test_user(
        client: &Client,
        username: &str,
        password: &str,
    ) -> Vec<Cookie<'static>> {
        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body(format!("username={}&password={}", username, password))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/"));

        response
            .cookies()
            .iter()
            .map(|cookie| cookie.clone().into_owned())
            .collect()
    }
}
