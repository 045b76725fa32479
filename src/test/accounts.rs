#[cfg(test)]
mod tests {
    use rocket::tokio;

    use crate::auth::accounts::{INVALID_CREDENTIALS, RegisterForm, login, logout, register};
    use crate::auth::Role;
    use crate::db::{get_session_by_token, get_user};
    use crate::error::AppError;
    use crate::test::test_utils::{STANDARD_PASSWORD, TestDbBuilder};

    fn register_form(username: &str, email: &str, is_teacher: bool) -> RegisterForm {
        RegisterForm {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret".to_string(),
            is_teacher,
        }
    }

    #[tokio::test]
    async fn test_register_creates_user_with_role() {
        let test_db = TestDbBuilder::new().build().await.expect("Failed to build test database");

        let id = register(&test_db.pool, register_form("alice", "a@x.io", false))
            .await
            .expect("Registration should succeed");

        let user = get_user(&test_db.pool, id).await.expect("User should exist");
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "a@x.io");
        assert_eq!(user.role, Role::Student);

        let teacher_id = register(&test_db.pool, register_form("bob", "b@x.io", true))
            .await
            .expect("Registration should succeed");

        let teacher = get_user(&test_db.pool, teacher_id).await.expect("User should exist");
        assert_eq!(teacher.role, Role::Teacher);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_username() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let result = register(&test_db.pool, register_form("alice", "other@x.io", false)).await;

        match result {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Username already exists"),
            other => panic!("Expected duplicate username error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let result = register(
            &test_db.pool,
            register_form("alice2", "alice@example.com", false),
        )
        .await;

        match result {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Email already registered"),
            other => panic!("Expected duplicate email error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_validates_fields() {
        let test_db = TestDbBuilder::new().build().await.expect("Failed to build test database");

        let result = register(&test_db.pool, register_form("alice", "not-an-email", false)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = register(&test_db.pool, register_form("", "a@x.io", false)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let mut form = register_form("alice", "a@x.io", false);
        form.password = String::new();
        let result = register(&test_db.pool, form).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_success_opens_session() {
        let test_db = TestDbBuilder::new()
            .teacher("bob")
            .build()
            .await
            .expect("Failed to build test database");

        let (user, session) = login(&test_db.pool, "bob", STANDARD_PASSWORD, 12)
            .await
            .expect("Login should succeed");

        assert_eq!(user.username, "bob");
        assert_eq!(session.user_id, user.id);
        assert!(session.is_valid());

        let stored = get_session_by_token(&test_db.pool, &session.token)
            .await
            .expect("Session should be stored");
        assert_eq!(stored.user_id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_share_one_message() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let wrong_password = login(&test_db.pool, "alice", "wrong", 12).await;
        let unknown_user = login(&test_db.pool, "nobody", STANDARD_PASSWORD, 12).await;

        for result in [wrong_password, unknown_user] {
            match result {
                Err(AppError::Authentication(msg)) => assert_eq!(msg, INVALID_CREDENTIALS),
                Err(other) => panic!("Expected authentication error, got {:?}", other),
                Ok(_) => panic!("Login should fail"),
            }
        }
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let (_, session) = login(&test_db.pool, "alice", STANDARD_PASSWORD, 12)
            .await
            .expect("Login should succeed");

        logout(&test_db.pool, &session.token)
            .await
            .expect("Logout should succeed");

        let result = get_session_by_token(&test_db.pool, &session.token).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_session_lifetime_is_an_error() {
        let test_db = TestDbBuilder::new()
            .teacher("bob")
            .build()
            .await
            .expect("Failed to build test database");

        let result = login(&test_db.pool, "bob", STANDARD_PASSWORD, 10_000_000_000_000).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_sessions")
            .fetch_one(&test_db.pool)
            .await
            .expect("Count sessions");
        assert_eq!(count, 0, "No session should be opened");
    }
}
