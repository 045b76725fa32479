#[cfg(test)]
mod tests {
    use rocket::tokio;

    use crate::auth::Role;
    use crate::db::{
        authenticate_user, create_user, find_enrollment, find_user_by_email,
        find_user_by_username, get_course, get_lesson, get_user, insert_enrollment,
    };
    use crate::error::AppError;
    use crate::test::test_utils::{STANDARD_PASSWORD, TestDbBuilder, create_standard_test_db};

    #[tokio::test]
    async fn test_passwords_are_stored_hashed() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let (stored,): (String,) = sqlx::query_as("SELECT password FROM users WHERE username = ?")
            .bind("alice")
            .fetch_one(&test_db.pool)
            .await
            .expect("Password row should exist");

        assert_ne!(stored, STANDARD_PASSWORD);
        assert!(bcrypt::verify(STANDARD_PASSWORD, &stored).expect("Stored hash should parse"));
    }

    #[tokio::test]
    async fn test_authenticate_user() {
        let test_db = TestDbBuilder::new()
            .teacher("bob")
            .build()
            .await
            .expect("Failed to build test database");

        let user = authenticate_user(&test_db.pool, "bob", STANDARD_PASSWORD)
            .await
            .expect("Query should succeed")
            .expect("Credentials should match");
        assert_eq!(user.username, "bob");
        assert_eq!(user.role, Role::Teacher);

        let wrong = authenticate_user(&test_db.pool, "bob", "nope")
            .await
            .expect("Query should succeed");
        assert!(wrong.is_none());

        let unknown = authenticate_user(&test_db.pool, "carol", STANDARD_PASSWORD)
            .await
            .expect("Query should succeed");
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_user_lookups() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let by_name = find_user_by_username(&test_db.pool, "alice")
            .await
            .expect("Query should succeed")
            .expect("User should exist");
        let by_email = find_user_by_email(&test_db.pool, "alice@example.com")
            .await
            .expect("Query should succeed")
            .expect("User should exist");
        assert_eq!(by_name, by_email);

        let missing = find_user_by_username(&test_db.pool, "ALICE")
            .await
            .expect("Query should succeed");
        assert!(missing.is_none(), "Usernames are compared exactly");

        let result = get_user(&test_db.pool, 12345).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unique_constraints_surface_as_unique_violations() {
        let test_db = TestDbBuilder::new()
            .student("alice")
            .build()
            .await
            .expect("Failed to build test database");

        let err = create_user(&test_db.pool, "alice", "fresh@example.com", "pw", false)
            .await
            .expect_err("Duplicate username should be rejected");
        assert!(err.is_unique_violation());

        let err = create_user(&test_db.pool, "fresh", "alice@example.com", "pw", false)
            .await
            .expect_err("Duplicate email should be rejected");
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_row_is_rejected() {
        let test_db = TestDbBuilder::new()
            .teacher("owner")
            .student("learner")
            .course("Owned", "desc", None, None, "owner")
            .enrollment("learner", "Owned")
            .build()
            .await
            .expect("Failed to build test database");
        let user_id = test_db.user_id("learner").expect("User seeded");
        let course_id = test_db.course_id("Owned").expect("Course seeded");

        let enrollment = find_enrollment(&test_db.pool, user_id, course_id)
            .await
            .expect("Query should succeed")
            .expect("Enrollment should exist");
        assert_eq!(enrollment.progress, 0);
        assert_eq!(enrollment.course_title, "Owned");

        let err = insert_enrollment(&test_db.pool, user_id, course_id)
            .await
            .expect_err("Second enrollment should be rejected");
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_progress_is_bounded() {
        let test_db = TestDbBuilder::new()
            .teacher("owner")
            .student("learner")
            .course("Owned", "desc", None, None, "owner")
            .enrollment("learner", "Owned")
            .build()
            .await
            .expect("Failed to build test database");

        let result = sqlx::query("UPDATE enrollments SET progress = 101")
            .execute(&test_db.pool)
            .await;
        assert!(result.is_err(), "Progress above 100 should violate the check");
    }

    #[tokio::test]
    async fn test_missing_course_and_lesson_are_not_found() {
        let test_db = create_standard_test_db().await;

        assert!(matches!(
            get_course(&test_db.pool, 999).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            get_lesson(&test_db.pool, 999).await,
            Err(AppError::NotFound(_))
        ));
    }
}
