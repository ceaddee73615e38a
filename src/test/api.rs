#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use serde_json::{Value, json};

    use crate::api::LinkStudentResponse;
    use crate::assignment::BatchReport;
    use crate::identity::ResolvedProfile;
    use crate::test::test_utils::{create_standard_test_db, setup_test_client};
    use crate::validation::ValidationResponse;

    #[rocket::async_test]
    async fn test_health() {
        let (client, _test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/health").dispatch().await;

        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_resolve_api() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;
        let user_id = test_db.user_id("student_chen");

        let response = client
            .get(format!("/api/resolve/{}", user_id))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let resolved: ResolvedProfile = response.into_json().await.unwrap();
        assert_eq!(resolved.profile_id, test_db.profile_id("student_chen"));
        assert_eq!(resolved.user_id, user_id);
    }

    #[rocket::async_test]
    async fn test_resolve_api_errors() {
        let (client, _test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/resolve/not-a-uuid").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: ValidationResponse = response.into_json().await.unwrap();
        assert_eq!(body.status, "error");
        assert!(body.errors.contains_key("identifier"));

        let response = client
            .get("/api/resolve/00000000-0000-0000-0000-000000000102")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let body: ValidationResponse = response.into_json().await.unwrap();
        assert!(body.errors.contains_key("profile"));
    }

    #[rocket::async_test]
    async fn test_create_profile_api() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;
        let orphan = test_db.user_id("student_orphan");

        let response = client
            .post("/api/profiles")
            .header(ContentType::JSON)
            .body(
                json!({
                    "userId": orphan.as_str(),
                    "fullName": "Orphan Student",
                    "studentNumber": "2025-0042"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["userId"], orphan.as_str());
        assert_eq!(body["studentNumber"], "2025-0042");

        let response = client
            .post("/api/profiles")
            .header(ContentType::JSON)
            .body(json!({ "userId": orphan.as_str() }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_create_profile_api_validation() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/profiles")
            .header(ContentType::JSON)
            .body(
                json!({
                    "userId": test_db.user_id("student_orphan").as_str(),
                    "fullName": ""
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: ValidationResponse = response.into_json().await.unwrap();
        assert!(body.errors.contains_key("full_name"));
        assert_eq!(test_db.count_rows("student_profiles").await, 3);
    }

    #[rocket::async_test]
    async fn test_assign_program_api_with_user_id() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;
        let body = json!({
            "identifier": test_db.user_id("student_liu").as_str(),
            "programId": test_db.program_id("CS-2025").as_str(),
            "teacherId": test_db.user_id("teacher_wang").as_str(),
            "notes": "first"
        });

        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);
        let outcome: Value = response.into_json().await.unwrap();
        assert_eq!(outcome["created"], true);
        assert_eq!(
            outcome["assignment"]["studentId"],
            test_db.profile_id("student_liu").as_str()
        );

        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(
                json!({
                    "identifier": test_db.profile_id("student_liu").as_str(),
                    "programId": test_db.program_id("CS-2025").as_str(),
                    "notes": "second",
                    "status": "completed"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let outcome: Value = response.into_json().await.unwrap();
        assert_eq!(outcome["created"], false);
        assert_eq!(outcome["assignment"]["status"], "completed");
        assert_eq!(outcome["assignment"]["notes"], "second");

        let response = client
            .get(format!(
                "/api/profiles/{}/assignments",
                test_db.user_id("student_liu")
            ))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let assignments: Value = response.into_json().await.unwrap();
        assert_eq!(assignments.as_array().unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn test_assign_program_api_missing_program() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(
                json!({
                    "identifier": test_db.profile_id("student_chen").as_str(),
                    "programId": "00000000-0000-0000-0000-000000000102"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: ValidationResponse = response.into_json().await.unwrap();
        assert!(body.errors["reference"][0].contains("training program"));
        assert_eq!(test_db.count_rows("student_training_programs").await, 0);
    }

    #[rocket::async_test]
    async fn test_assign_program_api_unknown_student() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(
                json!({
                    "identifier": test_db.user_id("student_orphan").as_str(),
                    "programId": test_db.program_id("CS-2025").as_str()
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(test_db.count_rows("student_profiles").await, 3);
        assert_eq!(test_db.count_rows("student_training_programs").await, 0);
    }

    #[rocket::async_test]
    async fn test_batch_assign_api() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/assignments/batch")
            .header(ContentType::JSON)
            .body(
                json!({
                    "programId": test_db.program_id("SE-2025").as_str(),
                    "teacherId": test_db.user_id("teacher_wang").as_str(),
                    "profileIds": [
                        test_db.profile_id("student_chen").as_str(),
                        "00000000-0000-0000-0000-000000000102",
                        test_db.profile_id("student_liu").as_str(),
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let report: BatchReport = response.into_json().await.unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.total_count, 3);
        assert_eq!(
            report.details[0].item_id,
            "00000000-0000-0000-0000-000000000102"
        );
        assert_eq!(test_db.count_rows("student_training_programs").await, 2);
    }

    #[rocket::async_test]
    async fn test_batch_assign_api_rejects_empty_list() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/assignments/batch")
            .header(ContentType::JSON)
            .body(
                json!({
                    "programId": test_db.program_id("SE-2025").as_str(),
                    "profileIds": []
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: ValidationResponse = response.into_json().await.unwrap();
        assert_eq!(
            body.errors["profile_ids"],
            vec!["At least one profile id is required".to_string()]
        );
        assert_eq!(test_db.count_rows("student_training_programs").await, 0);
    }

    #[rocket::async_test]
    async fn test_teacher_student_api() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;
        let teacher = test_db.user_id("teacher_wang");

        for expected in [true, false] {
            let response = client
                .post(format!("/api/teachers/{}/students", teacher))
                .header(ContentType::JSON)
                .body(json!({ "identifier": test_db.user_id("student_zhao").as_str() }).to_string())
                .dispatch()
                .await;

            assert_eq!(response.status(), Status::Ok);
            let body: LinkStudentResponse = response.into_json().await.unwrap();
            assert_eq!(body.linked, expected);
        }

        let response = client
            .get(format!("/api/teachers/{}/students", teacher))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let students: Value = response.into_json().await.unwrap();
        assert_eq!(
            students[0]["id"],
            test_db.profile_id("student_zhao").as_str()
        );
    }

    #[rocket::async_test]
    async fn test_tags_api() {
        let (client, test_db) = setup_test_client(create_standard_test_db().await).await;
        let profile = test_db.profile_id("student_chen");

        for name in ["Rust", "Rust", "SQL"] {
            let response = client
                .post(format!("/api/profiles/{}/tags", profile))
                .header(ContentType::JSON)
                .body(json!({ "name": name }).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
        }

        let response = client
            .get(format!("/api/profiles/{}/tags", profile))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        let names: Vec<&str> = body["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["tagName"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Rust", "SQL"]);
    }

    #[rocket::async_test]
    async fn test_users_without_profiles_api() {
        let (client, _test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .get("/api/diagnostics/users-without-profiles")
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let users: Value = response.into_json().await.unwrap();
        let users = users.as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["username"], "student_orphan");
    }

    #[rocket::async_test]
    async fn test_unknown_route_returns_json() {
        let (client, _test_db) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/nothing-here").dispatch().await;

        assert_eq!(response.status(), Status::NotFound);
        let body: ValidationResponse = response.into_json().await.unwrap();
        assert_eq!(body.status, "error");
    }
}
