use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use records_server::{
    config::{AppConfig, BootstrapAdmin},
    create_app, RecordsServer,
};

const PASSWORD: &str = "correct horse battery";

/// In-memory server with a bootstrapped administrator
struct TestApp {
    app: Router,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    async fn with_config(mut config: AppConfig) -> Self {
        config.auth.jwt_secret = "integration-test-secret".to_string();
        config.bootstrap_admin = Some(BootstrapAdmin {
            username: "admin".to_string(),
            email: "admin@school.test".to_string(),
            password: PASSWORD.to_string(),
        });

        let server = RecordsServer::in_memory(config);
        server.ensure_bootstrap_admin().await.unwrap();
        Self {
            app: create_app(server),
        }
    }

    async fn raw(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.raw(method, uri, token, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/token",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed for {username}: {body}");
        body["data"]["access"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.login("admin").await
    }

    /// Create a user through the admin API and return its token
    async fn user(&self, admin: &str, username: &str, role: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/users",
                admin,
                json!({
                    "username": username,
                    "email": format!("{username}@school.test"),
                    "password": PASSWORD,
                    "password2": PASSWORD,
                    "role": role,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "creating {username}: {body}");
        self.login(username).await
    }

    async fn own_profile_id(&self, token: &str, kind: &str) -> i64 {
        let (status, body) = self.get(&format!("/api/v1/{kind}/me"), token).await;
        assert_eq!(status, StatusCode::OK, "{kind}/me: {body}");
        body["data"]["id"].as_i64().unwrap()
    }

    async fn course(&self, token: &str, code: &str) -> i64 {
        let (status, body) = self
            .post("/api/v1/courses", token, json!({ "code": code, "title": format!("{code} title") }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_teacher_grades_enrolled_student_end_to_end() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let tina = t.user(&admin, "tina", "teacher").await;
    let uma = t.user(&admin, "uma", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    let tina_profile = t.own_profile_id(&tina, "teachers").await;
    let sam_profile = t.own_profile_id(&sam, "students").await;

    // Teacher-supplied teacher_id is replaced by the caller's profile
    let (status, course) = t
        .post("/api/v1/courses", &tina, json!({ "code": "CS101", "title": "Intro", "teacher_id": 999 }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{course}");
    assert_eq!(course["data"]["teacher_id"], tina_profile);
    let course_id = course["data"]["id"].as_i64().unwrap();

    let (status, enrollment) = t
        .post("/api/v1/enrollments", &sam, json!({ "student_id": 12345, "course_id": course_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{enrollment}");
    assert_eq!(enrollment["data"]["student_id"], sam_profile);

    let (status, grade) = t
        .post(
            "/api/v1/grades",
            &tina,
            json!({ "student_id": sam_profile, "course_id": course_id, "value": "A" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{grade}");
    assert_eq!(grade["data"]["teacher_id"], tina_profile);
    assert_eq!(grade["data"]["value"], "A");
    let grade_id = grade["data"]["id"].as_i64().unwrap();

    let (status, own) = t.get("/api/v1/grades", &sam).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(own["metadata"]["total_count"], 1);
    assert_eq!(own["data"][0]["value"], "A");

    let (status, other) = t.get("/api/v1/grades", &uma).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other["metadata"]["total_count"], 0);

    // Invisible rows are reported as missing
    let (status, _) = t.get(&format!("/api/v1/grades/{grade_id}"), &uma).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, denied) = t
        .post(
            "/api/v1/grades",
            &uma,
            json!({ "student_id": sam_profile, "course_id": course_id, "value": "F" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(denied["message"], "You do not have permission to perform this action.");
}

#[tokio::test]
async fn test_teacher_cannot_grade_student_who_is_not_enrolled() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let tina = t.user(&admin, "tina", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    let sam_profile = t.own_profile_id(&sam, "students").await;
    let course_id = t.course(&tina, "CS201").await;

    let (status, _) = t
        .post(
            "/api/v1/grades",
            &tina,
            json!({ "student_id": sam_profile, "course_id": course_id, "value": "B" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_or_bad_credentials_are_unauthenticated() {
    let t = TestApp::new().await;

    let (status, body) = t.send(Method::GET, "/api/v1/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_type"], "authentication_error");

    let (status, _) = t.send(Method::GET, "/api/v1/courses", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/token",
            None,
            Some(json!({ "username": "admin", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_user_loses_access_immediately() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let sam = t.user(&admin, "sam", "student").await;

    let (_, me) = t.get("/api/v1/me", &sam).await;
    let sam_id = me["data"]["id"].as_i64().unwrap();
    assert!(me["data"]["student_profile"].is_object());
    assert!(me["data"]["teacher_profile"].is_null());
    assert!(me["data"].get("password_hash").is_none());

    let (status, _) = t
        .send(
            Method::PATCH,
            &format!("/api/v1/users/{sam_id}"),
            Some(&admin),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.get("/api/v1/me", &sam).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_admins_are_forbidden_from_user_management() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let sam = t.user(&admin, "sam", "student").await;

    let (status, _) = t.get("/api/v1/users", &sam).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .post(
            "/api/v1/users",
            &sam,
            json!({ "username": "eve", "email": "eve@school.test", "password": PASSWORD, "password2": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send(Method::DELETE, "/api/v1/users/1", Some(&sam), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_self_service_profiles() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let sam = t.user(&admin, "sam", "student").await;
    let bob = t.user(&admin, "bob", "base").await;

    let (status, body) = t.get("/api/v1/students/me", &sam).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["enrollment_number"].as_str().unwrap().starts_with("ENR"));
    assert_eq!(body["data"]["user"]["username"], "sam");

    let (status, body) = t
        .send(
            Method::PUT,
            "/api/v1/students/me",
            Some(&sam),
            Some(json!({ "address": "12 Quad Lane" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["address"], "12 Quad Lane");
    assert_eq!(body["data"]["date_of_birth"], "2000-01-01");

    let (status, body) = t
        .send(
            Method::PATCH,
            "/api/v1/students/me",
            Some(&sam),
            Some(json!({ "phone_number": "not a phone" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["phone_number"].is_array());

    let (status, _) = t.get("/api/v1/students/me", &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.get("/api/v1/teachers/me", &sam).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.get("/api/v1/students/me", &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Student profile not found");
}

#[tokio::test]
async fn test_duplicates_are_conflicts_naming_the_field() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    t.user(&admin, "sam", "student").await;

    let (status, body) = t
        .post(
            "/api/v1/users",
            &admin,
            json!({ "username": "sam", "email": "other@school.test", "password": PASSWORD, "password2": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["field_errors"]["username"].is_array());

    t.course(&admin, "MATH1").await;
    let (status, body) = t
        .post("/api/v1/courses", &admin, json!({ "code": "MATH1", "title": "Again" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["field_errors"]["code"].is_array());
}

#[tokio::test]
async fn test_validation_reports_every_bad_field() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, body) = t
        .post(
            "/api/v1/users",
            &admin,
            json!({ "email": "nope", "password": "1234", "password2": "12345", "role": "wizard" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["username", "email", "password", "role"] {
        assert!(body["field_errors"][field].is_array(), "no error for {field}: {body}");
    }

    let (status, body) = t
        .post("/api/v1/enrollments", &admin, json!({ "student_id": 1, "course_id": 404 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"].is_object());
}

#[tokio::test]
async fn test_teacher_without_profile_gets_not_found_on_create() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let tina = t.user(&admin, "tina", "teacher").await;
    let tina_profile = t.own_profile_id(&tina, "teachers").await;

    let (status, _) = t
        .send(Method::DELETE, &format!("/api/v1/teachers/{tina_profile}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t
        .post("/api/v1/courses", &tina, json!({ "code": "ORPHAN", "title": "No teacher" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Teacher profile not found");
}

#[tokio::test]
async fn test_registration_disabled_by_default() {
    let t = TestApp::new().await;
    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({ "username": "newbie", "email": "newbie@school.test", "password": PASSWORD, "password2": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_registration_allows_only_student_or_base() {
    let mut config = AppConfig::default();
    config.auth.allow_self_registration = true;
    let t = TestApp::with_config(config).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({ "username": "mallory", "email": "m@school.test", "password": PASSWORD, "password2": PASSWORD, "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["role"].is_array());

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({ "username": "newbie", "email": "newbie@school.test", "password": PASSWORD, "password2": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["role"], "student");

    let newbie = t.login("newbie").await;
    let (status, _) = t.get("/api/v1/students/me", &newbie).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_exports_are_admin_only_csv() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let sam = t.user(&admin, "sam", "student").await;

    let response = t.raw(Method::GET, "/api/v1/exports/students", Some(&sam), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t.raw(Method::GET, "/api/v1/exports/students", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("ID,Username,Email,First Name,Last Name,Enrollment Number,Date of Birth,Phone Number,Address")
    );
    assert!(lines.next().unwrap().contains("sam@school.test"));

    let response = t.raw(Method::GET, "/api/v1/exports/grades?course_id=1", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        String::from_utf8(bytes.to_vec()).unwrap().trim_end(),
        "ID,Student Username,Student Enrollment,Course Code,Course Title,Grade,Teacher,Graded At"
    );
}

#[tokio::test]
async fn test_list_totals_exclude_invisible_rows() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let tina = t.user(&admin, "tina", "teacher").await;
    let uma = t.user(&admin, "uma", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    t.user(&admin, "sue", "student").await;

    let course_id = t.course(&tina, "BIO1").await;
    t.course(&uma, "CHEM1").await;
    let (status, _) = t
        .post("/api/v1/enrollments", &sam, json!({ "course_id": course_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, students) = t.get("/api/v1/students?page_size=1", &tina).await;
    assert_eq!(students["metadata"]["total_count"], 1);
    assert_eq!(students["data"][0]["user"]["username"], "sam");

    let (_, students) = t.get("/api/v1/students", &uma).await;
    assert_eq!(students["metadata"]["total_count"], 0);

    let (_, students) = t.get("/api/v1/students?page_size=1", &admin).await;
    assert_eq!(students["metadata"]["total_count"], 2);
    assert_eq!(students["metadata"]["pagination"]["has_next"], true);

    let (_, courses) = t.get("/api/v1/courses", &tina).await;
    assert_eq!(courses["metadata"]["total_count"], 1);
    assert_eq!(courses["data"][0]["code"], "BIO1");
}

#[tokio::test]
async fn test_concurrent_duplicate_enrollment_commits_once() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let sam = t.user(&admin, "sam", "student").await;
    let course_id = t.course(&admin, "HIST1").await;

    let body = json!({ "course_id": course_id });
    let (first, second) = tokio::join!(
        t.post("/api/v1/enrollments", &sam, body.clone()),
        t.post("/api/v1/enrollments", &sam, body.clone()),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    let conflict = if first.0 == StatusCode::CONFLICT { first.1 } else { second.1 };
    assert!(conflict["field_errors"]["non_field_errors"].is_array());
}

#[tokio::test]
async fn test_health_and_openapi_are_public() {
    let t = TestApp::new().await;

    let (status, body) = t.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");

    let (status, body) = t.send(Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/grades"].is_object());
}

#[tokio::test]
async fn test_second_grade_for_pair_conflicts_but_update_succeeds() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let tina = t.user(&admin, "tina", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    let tina_profile = t.own_profile_id(&tina, "teachers").await;
    let sam_profile = t.own_profile_id(&sam, "students").await;
    let course_id = t.course(&tina, "PHYS1").await;
    let (status, _) = t.post("/api/v1/enrollments", &sam, json!({ "course_id": course_id })).await;
    assert_eq!(status, StatusCode::CREATED);

    let grade = json!({ "student_id": sam_profile, "course_id": course_id, "value": "C" });
    let (status, first) = t.post("/api/v1/grades", &tina, grade.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let grade_id = first["data"]["id"].as_i64().unwrap();

    let (status, body) = t.post("/api/v1/grades", &tina, json!({ "student_id": sam_profile, "course_id": course_id, "value": "A" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["field_errors"]["non_field_errors"].is_array());

    // The caller stays the grading teacher whatever the payload says
    let (status, body) = t
        .send(
            Method::PATCH,
            &format!("/api/v1/grades/{grade_id}"),
            Some(&tina),
            Some(json!({ "value": "B", "teacher_id": 999 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["value"], "B");
    assert_eq!(body["data"]["teacher_id"], tina_profile);

    let (_, grades) = t.get("/api/v1/grades", &sam).await;
    assert_eq!(grades["metadata"]["total_count"], 1);
    assert_eq!(grades["data"][0]["value"], "B");
}

#[tokio::test]
async fn test_deleting_teacher_profile_keeps_grade_without_teacher() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let tina = t.user(&admin, "tina", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    let tina_profile = t.own_profile_id(&tina, "teachers").await;
    let sam_profile = t.own_profile_id(&sam, "students").await;
    let course_id = t.course(&tina, "ART1").await;
    t.post("/api/v1/enrollments", &sam, json!({ "course_id": course_id })).await;
    let (status, grade) = t
        .post("/api/v1/grades", &tina, json!({ "student_id": sam_profile, "course_id": course_id, "value": "A" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let grade_id = grade["data"]["id"].as_i64().unwrap();

    let (status, _) = t
        .send(Method::DELETE, &format!("/api/v1/teachers/{tina_profile}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t.get(&format!("/api/v1/grades/{grade_id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["teacher_id"].is_null());
    let (_, course) = t.get(&format!("/api/v1/courses/{course_id}"), &admin).await;
    assert!(course["data"]["teacher_id"].is_null());
}

#[tokio::test]
async fn test_role_change_does_not_provision_profile() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let bob = t.user(&admin, "bob", "base").await;
    let (_, me) = t.get("/api/v1/me", &bob).await;
    let bob_id = me["data"]["id"].as_i64().unwrap();

    let (status, body) = t
        .send(
            Method::PATCH,
            &format!("/api/v1/users/{bob_id}"),
            Some(&admin),
            Some(json!({ "role": "student" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["role"], "student");

    let (status, body) = t.get("/api/v1/students/me", &bob).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Student profile not found");
}

#[tokio::test]
async fn test_user_list_refuses_non_admin_before_reading_filters() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let sam = t.user(&admin, "sam", "student").await;

    for uri in ["/api/v1/users?role=wizard", "/api/v1/users?is_active=maybe", "/api/v1/users?page=zero"] {
        let (status, body) = t.get(uri, &sam).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}: {body}");
        assert_eq!(body["message"], "You do not have permission to perform this action.");
    }

    let (status, body) = t.get("/api/v1/users?role=wizard", &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["role"].is_array());
}

#[tokio::test]
async fn test_create_validates_payload_before_resolving_profile() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let tina = t.user(&admin, "tina", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    let tina_profile = t.own_profile_id(&tina, "teachers").await;
    t.send(Method::DELETE, &format!("/api/v1/teachers/{tina_profile}"), Some(&admin), None)
        .await;

    let (status, body) = t.post("/api/v1/grades", &tina, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["field_errors"]["value"].is_array());

    let (status, _) = t.post("/api/v1/courses", &tina, json!({ "title": "No code" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Students never have to name themselves
    let (status, body) = t.post("/api/v1/enrollments", &sam, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["course_id"].is_array());
    assert!(body["field_errors"].get("student_id").is_none());
}

#[tokio::test]
async fn test_student_export_uses_profile_id() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    t.user(&admin, "tina", "teacher").await;
    let sam = t.user(&admin, "sam", "student").await;
    let sam_profile = t.own_profile_id(&sam, "students").await;
    let (_, me) = t.get("/api/v1/me", &sam).await;
    let sam_user = me["data"]["id"].as_i64().unwrap();
    assert_ne!(sam_profile, sam_user);

    let response = t.raw(Method::GET, "/api/v1/exports/students", Some(&admin), None).await;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let row = text.lines().nth(1).unwrap();
    assert!(row.starts_with(&format!("{sam_profile},sam,")), "{row}");
}

#[tokio::test]
async fn test_refresh_token_issues_new_access_token() {
    let t = TestApp::new().await;
    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/token",
            None,
            Some(json!({ "username": "admin", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["data"]["access"].as_str().unwrap().to_string();
    let refresh = body["data"]["refresh"].as_str().unwrap().to_string();

    let (status, body) = t
        .send(Method::POST, "/api/v1/token/refresh", None, Some(json!({ "refresh": refresh })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let renewed = body["data"]["access"].as_str().unwrap().to_string();
    let (status, _) = t.get("/api/v1/me", &renewed).await;
    assert_eq!(status, StatusCode::OK);

    // Neither token type stands in for the other
    let (status, _) = t
        .send(Method::POST, "/api/v1/token/refresh", None, Some(json!({ "refresh": access })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.get("/api/v1/me", &refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_and_inactive_accounts_get_the_same_answer() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    t.user(&admin, "sam", "student").await;
    let (_, users) = t.get("/api/v1/users?username=sam", &admin).await;
    let sam_id = users["data"][0]["id"].as_i64().unwrap();
    t.send(
        Method::PATCH,
        &format!("/api/v1/users/{sam_id}"),
        Some(&admin),
        Some(json!({ "is_active": false })),
    )
    .await;

    let mut messages = Vec::new();
    for username in ["sam", "nobody"] {
        let (status, body) = t
            .send(
                Method::POST,
                "/api/v1/token",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        messages.push(body["message"].clone());
    }
    assert_eq!(messages[0], messages[1]);
}
