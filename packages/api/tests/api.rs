use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use corestone_api::{
    config::ApiConfig,
    construct_router,
    entity::{grading, user},
    export::{ExportError, PdfRenderer},
    grading::{EssayGrader, GradingError, GradingResult, Rubric},
    schema::ensure_schema,
    session::FirebaseVerifier,
    state::State,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, jwk::JwkSet};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, Database, EntityTrait,
    PaginatorTrait, QueryFilter,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const ESSAY: &str = "Knowledge is shaped by the methods we use to acquire it, and those methods differ across areas of knowledge.";

struct FakeGrader {
    fail: bool,
}

#[async_trait::async_trait]
impl EssayGrader for FakeGrader {
    async fn grade(&self, _rubric: &Rubric, _essay: &str) -> Result<GradingResult, GradingError> {
        if self.fail {
            return Err(GradingError::Upstream {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        let scores = json!({ "Analysis": 8, "Structure": 6 })
            .as_object()
            .cloned()
            .unwrap();
        Ok(GradingResult {
            scores,
            overall_score: 7,
            feedback: "Clear argument with room for deeper counterclaims.".to_string(),
            recommendations: vec!["Add a counterclaim".to_string()],
        })
    }
}

struct FakePdfRenderer;

#[async_trait::async_trait]
impl PdfRenderer for FakePdfRenderer {
    async fn render(&self, html: String) -> Result<Vec<u8>, ExportError> {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(html.as_bytes());
        Ok(pdf)
    }
}

struct TestApp {
    state: Arc<State>,
    router: Router,
    db_path: PathBuf,
}

const FIREBASE_PROJECT: &str = "corestone-test";
const FIREBASE_KID: &str = "corestone-test-key";
const FIREBASE_KEY_PEM: &str = include_str!("fixtures/firebase_test_key.pem");
const FIREBASE_JWKS: &str = include_str!("fixtures/firebase_test_jwks.json");

fn test_config() -> ApiConfig {
    ApiConfig {
        database_url: "sqlite::memory:".to_string(),
        session_secret: "test-secret-test-secret-test-secret-0123".to_string(),
        session_ttl_hours: 24,
        cookie_secure: false,
        openai_api_key: "unused".to_string(),
        openai_endpoint: "http://localhost:9".to_string(),
        openai_model: "gpt-4o".to_string(),
        pdf_renderer_url: "http://localhost:9".to_string(),
        stripe_secret_key: None,
        firebase_project_id: None,
        smtp: None,
    }
}

/// A file-backed database with a real pool, so concurrent requests run on
/// separate connections.
async fn test_state(fail_grading: bool) -> (State, PathBuf) {
    let db_path = std::env::temp_dir().join(format!("corestone-{}.db", uuid::Uuid::new_v4()));
    let mut opt = ConnectOptions::new(format!("sqlite://{}?mode=rwc", db_path.display()));
    opt.max_connections(4).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    ensure_schema(&db).await.unwrap();

    let state = State::with_services(
        test_config(),
        db,
        Arc::new(FakeGrader { fail: fail_grading }),
        Arc::new(FakePdfRenderer),
    );
    (state, db_path)
}

impl TestApp {
    fn from_state(state: State, db_path: PathBuf) -> Self {
        let state = Arc::new(state);
        let router = construct_router(state.clone());
        Self {
            state,
            router,
            db_path,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.db_path.display()));
        }
    }
}

async fn setup_with(fail_grading: bool) -> TestApp {
    let (state, db_path) = test_state(fail_grading).await;
    TestApp::from_state(state, db_path)
}

async fn setup() -> TestApp {
    setup_with(false).await
}

async fn setup_with_firebase() -> TestApp {
    let (mut state, db_path) = test_state(false).await;
    let keys: JwkSet = serde_json::from_str(FIREBASE_JWKS).unwrap();
    state.firebase = Some(FirebaseVerifier::with_keys(
        FIREBASE_PROJECT,
        "http://127.0.0.1:9/",
        keys,
    ));
    TestApp::from_state(state, db_path)
}

fn firebase_token(uid: &str, extra: Value) -> String {
    let issued_at = Utc::now().timestamp();
    let mut claims = json!({
        "sub": uid,
        "aud": FIREBASE_PROJECT,
        "iss": format!("https://securetoken.google.com/{FIREBASE_PROJECT}"),
        "iat": issued_at,
        "exp": issued_at + 600,
    });
    if let (Some(claims), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
        claims.extend(extra.clone());
    }
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(FIREBASE_KID.to_string());
    let key = EncodingKey::from_rsa_pem(FIREBASE_KEY_PEM.as_bytes()).unwrap();
    encode(&header, &claims, &key).unwrap()
}

impl TestApp {
    async fn create_user(&self, username: &str, credits: i32) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(format!("{username}@example.com")),
            password_hash: Set(None),
            firebase_uid: Set(None),
            credits: Set(credits),
            subscription_expires_at: Set(None),
            is_admin: Set(false),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&self.state.db)
        .await
        .unwrap()
    }

    fn token(&self, user: &user::Model) -> String {
        self.state
            .session_keys
            .sign(user.id, Utc::now().naive_utc())
            .unwrap()
    }

    async fn reload(&self, user: &user::Model) -> user::Model {
        user::Entity::find_by_id(user.id)
            .one(&self.state.db)
            .await
            .unwrap()
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("corestone_session={token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn grade_body() -> Value {
    json!({ "essayText": ESSAY, "rubricId": 2 })
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup().await;
    let (status, body) = app.json(get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = setup().await;
    let (status, body) = app.json(get("/api/credits", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.json(get("/api/credits", Some("not-a-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_grading_consumes_one_credit() {
    let app = setup().await;
    let user = app.create_user("alice", 2).await;
    let token = app.token(&user);

    let (status, body) = app.json(post_json("/api/grade", Some(&token), grade_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overallScore"], 7);
    assert_eq!(body["scores"]["Analysis"], 8);

    assert_eq!(app.reload(&user).await.credits, 1);
    let (status, records) = app.json(get("/api/gradings", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["rubricName"], "TOK Essay");
}

#[tokio::test]
async fn test_grading_without_credits_is_payment_required() {
    let app = setup().await;
    let user = app.create_user("broke", 0).await;
    let token = app.token(&user);

    let (status, body) = app.json(post_json("/api/grade", Some(&token), grade_body())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["message"], "Insufficient credits");

    assert_eq!(app.reload(&user).await.credits, 0);
    let stored = grading::Entity::find().count(&app.state.db).await.unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_active_subscription_grades_without_debit() {
    let app = setup().await;
    let user = app.create_user("subscriber", 3).await;
    let mut active: user::ActiveModel = user.clone().into();
    active.subscription_expires_at = Set(Some(Utc::now().naive_utc() + Duration::days(10)));
    active.update(&app.state.db).await.unwrap();
    let token = app.token(&user);

    let (status, _) = app.json(post_json("/api/grade", Some(&token), grade_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.reload(&user).await.credits, 3);
}

#[tokio::test]
async fn test_short_essay_is_rejected_with_field_errors() {
    let app = setup().await;
    let user = app.create_user("terse", 1).await;
    let token = app.token(&user);

    let (status, body) = app
        .json(post_json(
            "/api/grade",
            Some(&token),
            json!({ "essayText": "Too short.", "rubricId": 1 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["fields"]["essayText"].is_string());
    assert_eq!(app.reload(&user).await.credits, 1);
}

#[tokio::test]
async fn test_unknown_rubric_is_bad_request() {
    let app = setup().await;
    let user = app.create_user("lost", 1).await;
    let token = app.token(&user);

    let (status, _) = app
        .json(post_json(
            "/api/grade",
            Some(&token),
            json!({ "essayText": ESSAY, "rubricId": 42 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.reload(&user).await.credits, 1);
}

#[tokio::test]
async fn test_grader_failure_refunds_credit() {
    let app = setup_with(true).await;
    let user = app.create_user("unlucky", 1).await;
    let token = app.token(&user);

    let (status, body) = app.json(post_json("/api/grade", Some(&token), grade_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "GRADING_FAILED");

    assert_eq!(app.reload(&user).await.credits, 1);
    let stored = grading::Entity::find().count(&app.state.db).await.unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gradings_share_a_single_credit() {
    let app = setup().await;
    let user = app.create_user("racer", 1).await;
    let token = app.token(&user);

    let mut requests = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let router = app.router.clone();
        let request = post_json("/api/grade", Some(&token), grade_body());
        requests.spawn(async move { router.oneshot(request).await.unwrap().status() });
    }
    let mut statuses = Vec::new();
    while let Some(status) = requests.join_next().await {
        statuses.push(status.unwrap());
    }
    let granted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let refused = statuses
        .iter()
        .filter(|s| **s == StatusCode::PAYMENT_REQUIRED)
        .count();
    assert_eq!((granted, refused), (1, 7), "statuses: {statuses:?}");

    assert_eq!(app.reload(&user).await.credits, 0);
    let stored = grading::Entity::find()
        .filter(grading::Column::UserId.eq(user.id))
        .count(&app.state.db)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = setup().await;
    let user = app.create_user("sloppy", 1).await;
    let token = app.token(&user);

    let (status, body) = app
        .json(post_json(
            "/api/grade",
            Some(&token),
            json!({ "essayText": ESSAY, "rubricId": "two" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["fields"]["rubricId"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/grade")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("{\"essayText\": "))
        .unwrap();
    let (status, body) = app.json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["code"].is_string());

    assert_eq!(app.reload(&user).await.credits, 1);
}

#[tokio::test]
async fn test_purchase_grants_bundle_credits() {
    let app = setup().await;
    let user = app.create_user("buyer", 1).await;
    let token = app.token(&user);

    let (status, body) = app
        .json(post_json("/api/purchase", Some(&token), json!({ "bundleId": 2 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credits"], 7);

    let (status, purchases) = app.json(get("/api/purchases", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(purchases[0]["bundleId"], 2);
    assert_eq!(purchases[0]["amount"], 500);
    assert_eq!(purchases[0]["status"], "completed");
}

#[tokio::test]
async fn test_subscription_purchase_sets_expiry() {
    let app = setup().await;
    let user = app.create_user("monthly", 0).await;
    let token = app.token(&user);

    let (status, body) = app
        .json(post_json("/api/purchase", Some(&token), json!({ "bundleId": 4 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credits"], 0);
    assert!(body["subscriptionExpiresAt"].is_string());

    let (status, _) = app.json(post_json("/api/grade", Some(&token), grade_body())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscription_purchases_stack() {
    let app = setup().await;
    let user = app.create_user("eager", 0).await;
    let token = app.token(&user);

    let mut requests = tokio::task::JoinSet::new();
    for _ in 0..2 {
        let router = app.router.clone();
        let request = post_json("/api/purchase", Some(&token), json!({ "bundleId": 4 }));
        requests.spawn(async move { router.oneshot(request).await.unwrap().status() });
    }
    while let Some(status) = requests.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    let expires_at = app.reload(&user).await.subscription_expires_at.unwrap();
    assert!(expires_at > Utc::now().naive_utc() + Duration::days(59));
}

#[tokio::test]
async fn test_unknown_bundle_is_not_found() {
    let app = setup().await;
    let user = app.create_user("shopper", 0).await;
    let token = app.token(&user);

    let (status, _) = app
        .json(post_json("/api/purchase", Some(&token), json!({ "bundleId": 99 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.json(get("/api/bundles/99", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_intent_requires_payments() {
    let app = setup().await;
    let user = app.create_user("intent", 0).await;
    let token = app.token(&user);

    let (status, _) = app
        .json(post_json(
            "/api/create-payment-intent",
            Some(&token),
            json!({ "bundleId": 1 }),
        ))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_bundle_catalog_is_public() {
    let app = setup().await;
    let (status, body) = app.json(get("/api/bundles", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_register_login_and_logout() {
    let app = setup().await;

    let (status, headers, body) = app
        .send(post_json(
            "/api/register",
            None,
            json!({ "username": "newstudent", "email": "New@Example.com", "password": "hunter22!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("corestone_session="));
    assert!(cookie.contains("HttpOnly"));
    let created: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["credits"], 1);
    assert_eq!(created["email"], "new@example.com");
    assert!(created.get("passwordHash").is_none());

    let (status, _) = app
        .json(post_json(
            "/api/register",
            None,
            json!({ "username": "newstudent", "email": "other@example.com", "password": "hunter22!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .json(post_json(
            "/api/login",
            None,
            json!({ "username": "newstudent", "password": "wrong-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid username or password");

    let (status, headers, _) = app
        .send(post_json(
            "/api/login",
            None,
            json!({ "username": "new@example.com", "password": "hunter22!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    let token = cookie
        .trim_start_matches("corestone_session=")
        .split(';')
        .next()
        .unwrap();

    let (status, me) = app.json(get("/api/user", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "newstudent");

    let (status, _) = app.json(post_json("/api/logout", None, json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_register_validates_fields() {
    let app = setup().await;
    let (status, body) = app
        .json(post_json(
            "/api/register",
            None,
            json!({ "username": "ab", "email": "nope", "password": "short" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = &body["error"]["fields"];
    assert!(fields["username"].is_string());
    assert!(fields["email"].is_string());
    assert!(fields["password"].is_string());
}

#[tokio::test]
async fn test_federated_login_links_existing_email() {
    let app = setup().await;
    let existing = app.create_user("linked", 4).await;

    let (status, headers, body) = app
        .send(post_json(
            "/api/auth/google",
            None,
            json!({ "email": "linked@example.com", "uid": "firebase-uid-1", "displayName": "Linked" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::SET_COOKIE).is_some());
    let account: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(account["id"], existing.id);
    assert_eq!(account["credits"], 4);
    assert_eq!(
        app.reload(&existing).await.firebase_uid.as_deref(),
        Some("firebase-uid-1")
    );
}

#[tokio::test]
async fn test_verified_login_ignores_posted_email() {
    let app = setup_with_firebase().await;
    let victim = app.create_user("victim", 5).await;
    let id_token = firebase_token("attacker-uid", json!({}));

    let (status, headers, _) = app
        .send(post_json(
            "/api/auth/google",
            None,
            json!({ "idToken": id_token, "email": "victim@example.com", "uid": "attacker-uid" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers.get(header::SET_COOKIE).is_none());
    assert_eq!(app.reload(&victim).await.firebase_uid, None);
}

#[tokio::test]
async fn test_unverified_email_does_not_link_existing_account() {
    let app = setup_with_firebase().await;
    let existing = app.create_user("owner", 5).await;
    let id_token = firebase_token(
        "other-uid",
        json!({ "email": "owner@example.com", "email_verified": false }),
    );

    let (status, body) = app
        .json(post_json("/api/auth/google", None, json!({ "idToken": id_token })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    assert_eq!(app.reload(&existing).await.firebase_uid, None);
}

#[tokio::test]
async fn test_verified_email_links_existing_account() {
    let app = setup_with_firebase().await;
    let existing = app.create_user("owner", 5).await;
    let id_token = firebase_token(
        "owner-uid",
        json!({ "email": "Owner@Example.com", "email_verified": true }),
    );

    let (status, headers, body) = app
        .send(post_json("/api/auth/google", None, json!({ "idToken": id_token })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::SET_COOKIE).is_some());
    let account: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(account["id"], existing.id);
    assert_eq!(
        app.reload(&existing).await.firebase_uid.as_deref(),
        Some("owner-uid")
    );
}

#[tokio::test]
async fn test_verified_login_creates_account() {
    let app = setup_with_firebase().await;
    let id_token = firebase_token(
        "fresh-uid",
        json!({ "email": "fresh@example.com", "email_verified": true }),
    );

    let (status, account) = app
        .json(post_json(
            "/api/auth/google",
            None,
            json!({ "idToken": id_token, "displayName": "Fresh Face" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["email"], "fresh@example.com");
    assert_eq!(account["credits"], 1);

    let stored = user::Entity::find()
        .filter(user::Column::FirebaseUid.eq("fresh-uid"))
        .count(&app.state.db)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_verified_login_requires_id_token() {
    let app = setup_with_firebase().await;
    let (status, body) = app
        .json(post_json(
            "/api/auth/google",
            None,
            json!({ "email": "someone@example.com", "uid": "someone" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_upload_rejects_unsupported_extension() {
    let app = setup().await;
    let user = app.create_user("uploader", 1).await;
    let token = app.token(&user);

    let (status, body) = app.json(upload(&token, "essay.exe", b"MZ\x90\x00")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Invalid file format. Only PDF, DOCX, and TXT files are allowed."
    );
}

#[tokio::test]
async fn test_upload_extracts_plain_text() {
    let app = setup().await;
    let user = app.create_user("writer", 1).await;
    let token = app.token(&user);

    let (status, body) = app.json(upload(&token, "essay.txt", ESSAY.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["text"], ESSAY);
}

fn upload(token: &str, filename: &str, contents: &[u8]) -> Request<Body> {
    let boundary = "corestone-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"essayFile\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload-essay")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_csv_export_after_grading() {
    let app = setup().await;
    let user = app.create_user("exporter", 1).await;
    let token = app.token(&user);
    let (status, _) = app.json(post_json("/api/grade", Some(&token), grade_body())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, body) = app.send(get("/api/export/csv", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(disposition.starts_with("attachment; filename=\"corestone-gradings-"));
    assert!(disposition.ends_with(".csv\""));

    let text = String::from_utf8(body).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "id,date,rubric,overall_score,essay_length,feedback_summary,recommendations_count,Analysis,Structure"
    );
    let row = lines.next().unwrap();
    assert!(row.contains("TOK Essay"));
    assert!(row.ends_with(",1,8,6"));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn test_json_and_pdf_exports() {
    let app = setup().await;
    let user = app.create_user("archivist", 1).await;
    let token = app.token(&user);
    app.json(post_json("/api/grade", Some(&token), grade_body())).await;

    let (status, body) = app.json(get("/api/export/json", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["export_info"]["total_gradings"], 1);
    assert_eq!(body["export_info"]["format_version"], "1.0");
    assert_eq!(body["gradings"][0]["assessment"]["scores"]["Structure"], 6);

    let (status, headers, body) = app.send(get("/api/export/pdf", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/pdf");
    assert!(body.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_export_errors() {
    let app = setup().await;
    let user = app.create_user("empty", 1).await;
    let token = app.token(&user);

    let (status, _) = app.json(get("/api/export/xml", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.json(get("/api/export/csv", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No gradings to export");

    let (status, body) = app
        .json(get("/api/export/json?gradingId=12345", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Grading not found");
}

#[tokio::test]
async fn test_contact_form_stores_message() {
    let app = setup().await;

    let (status, body) = app
        .json(post_json(
            "/api/contact",
            None,
            json!({ "name": "A", "email": "bad", "subject": "Hi", "message": "short" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["fields"].as_object().unwrap().len(), 4);

    let (status, body) = app
        .json(post_json(
            "/api/contact",
            None,
            json!({
                "name": "Parent",
                "email": "parent@example.com",
                "subject": "Question about bundles",
                "message": "Can a bundle be shared between two siblings?"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert!(body["id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_admin_messages_require_admin() {
    let app = setup().await;
    let student = app.create_user("student", 0).await;
    let token = app.token(&student);

    let (status, _) = app.json(get("/api/admin/contact-messages", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.create_user("staff", 0).await;
    let mut active: user::ActiveModel = admin.clone().into();
    active.is_admin = Set(true);
    active.update(&app.state.db).await.unwrap();
    let token = app.token(&admin);

    let (status, body) = app.json(get("/api/admin/contact-messages", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}
