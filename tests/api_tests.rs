// tests/api_tests.rs

use std::sync::Arc;

use exam_session::{
    config::Config,
    models::question::Question,
    routes,
    session::{SessionPolicy, SessionRegistry, time::SystemClock},
    state::AppState,
    store::memory::{MemoryPersistence, MemoryQuestionBank},
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    store: Arc<MemoryPersistence>,
}

/// Helper function to spawn the app on a random port for testing.
/// Sessions run against in-memory question and result stores.
async fn spawn_app() -> TestApp {
    let options = || vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let bank = MemoryQuestionBank::with_exam(
        1,
        vec![
            Question::new(1, "First", options(), 0),
            Question::new(2, "Second", options(), 2),
        ],
    );
    let store = Arc::new(MemoryPersistence::new());

    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        policy: SessionPolicy::default(),
    };
    let registry = SessionRegistry::new(
        config.policy.clone(),
        Arc::new(bank),
        store.clone(),
        Arc::new(SystemClock),
    );

    let state = AppState { registry, config };
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, store }
}

fn token(student_id: i64) -> String {
    sign_jwt(student_id, SECRET, 600).unwrap()
}

async fn open_session(client: &reqwest::Client, app: &TestApp, student_id: i64) -> Value {
    let response = client
        .post(format!("{}/api/sessions", app.address))
        .bearer_auth(token(student_id))
        .json(&json!({ "exam_id": 1 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn sessions_require_a_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/sessions", app.address))
        .json(&json!({ "exam_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .post(format!("{}/api/sessions", app.address))
        .bearer_auth("not-a-jwt")
        .json(&json!({ "exam_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn answer_and_submit_flow() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let session = open_session(&client, &app, 7).await;
    assert_eq!(session["status"], "IN_PROGRESS");
    assert_eq!(session["total_questions"], 2);
    assert!(session["current_question"]["id"].is_i64());
    assert!(session["current_question"].get("correct_option_index").is_none());
    let id = session["session_id"].as_str().unwrap().to_string();
    let base = format!("{}/api/sessions/{}", app.address, id);

    let response = client
        .post(format!("{}/answers", base))
        .bearer_auth(token(7))
        .json(&json!({ "question_id": 1, "option_index": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["session"]["answers"]["1"], 0);

    let response = client
        .post(format!("{}/answers", base))
        .bearer_auth(token(7))
        .json(&json!({ "question_id": 2, "option_index": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .post(format!("{}/next", base))
        .bearer_auth(token(7))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["session"]["current_index"], 1);

    let response = client
        .post(format!("{}/submit", base))
        .bearer_auth(token(7))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["finalized"], true);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["result"]["score"], 1.0);
    assert_eq!(body["result"]["max_score"], 2.0);
    assert_eq!(body["result"]["reason"], "manual");

    // A second submission reports the stored result without saving again.
    let response = client
        .post(format!("{}/submit", base))
        .bearer_auth(token(7))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["finalized"], false);
    assert_eq!(body["result"]["score"], 1.0);
    assert_eq!(app.store.save_calls(), 1);
    assert_eq!(app.store.results().await.len(), 1);
}

#[tokio::test]
async fn second_attempt_is_conflict() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    open_session(&client, &app, 8).await;

    let response = client
        .post(format!("{}/api/sessions", app.address))
        .bearer_auth(token(8))
        .json(&json!({ "exam_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn unknown_exam_is_404_and_frees_the_slot() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .post(format!("{}/api/sessions", app.address))
            .bearer_auth(token(9))
            .json(&json!({ "exam_id": 42 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}

#[tokio::test]
async fn other_students_cannot_see_a_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let session = open_session(&client, &app, 10).await;
    let id = session["session_id"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .bearer_auth(token(11))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .bearer_auth(token(10))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn cheating_signals_and_acknowledgement() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let session = open_session(&client, &app, 12).await;
    let id = session["session_id"].as_str().unwrap();
    let base = format!("{}/api/sessions/{}", app.address, id);

    let response = client
        .post(format!("{}/signals", base))
        .bearer_auth(token(12))
        .json(&json!({ "kind": "visibility_lost" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["session"]["cheating_attempts"], 1);
    assert_eq!(body["session"]["pending_acknowledgement"], true);

    // Same episode.
    let response = client
        .post(format!("{}/signals", base))
        .bearer_auth(token(12))
        .json(&json!({ "kind": "focus_lost" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], false);
    assert_eq!(body["session"]["cheating_attempts"], 1);

    let response = client
        .post(format!("{}/acknowledge", base))
        .bearer_auth(token(12))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["session"]["pending_acknowledgement"], false);

    let response = client
        .post(format!("{}/visibility", base))
        .bearer_auth(token(12))
        .json(&json!({ "hidden": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn submit_rejects_automatic_reasons() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let session = open_session(&client, &app, 13).await;
    let id = session["session_id"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/sessions/{}/submit", app.address, id))
        .bearer_auth(token(13))
        .json(&json!({ "reason": "timeout" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.store.save_calls(), 0);
}

#[tokio::test]
async fn closing_a_session_ends_the_attempt() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let session = open_session(&client, &app, 14).await;
    let id = session["session_id"].as_str().unwrap();
    let url = format!("{}/api/sessions/{}", app.address, id);

    let response = client
        .post(format!("{}/signals", url))
        .bearer_auth(token(14))
        .json(&json!({ "kind": "visibility_lost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .delete(&url)
        .bearer_auth(token(14))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client.get(&url).bearer_auth(token(14)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // The closed attempt was finalized with what it had so far.
    let results = app.store.results().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].student_id, 14);
    assert_eq!(results[0].cheating_attempts, 1);

    // No fresh attempt with a new deadline and a clean record.
    let response = client
        .post(format!("{}/api/sessions", app.address))
        .bearer_auth(token(14))
        .json(&json!({ "exam_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn event_stream_sends_clock_ticks() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let session = open_session(&client, &app, 15).await;
    let id = session["session_id"].as_str().unwrap();
    let url = format!("{}/api/sessions/{}/events", app.address, id);

    let response = client.get(&url).bearer_auth(token(16)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let mut response = client.get(&url).bearer_auth(token(15)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    // Ticks arrive once per second.
    let frames = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let mut buf = String::new();
        while !buf.contains("\n\n") {
            let chunk = response.chunk().await.unwrap().expect("stream ended");
            buf.push_str(&String::from_utf8_lossy(&chunk));
        }
        buf
    })
    .await
    .expect("no event within 5s");

    assert!(frames.starts_with("event: tick\n"), "got {:?}", frames);
    assert!(frames.contains(r#""type":"tick""#));
    assert!(frames.contains("remaining_ms"));
}
