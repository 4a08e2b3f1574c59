//! Integration tests for the HTTP gateway.
//!
//! The full service (router, queue, orchestrator) is served over TCP and
//! driven with a real HTTP client; GitHub, Gemini and the evaluator are fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    config, initial_app, model_reply, request_body, spawn, FakeEvaluator, FakeGemini, FakeGitHub,
    REPO,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sitewright_orchestrator::{create_router, AppState, Config, ProjectOrchestrator, TaskQueue};

struct Harness {
    url: String,
    http: reqwest::Client,
    github: FakeGitHub,
    gemini: FakeGemini,
    evaluator: FakeEvaluator,
}

impl Harness {
    async fn start(replies: Vec<String>) -> Self {
        Self::start_with(replies, |_| {}).await
    }

    async fn start_with<F>(replies: Vec<String>, tweak: F) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let github = FakeGitHub::start().await;
        let gemini = FakeGemini::start(replies).await;
        let evaluator = FakeEvaluator::start(0).await;

        let mut config = config(&github, &gemini);
        tweak(&mut config);

        let orchestrator =
            Arc::new(ProjectOrchestrator::from_config(&config).expect("Failed to build orchestrator"));
        let queue = TaskQueue::new(orchestrator, config.queue.max_concurrent_tasks);
        let url = spawn(create_router(AppState::new(&config, queue))).await;

        Self {
            url,
            http: reqwest::Client::new(),
            github,
            gemini,
            evaluator,
        }
    }

    async fn post_task(&self, body: &Value) -> (StatusCode, Value) {
        let response = self
            .http
            .post(format!("{}/handle_task", self.url))
            .json(body)
            .send()
            .await
            .expect("Request failed");
        let status = response.status();
        let body = response.json().await.expect("Response is not JSON");
        (status, body)
    }
}

#[tokio::test]
async fn test_health_and_index_respond() {
    let harness = Harness::start(Vec::new()).await;

    let health: Value = harness
        .http
        .get(format!("{}/health", harness.url))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Response is not JSON");
    assert_eq!(health, json!({ "status": "ok" }));

    let index = harness
        .http
        .get(&harness.url)
        .send()
        .await
        .expect("Request failed")
        .text()
        .await
        .expect("Response is not text");
    assert!(index.contains("/handle_task"));
}

#[tokio::test]
async fn test_accepted_request_runs_round_in_background() {
    let harness = Harness::start(vec![initial_app()]).await;

    let (status, body) = harness
        .post_task(&request_body(1, &harness.evaluator.url))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "accepted", "task": "captcha-solver", "round": 1 })
    );

    let payloads = harness.evaluator.wait_for(1).await;
    assert_eq!(payloads[0]["round"], 1);
    let repo = harness.github.repo(REPO).expect("repository should exist");
    assert!(repo.pages_enabled);
    assert!(repo.files.contains_key("index.html"));
}

#[tokio::test]
async fn test_wrong_secret_is_rejected_without_side_effects() {
    let harness = Harness::start(vec![initial_app()]).await;
    let mut body = request_body(1, &harness.evaluator.url);
    body["secret"] = json!("not-the-secret");

    let (status, reply) = harness.post_task(&body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({ "status": "error", "message": "Invalid secret" }));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.github.create_calls(), 0);
    assert!(harness.gemini.prompts().is_empty());
    assert_eq!(harness.evaluator.attempts(), 0);
}

#[tokio::test]
async fn test_strict_auth_answers_401() {
    let harness = Harness::start_with(Vec::new(), |config| config.strict_auth_status = true).await;
    let mut body = request_body(1, &harness.evaluator.url);
    body["secret"] = json!("not-the-secret");

    let (status, reply) = harness.post_task(&body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["message"], "Invalid secret");
}

#[tokio::test]
async fn test_malformed_requests_answer_400() {
    let harness = Harness::start(Vec::new()).await;

    let response = harness
        .http
        .post(format!("{}/handle_task", harness.url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut unknown_round = request_body(1, &harness.evaluator.url);
    unknown_round["round"] = json!(3);
    let (status, reply) = harness.post_task(&unknown_round).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["status"], "error");

    let mut bad_callback = request_body(1, &harness.evaluator.url);
    bad_callback["evaluation_url"] = json!("ftp://eval.example.com/notify");
    let (status, reply) = harness.post_task(&bad_callback).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["message"]
        .as_str()
        .is_some_and(|m| m.contains("evaluation_url")));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.github.create_calls(), 0);
}

#[tokio::test]
async fn test_back_to_back_rounds_for_same_task_run_in_order() {
    let revised = model_reply(&[("index.html", "<!doctype html><title>Captcha Solver v2</title>")]);
    let harness = Harness::start(vec![initial_app(), revised]).await;

    let (first, _) = harness
        .post_task(&request_body(1, &harness.evaluator.url))
        .await;
    let (second, _) = harness
        .post_task(&request_body(2, &harness.evaluator.url))
        .await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    let payloads = harness.evaluator.wait_for(2).await;
    assert_eq!(payloads[0]["round"], 1);
    assert_eq!(payloads[1]["round"], 2);

    let prompts = harness.gemini.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("console.log('solving');"));

    let repo = harness.github.repo(REPO).expect("repository should exist");
    assert_eq!(
        repo.files["index.html"].content,
        "<!doctype html><title>Captcha Solver v2</title>"
    );
    assert_eq!(payloads[1]["commit_sha"], repo.head().expect("head commit"));
}
