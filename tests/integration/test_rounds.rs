//! End-to-end tests for both rounds.
//!
//! The production orchestrator is built from configuration and talks to
//! in-process fakes of GitHub, Gemini and the evaluation endpoint over HTTP.

mod common;

use common::{
    config, initial_app, model_reply, request, FakeEvaluator, FakeGemini, FakeGitHub, OWNER, REPO,
    WEB_URL,
};
use std::time::Duration;

use sitewright_codegen::REQUIRED_FILES;
use sitewright_hosting::{PublishOutcome, PushOutcome, PAGES_WORKFLOW_PATH};
use sitewright_orchestrator::{ProjectOrchestrator, Round};

fn orchestrator(github: &FakeGitHub, gemini: &FakeGemini) -> ProjectOrchestrator {
    ProjectOrchestrator::from_config(&config(github, gemini)).expect("Failed to build orchestrator")
}

#[tokio::test]
async fn test_round_one_creates_publishes_and_reports() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec![initial_app()]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    let report = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;

    assert!(report.aborted.is_none(), "round aborted: {:?}", report.aborted);
    assert_eq!(report.pushes.len(), 4);
    assert_eq!(report.failed_pushes(), 0);
    assert!(report
        .pushes
        .iter()
        .all(|p| p.outcome == PushOutcome::Created));
    assert_eq!(report.pages, Some(PublishOutcome::Enabled));
    assert_eq!(report.workflow, Some(PushOutcome::Created));
    assert!(report.delivered());

    let repo = github.repo(REPO).expect("repository should exist");
    assert!(repo.pages_enabled);
    for name in ["index.html", "script.js", "README.md", "LICENSE", PAGES_WORKFLOW_PATH] {
        assert!(repo.files.contains_key(name), "missing {name}");
    }
    assert_eq!(
        repo.files["index.html"].content,
        "<!doctype html><title>Captcha Solver</title>"
    );
    assert_eq!(repo.files["index.html"].message, "Add index.html");
    assert!(repo.files[PAGES_WORKFLOW_PATH]
        .content
        .contains("actions/deploy-pages"));

    let payloads = evaluator.payloads();
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload["email"], "student@example.com");
    assert_eq!(payload["task"], "captcha-solver");
    assert_eq!(payload["round"], 1);
    assert_eq!(payload["nonce"], "ab12");
    assert_eq!(payload["repo_url"], format!("{WEB_URL}/{OWNER}/{REPO}"));
    assert_eq!(payload["pages_url"], format!("https://{OWNER}.github.io/{REPO}/"));
    // The callback reports the commit made by the workflow upsert, the last write.
    assert_eq!(payload["commit_sha"], repo.head().expect("head commit"));

    let prompts = gemini.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("solves the captcha image"));
    assert!(prompts[0].contains("README.md explains usage"));
    assert!(prompts[0].contains("sample.png"));
    assert_eq!(gemini.keys(), vec!["gemini-test-key".to_string()]);

    // The fake refuses a named branch while the repository is still empty.
    let puts = github.puts();
    assert!(puts.iter().all(|p| p.branch.is_none()));
    assert_eq!(puts[0].status, 201);
}

#[tokio::test]
async fn test_round_one_without_checks_or_attachments() {
    let github = FakeGitHub::start().await;
    let reply = model_reply(&[
        ("index.html", "<!doctype html><title>Bare</title>"),
        ("README.md", "# Bare"),
        ("LICENSE", "MIT License"),
    ]);
    let gemini = FakeGemini::start(vec![reply]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    let mut bare = request(Round::One, &evaluator.url);
    bare.checks.clear();
    bare.attachments.clear();
    let report = orchestrator.run(&bare).await;

    assert!(report.aborted.is_none(), "round aborted: {:?}", report.aborted);
    let pushed: Vec<&str> = report.pushes.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(pushed, vec!["index.html", "README.md", "LICENSE"]);
    assert_eq!(report.failed_pushes(), 0);
    assert!(report.delivered());

    let repo = github.repo(REPO).expect("repository should exist");
    for name in ["index.html", "README.md", "LICENSE"] {
        assert!(repo.files.contains_key(name), "missing {name}");
    }

    let prompts = gemini.prompts();
    assert_eq!(prompts.len(), 1);
    for name in REQUIRED_FILES {
        assert!(prompts[0].contains(name), "prompt does not name {name}");
    }
    assert!(!prompts[0].contains("sample.png"));
}

#[tokio::test]
async fn test_round_two_updates_files_with_their_own_shas() {
    let github = FakeGitHub::start().await;
    let revised = model_reply(&[
        (
            "index.html",
            "<!doctype html><title>Captcha Solver</title><button>Copy</button>",
        ),
        ("style.css", "#result { font-size: 2rem; }"),
    ]);
    let gemini = FakeGemini::start(vec![initial_app(), revised]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    let first = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;
    assert!(first.delivered());

    let before = github.repo(REPO).expect("repository should exist");
    let index_sha = before.files["index.html"].sha.clone();
    let head_before = before.head().expect("head commit").to_string();
    let puts_before = github.puts().len();

    let second = orchestrator
        .run(&request(Round::Two, &evaluator.url))
        .await;

    assert!(second.aborted.is_none(), "round aborted: {:?}", second.aborted);
    assert_eq!(second.failed_pushes(), 0);
    let outcomes: Vec<_> = second
        .pushes
        .iter()
        .map(|p| (p.path.as_str(), p.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("index.html", PushOutcome::Updated),
            ("style.css", PushOutcome::Created)
        ]
    );
    assert!(second.pages.is_none(), "round two must not re-publish");
    assert!(second.workflow.is_none());

    let puts = github.puts();
    let round_two_puts = &puts[puts_before..];
    assert_eq!(round_two_puts.len(), 2);
    assert_eq!(round_two_puts[0].path, "index.html");
    assert_eq!(round_two_puts[0].sha.as_deref(), Some(index_sha.as_str()));
    assert_ne!(round_two_puts[0].sha.as_deref(), Some(head_before.as_str()));
    assert_eq!(round_two_puts[1].path, "style.css");
    assert!(round_two_puts[1].sha.is_none());

    let after = github.repo(REPO).expect("repository should exist");
    assert!(after.files["index.html"].content.contains("<button>Copy</button>"));
    assert_eq!(after.files["index.html"].message, "Update index.html");
    assert_eq!(after.files["script.js"].content, "console.log('solving');");

    let prompts = gemini.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("larger font"));
    assert!(prompts[1].contains("FILE: index.html"));
    assert!(prompts[1].contains("<!doctype html><title>Captcha Solver</title>"));
    assert!(prompts[1].contains("console.log('solving');"));

    let payloads = evaluator.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1]["round"], 2);
    assert_eq!(payloads[1]["commit_sha"], after.head().expect("head commit"));
    assert_ne!(payloads[1]["commit_sha"], payloads[0]["commit_sha"]);
}

#[tokio::test]
async fn test_round_two_for_unknown_repository_stops_before_generation() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec![initial_app()]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    let report = orchestrator
        .run(&request(Round::Two, &evaluator.url))
        .await;

    let reason = report.aborted.expect("round should abort");
    assert!(reason.contains(REPO), "unexpected reason: {reason}");
    assert!(report.pushes.is_empty());
    assert!(report.notification.is_none());
    assert!(gemini.prompts().is_empty());
    assert_eq!(evaluator.attempts(), 0);
    assert!(github.puts().is_empty());
}

#[tokio::test]
async fn test_round_two_reply_without_files_still_calls_back() {
    let github = FakeGitHub::start().await;
    let gemini =
        FakeGemini::start(vec![initial_app(), "No changes needed.".to_string()]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;
    let puts_before = github.puts().len();

    let second = orchestrator
        .run(&request(Round::Two, &evaluator.url))
        .await;

    assert!(second.aborted.is_none(), "round aborted: {:?}", second.aborted);
    assert!(second.pushes.is_empty());
    assert!(second.delivered());
    assert_eq!(github.puts().len(), puts_before);

    let payloads = evaluator.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1]["round"], 2);
    // Nothing was written, so the head is unchanged.
    assert_eq!(payloads[1]["commit_sha"], payloads[0]["commit_sha"]);
}

#[tokio::test]
async fn test_round_two_model_error_still_calls_back() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec![initial_app()]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;
    let puts_before = github.puts().len();

    let second = orchestrator
        .run(&request(Round::Two, &evaluator.url))
        .await;

    assert!(second.aborted.is_none(), "round aborted: {:?}", second.aborted);
    assert!(second.pushes.is_empty());
    assert_eq!(gemini.prompts().len(), 2);
    assert_eq!(github.puts().len(), puts_before);

    let payloads = evaluator.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1]["round"], 2);
    assert_eq!(payloads[1]["repo_url"], format!("{WEB_URL}/{OWNER}/{REPO}"));
}

#[tokio::test]
async fn test_reply_without_files_ends_round_without_callback() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec!["I am unable to build that app.".to_string()]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    let report = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;

    assert!(report.aborted.is_some());
    assert!(report.pages.is_none());
    let repo = github.repo(REPO).expect("repository is created before generation");
    assert!(repo.files.is_empty());
    assert!(!repo.pages_enabled);
    assert_eq!(evaluator.attempts(), 0);
}

#[tokio::test]
async fn test_model_error_ends_round_without_callback() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(Vec::new()).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    let report = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;

    let reason = report.aborted.expect("round should abort");
    assert!(reason.contains("no scripted reply"), "unexpected reason: {reason}");
    assert_eq!(gemini.prompts().len(), 1);
    assert!(github.puts().is_empty());
    assert_eq!(evaluator.attempts(), 0);
}

#[tokio::test]
async fn test_callback_retries_until_delivered() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec![initial_app()]).await;
    let evaluator = FakeEvaluator::start(2).await;
    let orchestrator = orchestrator(&github, &gemini);

    let report = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;

    let notification = report.notification.expect("callback should be attempted");
    assert!(notification.delivered);
    assert_eq!(notification.attempts, 3);
    assert_eq!(notification.backoff, Duration::from_millis(10 + 20));
    assert_eq!(evaluator.attempts(), 3);
    assert_eq!(evaluator.payloads().len(), 1);
}

#[tokio::test]
async fn test_callback_gives_up_after_max_attempts() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec![initial_app()]).await;
    let evaluator = FakeEvaluator::start(100).await;
    let orchestrator = orchestrator(&github, &gemini);

    let report = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;

    let notification = report.notification.expect("callback should be attempted");
    assert!(!notification.delivered);
    assert_eq!(notification.attempts, 6);
    // 1 + 2 + 4 + 8 + 16 + 32 units of 10ms, the last failure included.
    assert_eq!(notification.backoff, Duration::from_millis(630));
    assert_eq!(evaluator.attempts(), 6);
    assert!(evaluator.payloads().is_empty());
    // Everything before the callback still happened.
    assert_eq!(report.failed_pushes(), 0);
    assert_eq!(report.pages, Some(PublishOutcome::Enabled));
}

#[tokio::test]
async fn test_repeated_round_one_reuses_existing_repository() {
    let github = FakeGitHub::start().await;
    let gemini = FakeGemini::start(vec![initial_app(), initial_app()]).await;
    let evaluator = FakeEvaluator::start(0).await;
    let orchestrator = orchestrator(&github, &gemini);

    orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;
    let again = orchestrator
        .run(&request(Round::One, &evaluator.url))
        .await;

    assert_eq!(github.create_calls(), 2);
    assert_eq!(github.repo_count(), 1);
    assert!(again.aborted.is_none());
    // Creation-round writes carry no SHA, so existing files are refused.
    assert_eq!(again.failed_pushes(), 4);
    assert_eq!(again.pages, Some(PublishOutcome::AlreadyEnabled));
    assert_eq!(again.workflow, Some(PushOutcome::Updated));
    assert!(again.delivered());
    assert_eq!(evaluator.payloads().len(), 2);
}
