//! Vision-action loop scenarios over a scripted browser and vision model.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::ScriptedBrowser;
use veska_automation::vision::{VisionAgent, VisionRunStatus};
use veska_core::VeskaError;
use veska_llm::mock::MockVision;

#[tokio::test]
async fn completes_after_three_actions_with_answer() {
    let browser = Arc::new(ScriptedBrowser::new());
    let vision = Arc::new(MockVision::new(vec![
        r#"{"kind": "navigate", "url": "https://stores.example.com/tinley-park", "rationale": "open the store page"}"#,
        r#"{"kind": "click", "target_description": "the contact link", "rationale": "open contact details"}"#,
        r#"{"kind": "complete", "rationale": "phone number is visible"}"#,
        "The phone number is 555-1212.",
    ]));

    let agent = VisionAgent::new(vision.clone(), browser.clone()).with_max_steps(10);
    let outcome = agent
        .execute(
            "Find the phone number of Target in Tinley Park",
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, VisionRunStatus::Complete);
    assert_eq!(outcome.answer.as_deref(), Some("The phone number is 555-1212."));
    assert_eq!(outcome.steps_taken, 3);
    assert_eq!(outcome.history.len(), 3);
    assert_eq!(outcome.screenshots.len(), 3);
    assert!(browser
        .calls()
        .iter()
        .any(|c| c == "navigate:https://stores.example.com/tinley-park"));
}

#[tokio::test]
async fn zero_step_budget_never_calls_the_model() {
    let browser = Arc::new(ScriptedBrowser::new());
    let vision = Arc::new(MockVision::new(vec![]));

    let agent = VisionAgent::new(vision.clone(), browser).with_max_steps(0);
    let outcome = agent
        .execute("anything", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, VisionRunStatus::Incomplete);
    assert_eq!(vision.call_count(), 0);
}

#[tokio::test]
async fn unparseable_responses_fail_the_step_but_not_the_run() {
    // Two junk responses exhaust the strict-JSON retry for step 1; the loop
    // then recovers and completes on step 2.
    let browser = Arc::new(ScriptedBrowser::new());
    let vision = Arc::new(MockVision::new(vec![
        "I would click something, probably.",
        "still not json",
        r#"{"kind": "complete", "rationale": "nothing to do"}"#,
        "NO_ANSWER",
    ]));

    let agent = VisionAgent::new(vision, browser).with_max_steps(5);
    let outcome = agent
        .execute("idle task", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, VisionRunStatus::Complete);
    assert_eq!(outcome.answer, None);
    assert_eq!(outcome.history.len(), 2);
    assert!(outcome.history[0].error.is_some());
}

#[tokio::test]
async fn refuses_non_http_starting_url() {
    let browser = Arc::new(ScriptedBrowser::new());
    let vision = Arc::new(MockVision::new(vec![]));

    let agent = VisionAgent::new(vision.clone(), browser).with_max_steps(5);
    let err = agent
        .execute("read a local file", Some("file:///etc/passwd"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VeskaError::Refused(_)));
    assert_eq!(vision.call_count(), 0);
}

#[tokio::test]
async fn refused_navigation_inside_loop_fails_the_run() {
    let browser = Arc::new(ScriptedBrowser::new());
    let vision = Arc::new(MockVision::new(vec![
        r#"{"kind": "navigate", "url": "file:///etc/passwd", "rationale": "open local file"}"#,
    ]));

    let agent = VisionAgent::new(vision, browser.clone()).with_max_steps(5);
    let outcome = agent
        .execute("read a local file", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, VisionRunStatus::Failed);
    assert!(outcome.reason.contains("not allowed"));
    assert!(browser.closed());
}

#[tokio::test]
async fn cancellation_exits_with_cancelled() {
    let browser = Arc::new(ScriptedBrowser::new());
    let vision = Arc::new(MockVision::new(vec![]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let agent = VisionAgent::new(vision, browser.clone()).with_max_steps(5);
    let err = agent
        .execute("anything", None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, VeskaError::Cancelled));
    assert!(browser.closed());
}
