use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use veska_automation::playbook::Playbook;
use veska_automation::runner::{PlaybookReport, PlaybookRunner};
use veska_core::error::{Result, VeskaError};
use veska_core::traits::{BrowserDriver, LlmClient, VisionClient};
use veska_core::types::{ChatMessage, ChatOptions};
use veska_dag::CtxHandle;
use veska_llm::parse_json_lenient;

/// Run a playbook inside a node, merging its artifacts into the run context.
/// A failed playbook fails the node.
pub(crate) async fn run_playbook(
    browser: Arc<dyn BrowserDriver>,
    playbook: &Playbook,
    ctx: &CtxHandle,
) -> Result<PlaybookReport> {
    let runner = PlaybookRunner::new(browser);
    let report = runner.run(playbook, ctx.cancel_token()).await?;

    for (key, value) in &report.artifacts {
        ctx.set_artifact(key.clone(), value.clone()).await;
    }
    ctx.set_artifact(
        format!("playbook:{}", report.playbook),
        serde_json::to_value(&report)?,
    )
    .await;

    if !report.succeeded {
        let reason = report
            .failure
            .clone()
            .unwrap_or_else(|| "playbook failed".to_string());
        return Err(VeskaError::NotFound(reason));
    }
    Ok(report)
}

/// One LLM call whose response must parse as `T` (strict, then first JSON
/// block, then one retry with a strict-JSON clarifier).
pub(crate) async fn llm_json<T: DeserializeOwned>(
    llm: &Arc<dyn LlmClient>,
    system_prompt: &str,
    user: &str,
) -> Result<T> {
    let options = ChatOptions::default();
    let response = llm
        .chat(
            vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user),
            ],
            &options,
        )
        .await?;

    match parse_json_lenient::<T>(&response) {
        Ok(value) => Ok(value),
        Err(_) => {
            debug!("response was not JSON, retrying with clarifier");
            let retry = llm
                .chat(
                    vec![
                        ChatMessage::system(system_prompt),
                        ChatMessage::user(user),
                        ChatMessage::assistant(response),
                        ChatMessage::user(
                            "Respond with strict JSON only. No prose, no code fences.",
                        ),
                    ],
                    &options,
                )
                .await?;
            parse_json_lenient::<T>(&retry)
        }
    }
}

/// Full-page screenshot of the current page, prompted through the vision
/// model. Used after a playbook leaves the browser on the surface of record.
pub(crate) async fn read_page(
    browser: &Arc<dyn BrowserDriver>,
    vision: &Arc<dyn VisionClient>,
    prompt: &str,
) -> Result<String> {
    let screenshot = browser.screenshot(None, true).await?;
    vision
        .analyze(&screenshot, prompt, &ChatOptions::default())
        .await
}

/// First http(s) URL mentioned in an utterance.
pub(crate) fn extract_url(utterance: &str) -> Option<String> {
    let re = regex::Regex::new(r"https?://\S+").ok()?;
    re.find(utterance).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_extraction() {
        assert_eq!(
            extract_url("open https://example.com/a?b=1 please"),
            Some("https://example.com/a?b=1".to_string())
        );
        assert_eq!(extract_url("no url here"), None);
    }
}
