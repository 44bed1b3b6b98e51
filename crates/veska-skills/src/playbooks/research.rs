use veska_automation::playbook::{OnFailure, Playbook, PlaybookStep};

/// Run a search, then open and capture the first `result_count` results,
/// returning to the result list between visits.
pub fn research_playbook(query: &str, result_count: usize) -> Playbook {
    let mut steps = vec![
        PlaybookStep::navigate("goto_google", "https://www.google.com")
            .with_wait_for("textarea[name='q']"),
        PlaybookStep::click("focus_search", "textarea[name='q']"),
        PlaybookStep::fill("type_query", "textarea[name='q']", query),
        PlaybookStep::evaluate(
            "submit",
            r#"document.querySelector('textarea[name="q"]').form.submit();"#,
        ),
        PlaybookStep::wait_selector("wait_results", "#search").with_wait_timeout_ms(15_000),
    ];

    for idx in 1..=result_count {
        steps.push(
            PlaybookStep::click(
                format!("open_result_{}", idx),
                format!("#search a:nth-of-type({})", idx),
            )
            .with_wait_for("body")
            .with_on_failure(OnFailure::Continue),
        );
        steps.push(
            PlaybookStep::screenshot(format!("capture_result_{}", idx), true)
                .with_on_failure(OnFailure::Continue),
        );
        steps.push(
            PlaybookStep::evaluate(format!("back_{}", idx), "window.history.back();")
                .with_wait_for("#search")
                .with_on_failure(OnFailure::Continue),
        );
    }

    Playbook::new(format!("research:{}", query), steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_results_produce_nine_visit_steps() {
        let playbook = research_playbook("rust async runtimes", 3);
        // 5 search steps plus open/capture/back per result
        assert_eq!(playbook.steps.len(), 5 + 9);
        assert!(playbook.steps.iter().any(|s| s.name == "capture_result_3"));
    }
}
