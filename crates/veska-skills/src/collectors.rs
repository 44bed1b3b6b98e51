use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

/// Output of one daily-ops sub-collector. Collectors never fail: problems
/// show up as an empty line list plus a note.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorOutput {
    pub name: &'static str,
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CollectorOutput {
    fn empty(name: &'static str, note: impl Into<String>) -> Self {
        Self {
            name,
            lines: Vec::new(),
            note: Some(note.into()),
        }
    }
}

/// Scan markdown and text notes for open TODO items.
pub fn scan_todos(notes_dir: &Path) -> CollectorOutput {
    if !notes_dir.is_dir() {
        return CollectorOutput::empty("todos", format!("notes dir missing: {}", notes_dir.display()));
    }

    let mut todos = Vec::new();
    collect_todo_files(notes_dir, &mut todos, 0);
    info!(count = todos.len(), "TODO scan complete");
    CollectorOutput {
        name: "todos",
        lines: todos,
        note: None,
    }
}

fn collect_todo_files(dir: &Path, todos: &mut Vec<String>, depth: usize) {
    if depth > 4 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_todo_files(&path, todos, depth + 1);
            continue;
        }
        let is_note = path
            .extension()
            .is_some_and(|e| e == "md" || e == "txt");
        if !is_note {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.to_uppercase().contains("TODO") || trimmed.starts_with("- [ ]") {
                todos.push(format!("{}: {}", file_name, trimmed));
            }
        }
    }
}

/// Last lines of the most recently modified log files.
pub fn tail_logs(log_dir: &Path, max_files: usize, tail_lines: usize) -> CollectorOutput {
    if !log_dir.is_dir() {
        return CollectorOutput::empty("logs", format!("log dir missing: {}", log_dir.display()));
    }

    let mut log_files: Vec<std::path::PathBuf> = std::fs::read_dir(log_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "log"))
        .collect();
    log_files.sort_by_key(|p| {
        std::fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });
    log_files.reverse();
    log_files.truncate(max_files);

    let mut events = Vec::new();
    for path in &log_files {
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(tail_lines);
        for line in &lines[start..] {
            events.push(format!("{}: {}", file_name, line));
        }
    }
    debug!(files = log_files.len(), lines = events.len(), "log tail complete");
    CollectorOutput {
        name: "logs",
        lines: events,
        note: None,
    }
}

/// Recent system events, recorded by other components as a plain event log.
pub fn system_events(events_file: &Path, max_lines: usize) -> CollectorOutput {
    let Ok(content) = std::fs::read_to_string(events_file) else {
        return CollectorOutput::empty(
            "system_events",
            format!("no events file at {}", events_file.display()),
        );
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    CollectorOutput {
        name: "system_events",
        lines: lines[start..].iter().map(|l| l.to_string()).collect(),
        note: None,
    }
}

/// Ask the cluster dashboard for node status. Unreachable dashboards yield
/// an empty output with a note, never an error.
pub async fn cluster_status(dashboard_url: &str) -> CollectorOutput {
    let url = format!("{}/api/dashboard", dashboard_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
    {
        Ok(client) => client,
        Err(e) => return CollectorOutput::empty("cluster", format!("http client: {}", e)),
    };

    let response = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            return CollectorOutput::empty("cluster", format!("dashboard returned {}", resp.status()))
        }
        Err(e) => return CollectorOutput::empty("cluster", format!("dashboard unreachable: {}", e)),
    };

    let body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(e) => return CollectorOutput::empty("cluster", format!("bad dashboard payload: {}", e)),
    };

    let nodes = body
        .get("nodes")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let available = nodes
        .iter()
        .filter(|n| {
            n.get("available")
                .and_then(|v| v.as_bool())
                .unwrap_or(true)
        })
        .count();

    CollectorOutput {
        name: "cluster",
        lines: vec![format!("{}/{} nodes available", available, nodes.len())],
        note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn todos_found_in_notes() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("week.md")).unwrap();
        writeln!(file, "# Week plan").unwrap();
        writeln!(file, "- [ ] ship the release").unwrap();
        writeln!(file, "TODO: rotate the backup key").unwrap();
        writeln!(file, "regular line").unwrap();

        let output = scan_todos(dir.path());
        assert_eq!(output.lines.len(), 2);
        assert!(output.note.is_none());
    }

    #[test]
    fn missing_dirs_note_instead_of_failing() {
        let output = scan_todos(Path::new("/nonexistent/veska-notes"));
        assert!(output.lines.is_empty());
        assert!(output.note.is_some());

        let output = tail_logs(Path::new("/nonexistent/veska-logs"), 5, 20);
        assert!(output.lines.is_empty());
        assert!(output.note.is_some());
    }

    #[test]
    fn log_tail_takes_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("veska.log")).unwrap();
        for i in 0..50 {
            writeln!(file, "line {}", i).unwrap();
        }

        let output = tail_logs(dir.path(), 5, 10);
        assert_eq!(output.lines.len(), 10);
        assert!(output.lines[0].ends_with("line 40"));
    }

    #[tokio::test]
    async fn unreachable_cluster_is_a_note() {
        let output = cluster_status("http://127.0.0.1:1").await;
        assert!(output.lines.is_empty());
        assert!(output.note.is_some());
    }
}
