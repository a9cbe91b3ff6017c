use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::conversation::QuestionOutcome;
use crate::ledger::ActivityLog;
use crate::provision::Provisioned;

pub fn report_file_name(at: DateTime<Local>) -> String {
    format!("assistant_test_log_{}.md", at.format("%Y%m%d_%H%M%S"))
}

/// Render the whole run as one markdown document.
pub fn render(
    generated_at: DateTime<Local>,
    provisioned: Option<&Provisioned>,
    outcomes: &[QuestionOutcome],
    log: &ActivityLog,
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, generated_at, provisioned, outcomes, log);
    out
}

fn write_report(
    out: &mut String,
    generated_at: DateTime<Local>,
    provisioned: Option<&Provisioned>,
    outcomes: &[QuestionOutcome],
    log: &ActivityLog,
) -> std::fmt::Result {
    writeln!(out, "# OpenAI Assistant Test Log")?;
    writeln!(out, "**Generated:** {}\n", generated_at.to_rfc3339())?;

    writeln!(out, "## Setup Summary")?;
    match provisioned {
        Some(p) => {
            writeln!(out, "- **Assistant ID:** `{}`", p.assistant.id)?;
            writeln!(out, "- **Vector Store ID:** `{}`", p.vector_store.id)?;
            writeln!(out, "- **Model:** {}", p.assistant.model)?;
            writeln!(out, "- **Files Uploaded:** {}\n", p.uploaded_files.len())?;

            writeln!(out, "### Uploaded Files")?;
            for file in &p.uploaded_files {
                writeln!(out, "- **{}**", file.filename)?;
                writeln!(out, "  - File ID: `{}`", file.file_id)?;
                writeln!(out, "  - Path: `{}`", file.path.display())?;
                writeln!(out, "  - Size: {} bytes\n", file.size_bytes)?;
            }
        }
        None => writeln!(out, "_Setup did not complete; see the activity log below._\n")?,
    }

    writeln!(out, "## Test Results\n")?;
    for outcome in outcomes {
        match outcome {
            QuestionOutcome::Answered(result) => {
                writeln!(out, "### Question {}", result.ordinal)?;
                writeln!(out, "**Q:** {}\n", result.question)?;
                writeln!(out, "**Response:**\n```\n{}\n```\n", result.response)?;
                writeln!(out, "**Citations ({}):**", result.citations.len())?;
                for citation in &result.citations {
                    writeln!(out, "- {}", citation.display())?;
                }
                writeln!(out)?;
            }
            QuestionOutcome::NoReply { ordinal, question } => {
                writeln!(out, "### Question {}", ordinal)?;
                writeln!(out, "**Q:** {}\n", question)?;
                writeln!(out, "**No reply:** the run completed without an assistant message\n")?;
            }
            QuestionOutcome::Failed {
                ordinal,
                question,
                error,
            } => {
                writeln!(out, "### Question {}", ordinal)?;
                writeln!(out, "**Q:** {}\n", question)?;
                writeln!(out, "**Failed:** {}\n", error)?;
            }
        }
    }

    writeln!(out, "## Detailed Activity Log\n")?;
    for entry in log.entries() {
        writeln!(
            out,
            "### {} - {}",
            entry.timestamp.to_rfc3339(),
            entry.category.to_uppercase()
        )?;
        writeln!(out, "{}", entry.message)?;
        if let Some(data) = &entry.data {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            writeln!(out, "```json\n{}\n```", pretty)?;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Write the report into `dir` and note it in the ledger.
pub async fn save(
    dir: &Path,
    provisioned: Option<&Provisioned>,
    outcomes: &[QuestionOutcome],
    log: &mut ActivityLog,
) -> Result<PathBuf> {
    let now = Local::now();
    let path = dir.join(report_file_name(now));
    let body = render(now, provisioned, outcomes, log);

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log.note(
        "log_saved",
        format!("📄 Detailed log saved to {}", path.display()),
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::citations::Citation;
    use crate::conversation::{QuestionResult, ResponseMeta};
    use crate::error::ProbeError;
    use crate::provision::UploadedFile;
    use crate::service::types::{Assistant, VectorStore};
    use chrono::TimeZone;
    use serde_json::json;

    fn provisioned() -> Provisioned {
        Provisioned {
            assistant: Assistant {
                id: "asst_1".to_string(),
                model: "gpt-4o".to_string(),
                name: None,
                tools: vec![],
                tool_resources: None,
            },
            vector_store: VectorStore {
                id: "vs_1".to_string(),
                name: None,
            },
            uploaded_files: vec![UploadedFile {
                filename: "brochure.pdf".to_string(),
                file_id: "file-1".to_string(),
                size_bytes: 2048,
                path: PathBuf::from("data/ts_knee/brochure.pdf"),
            }],
        }
    }

    fn answered() -> QuestionOutcome {
        QuestionOutcome::Answered(QuestionResult {
            ordinal: 1,
            question: "What retractors?".to_string(),
            response: "Hohmann[1].".to_string(),
            citations: vec![Citation {
                ordinal: 1,
                filename: "brochure.pdf".to_string(),
                page: "4".to_string(),
                paragraph: "1".to_string(),
                citation_text: "【4:1†brochure.pdf】".to_string(),
            }],
            metadata: ResponseMeta {
                message_id: "msg_1".to_string(),
                annotation_count: 1,
                created_at: 0,
            },
        })
    }

    #[test]
    fn test_file_name_uses_timestamp() {
        let at = Local.with_ymd_and_hms(2025, 6, 10, 14, 3, 9).unwrap();
        assert_eq!(report_file_name(at), "assistant_test_log_20250610_140309.md");
    }

    #[test]
    fn test_render_sections_in_order() {
        let mut log = ActivityLog::new();
        log.record("thread", "✅ Thread created", json!({"thread_id": "thread_1"}));
        let failed = QuestionOutcome::Failed {
            ordinal: 2,
            question: "Bump?".to_string(),
            error: ProbeError::RunCancelled {
                run_id: "run_2".to_string(),
            },
        };

        let md = render(Local::now(), Some(&provisioned()), &[answered(), failed], &log);

        let setup = md.find("## Setup Summary").unwrap();
        let results = md.find("## Test Results").unwrap();
        let activity = md.find("## Detailed Activity Log").unwrap();
        assert!(setup < results && results < activity);
        assert!(md.contains("- **Assistant ID:** `asst_1`"));
        assert!(md.contains("**Response:**\n```\nHohmann[1].\n```"));
        assert!(md.contains("- [1] brochure.pdf (Page 4, Paragraph 1)"));
        assert!(md.contains("**Failed:** assistant run run_2 was cancelled"));
        assert!(md.contains(" - THREAD\n✅ Thread created\n```json\n{\n  \"thread_id\": \"thread_1\"\n}\n```"));
    }

    #[test]
    fn test_render_without_setup() {
        let md = render(Local::now(), None, &[], &ActivityLog::new());
        assert!(md.contains("_Setup did not complete"));
        assert!(!md.contains("Assistant ID"));
    }

    #[tokio::test]
    async fn test_save_writes_file_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ActivityLog::new();
        log.note("main", "start");

        let path = save(dir.path(), Some(&provisioned()), &[answered()], &mut log)
            .await
            .unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# OpenAI Assistant Test Log"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("assistant_test_log_"));
        assert_eq!(log.entries().last().unwrap().category, "log_saved");
    }
}
