use std::path::PathBuf;

use serde_json::json;
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::conversation::{Conversation, QuestionOutcome};
use crate::ledger::ActivityLog;
use crate::provision::{self, Provisioned};
use crate::report;
use crate::service::{AssistantService, Sleeper};

/// What one probe run produced.
#[derive(Debug, Default)]
pub struct ProbeSummary {
    pub provisioned: Option<Provisioned>,
    pub outcomes: Vec<QuestionOutcome>,
    pub teardown: Option<TeardownCounts>,
    pub report_path: Option<PathBuf>,
}

impl ProbeSummary {
    /// True when setup went through and every question got an answer.
    pub fn succeeded(&self) -> bool {
        self.provisioned.is_some() && self.outcomes.iter().all(QuestionOutcome::is_answered)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TeardownCounts {
    pub assistants_deleted: u32,
    pub vector_stores_deleted: u32,
    pub files_deleted: u32,
    pub errors: Vec<String>,
}

/// Provision, ask every question, tear down if asked to, then write the
/// report.
///
/// Failures never escape: each is already in the ledger, and the report is
/// written whatever stage the run reached.
pub async fn run(
    config: &ProbeConfig,
    service: &dyn AssistantService,
    sleeper: &dyn Sleeper,
    log: &mut ActivityLog,
) -> ProbeSummary {
    let mut summary = ProbeSummary::default();

    match provision::provision(service, &config.portfolio(), log).await {
        Ok(provisioned) => {
            summary.outcomes = ask_questions(config, service, sleeper, &provisioned, log).await;
            if config.teardown {
                summary.teardown = Some(teardown(service, &provisioned, log).await);
            } else {
                log.record(
                    "completion",
                    "🔧 ENVIRONMENT VARIABLES TO ADD:",
                    json!({
                        "TS_KNEE_ASSISTANT_ID": provisioned.assistant.id,
                        "TS_KNEE_VECTOR_STORE_ID": provisioned.vector_store.id,
                    }),
                );
            }
            summary.provisioned = Some(provisioned);
        }
        Err(_) => {
            log.note("error", "❌ Failed to create assistant or vector store");
        }
    }

    match report::save(
        &config.report_dir,
        summary.provisioned.as_ref(),
        &summary.outcomes,
        log,
    )
    .await
    {
        Ok(path) => summary.report_path = Some(path),
        Err(e) => log.note("error", format!("❌ Failed to save detailed log: {:#}", e)),
    }

    summary
}

async fn ask_questions(
    config: &ProbeConfig,
    service: &dyn AssistantService,
    sleeper: &dyn Sleeper,
    provisioned: &Provisioned,
    log: &mut ActivityLog,
) -> Vec<QuestionOutcome> {
    let conversation = match Conversation::open(
        service,
        sleeper,
        config.poll,
        &provisioned.assistant.id,
        log,
    )
    .await
    {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let outcomes = conversation
        .ask_all(&config.questions(), config.on_failure, config.replacement, log)
        .await;

    let answered = outcomes.iter().filter(|o| o.is_answered()).count();
    log.record(
        "questions",
        format!("🏁 {} of {} questions answered", answered, config.questions().len()),
        json!({ "thread_id": conversation.thread_id() }),
    );
    outcomes
}

/// Delete everything provisioning created. Failures are collected, not raised.
pub async fn teardown(
    service: &dyn AssistantService,
    provisioned: &Provisioned,
    log: &mut ActivityLog,
) -> TeardownCounts {
    let mut counts = TeardownCounts::default();

    match service.delete_assistant(&provisioned.assistant.id).await {
        Ok(()) => counts.assistants_deleted += 1,
        Err(e) => counts.errors.push(format!(
            "Failed to delete assistant {}: {:#}",
            provisioned.assistant.id, e
        )),
    }

    match service.delete_vector_store(&provisioned.vector_store.id).await {
        Ok(()) => counts.vector_stores_deleted += 1,
        Err(e) => counts.errors.push(format!(
            "Failed to delete vector store {}: {:#}",
            provisioned.vector_store.id, e
        )),
    }

    for file in &provisioned.uploaded_files {
        match service.delete_file(&file.file_id).await {
            Ok(()) => counts.files_deleted += 1,
            Err(e) => counts
                .errors
                .push(format!("Failed to delete file {}: {:#}", file.file_id, e)),
        }
    }

    for error in &counts.errors {
        warn!("{}", error);
    }
    log.record(
        "teardown",
        "🧹 Remote resources cleaned up",
        json!({
            "assistants_deleted": counts.assistants_deleted,
            "vector_stores_deleted": counts.vector_stores_deleted,
            "files_deleted": counts.files_deleted,
            "errors": counts.errors,
        }),
    );
    info!(
        assistants = counts.assistants_deleted,
        vector_stores = counts.vector_stores_deleted,
        files = counts.files_deleted,
        "teardown complete"
    );
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::API_KEY_VAR;
    use crate::conversation::citations::ReplacementMode;
    use crate::conversation::FailurePolicy;
    use crate::service::fake::{assistant_reply, file_citation, RecordingSleeper, ScriptedService};
    use crate::service::types::RunStatus;

    fn config(report_dir: &std::path::Path) -> ProbeConfig {
        let dir = report_dir.display().to_string();
        ProbeConfig::from_lookup(move |key: &str| match key {
            k if k == API_KEY_VAR => Some("sk-test".to_string()),
            "REPORT_DIR" => Some(dir.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_two_questions_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let service = ScriptedService::new()
            .with_statuses(&[RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed])
            .with_reply(assistant_reply(
                "msg_1",
                "Dr. Costanzo uses Hohmann retractors【4:1†TS_Knee_triathlon-TS-Brochure.pdf】.",
                vec![file_citation("【4:1†TS_Knee_triathlon-TS-Brochure.pdf】", None)],
            ))
            .with_reply(assistant_reply(
                "msg_2",
                "The lateral bump sits under the hip【2:5†user_notes_test.pdf】【odd】.",
                vec![
                    file_citation("【2:5†user_notes_test.pdf】", None),
                    file_citation("【odd】", Some("user_notes_test.pdf")),
                ],
            ));
        let sleeper = RecordingSleeper::default();
        let mut log = ActivityLog::new();

        let summary = run(&config, &service, &sleeper, &mut log).await;

        // The fixed documents are not on disk here, so provisioning carries on without them.
        let provisioned = summary.provisioned.as_ref().unwrap();
        assert!(provisioned.uploaded_files.is_empty());
        assert_eq!(summary.outcomes.len(), 2);
        assert!(summary.succeeded());
        for outcome in &summary.outcomes {
            let QuestionOutcome::Answered(result) = outcome else {
                panic!("question failed: {outcome:?}");
            };
            assert!(!result.response.is_empty());
            assert!(result.citations.len() <= result.metadata.annotation_count);
        }
        let QuestionOutcome::Answered(second) = &summary.outcomes[1] else {
            unreachable!()
        };
        assert_eq!(second.response, "The lateral bump sits under the hip[1][2].");
        assert_eq!(second.citations[1].page, "unknown");

        let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
        assert!(report.contains("### Question 2"));
        assert!(report.contains("`asst_test`"));
        assert!(report.contains("- COMPLETION"));
        assert!(summary.teardown.is_none());
        assert_eq!(log.entries().last().unwrap().category, "log_saved");
        assert_eq!(service.count("create_thread"), 1);
        assert_eq!(sleeper.slept().len(), 2);
    }

    #[tokio::test]
    async fn test_provisioning_failure_skips_questions_but_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut service = ScriptedService::new();
        service.fail_assistant = true;
        let sleeper = RecordingSleeper::default();
        let mut log = ActivityLog::new();

        let summary = run(&config, &service, &sleeper, &mut log).await;

        assert!(summary.provisioned.is_none());
        assert!(!summary.succeeded());
        assert_eq!(service.count("create_thread"), 0);
        let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
        assert!(report.contains("Failed to create assistant or vector store"));
    }

    #[tokio::test]
    async fn test_abort_keeps_answers_gathered_before_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.on_failure = FailurePolicy::Abort;
        config.replacement = ReplacementMode::FirstMatch;
        let service = ScriptedService::new().with_statuses(&[RunStatus::Expired]);
        let sleeper = RecordingSleeper::default();
        let mut log = ActivityLog::new();

        let summary = run(&config, &service, &sleeper, &mut log).await;

        assert_eq!(summary.outcomes.len(), 1);
        assert!(!summary.succeeded());
        assert_eq!(service.count("post_message"), 1);
    }

    #[tokio::test]
    async fn test_teardown_result_reaches_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.teardown = true;
        let service = ScriptedService::new().with_reply(assistant_reply("msg_1", "One.", vec![]));
        let sleeper = RecordingSleeper::default();
        let mut log = ActivityLog::new();

        let summary = run(&config, &service, &sleeper, &mut log).await;

        let counts = summary.teardown.as_ref().unwrap();
        assert_eq!(counts.assistants_deleted, 1);
        assert_eq!(counts.vector_stores_deleted, 1);
        let calls = service.calls();
        let deleted = calls.iter().position(|c| c == "delete_assistant").unwrap();
        let last_list = calls.iter().rposition(|c| c == "list_messages").unwrap();
        assert!(deleted > last_list);

        let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
        assert!(report.contains("- TEARDOWN"));
        assert!(!report.contains("- COMPLETION"));
    }

    #[tokio::test]
    async fn test_question_without_reply_is_not_success() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let service = ScriptedService::new().with_reply(assistant_reply("msg_1", "One.", vec![]));
        let sleeper = RecordingSleeper::default();
        let mut log = ActivityLog::new();

        let summary = run(&config, &service, &sleeper, &mut log).await;

        assert_eq!(summary.outcomes.len(), 2);
        assert!(matches!(summary.outcomes[1], QuestionOutcome::NoReply { ordinal: 2, .. }));
        assert!(!summary.succeeded());
        let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
        assert!(report.contains("### Question 2"));
        assert!(report.contains("**No reply:**"));
    }

    #[tokio::test]
    async fn test_teardown_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("notes.pdf");
        std::fs::write(&p, b"notes").unwrap();
        let service = ScriptedService::new();
        let mut log = ActivityLog::new();
        let portfolio = crate::provision::Portfolio {
            name: "P".to_string(),
            model: "gpt-4o".to_string(),
            documents: vec![crate::provision::DocumentSource {
                name: "notes.pdf".to_string(),
                path: p,
            }],
        };
        let provisioned = provision::provision(&service, &portfolio, &mut log).await.unwrap();

        let counts = teardown(&service, &provisioned, &mut log).await;

        assert_eq!(counts.assistants_deleted, 1);
        assert_eq!(counts.vector_stores_deleted, 1);
        assert_eq!(counts.files_deleted, 0);
        assert_eq!(counts.errors.len(), 1);
        assert!(counts.errors[0].contains("file-1"));
    }
}
