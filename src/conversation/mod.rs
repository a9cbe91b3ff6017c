pub mod citations;

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::error::ProbeError;
use crate::ledger::ActivityLog;
use crate::service::types::{Run, RunStatus, ThreadMessage};
use crate::service::{AssistantService, Sleeper};

use citations::{Citation, ReplacementMode, SourcesSummary};

/// Bounded polling: the budget is a number of polls, not a wall-clock
/// deadline, so sleep drift and request latency are not subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        u32::try_from(self.timeout.as_millis() / interval).unwrap_or(u32::MAX)
    }
}

/// What to do with the remaining questions once one of them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub message_id: String,
    pub annotation_count: usize,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub ordinal: usize,
    pub question: String,
    /// Response text with citation markers swapped for `[n]` footnotes.
    pub response: String,
    pub citations: Vec<Citation>,
    pub metadata: ResponseMeta,
}

#[derive(Debug)]
pub enum QuestionOutcome {
    Answered(QuestionResult),
    /// The run completed but posted no assistant text after the question.
    NoReply { ordinal: usize, question: String },
    Failed {
        ordinal: usize,
        question: String,
        error: ProbeError,
    },
}

impl QuestionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, QuestionOutcome::Failed { .. })
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, QuestionOutcome::Answered(_))
    }
}

/// Thread contents once a run has completed.
#[derive(Debug)]
pub struct Exchange {
    /// Id of the user message the run answered.
    pub question_id: String,
    /// Every message on the thread, most recent first.
    pub messages: Vec<ThreadMessage>,
}

impl Exchange {
    /// Messages posted after the question, most recent first.
    pub fn replies(&self) -> impl Iterator<Item = &ThreadMessage> + '_ {
        self.messages
            .iter()
            .take_while(move |m| m.id != self.question_id)
    }
}

/// One conversation thread against one assistant. Questions are asked
/// strictly one after another.
pub struct Conversation<'a> {
    service: &'a dyn AssistantService,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
    assistant_id: String,
    thread_id: String,
}

impl<'a> Conversation<'a> {
    pub async fn open(
        service: &'a dyn AssistantService,
        sleeper: &'a dyn Sleeper,
        policy: PollPolicy,
        assistant_id: &str,
        log: &mut ActivityLog,
    ) -> Result<Conversation<'a>, ProbeError> {
        let thread = match service.create_thread().await {
            Ok(t) => t,
            Err(e) => {
                log.note("error", format!("❌ Failed to create thread: {:#}", e));
                return Err(e.into());
            }
        };
        log.record("thread", "✅ Thread created", json!({ "thread_id": thread.id }));

        Ok(Self {
            service,
            sleeper,
            policy,
            assistant_id: assistant_id.to_string(),
            thread_id: thread.id,
        })
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Ask each question in turn and collect what came back.
    ///
    /// A failing question is recorded as `QuestionOutcome::Failed`. Under
    /// `FailurePolicy::Abort` nothing after it is asked.
    pub async fn ask_all(
        &self,
        questions: &[String],
        on_failure: FailurePolicy,
        mode: ReplacementMode,
        log: &mut ActivityLog,
    ) -> Vec<QuestionOutcome> {
        let mut outcomes = Vec::new();

        for (i, question) in questions.iter().enumerate() {
            let ordinal = i + 1;
            log.record(
                "question",
                format!("🎯 TESTING QUESTION {}", ordinal),
                json!({ "question": question }),
            );

            match self.ask(ordinal, question, mode, log).await {
                Ok(Some(result)) => outcomes.push(QuestionOutcome::Answered(result)),
                Ok(None) => outcomes.push(QuestionOutcome::NoReply {
                    ordinal,
                    question: question.clone(),
                }),
                Err(error) => {
                    outcomes.push(QuestionOutcome::Failed {
                        ordinal,
                        question: question.clone(),
                        error,
                    });
                    if on_failure == FailurePolicy::Abort {
                        let remaining = questions.len() - ordinal;
                        if remaining > 0 {
                            log.warn(
                                "question",
                                format!("⚠️  Aborting: {} question(s) not asked", remaining),
                                None,
                            );
                        }
                        break;
                    }
                    log.warn(
                        "question",
                        format!("⚠️  Question {} failed, continuing", ordinal),
                        None,
                    );
                }
            }
        }

        outcomes
    }

    /// Ask one question and shape the assistant's reply. `Ok(None)` means
    /// the run completed without posting a text reply after the question.
    pub async fn ask(
        &self,
        ordinal: usize,
        question: &str,
        mode: ReplacementMode,
        log: &mut ActivityLog,
    ) -> Result<Option<QuestionResult>, ProbeError> {
        let exchange = self.send(ordinal, question, log).await?;

        // Older replies on the shared thread belong to earlier questions.
        let Some((message, content)) = exchange
            .replies()
            .filter(|m| m.role == "assistant")
            .find_map(|m| m.first_text().map(|t| (m, t)))
        else {
            log.warn(
                "response_raw",
                format!("⚠️  No assistant reply for Question {}", ordinal),
                None,
            );
            return Ok(None);
        };

        log.record(
            "response_raw",
            format!("📝 Raw response for Question {}", ordinal),
            json!({
                "message_id": message.id,
                "content_length": content.value.chars().count(),
                "annotation_count": content.annotations.len(),
                "created_at": message.created_at,
            }),
        );

        log.note(
            "citations",
            format!(
                "🔍 Processing {} annotations for Question {}",
                content.annotations.len(),
                ordinal
            ),
        );
        let extraction = citations::extract(content, mode);
        for citation in &extraction.citations {
            log.record(
                "citation_detail",
                format!("📚 Citation {}", citation.display()),
                json!(citation),
            );
        }
        let summary = SourcesSummary::from_citations(&extraction.citations);
        log.record(
            "sources_summary",
            format!(
                "📊 Question {} used {} sources",
                ordinal, summary.total_citations
            ),
            json!(summary),
        );

        log.record(
            "response_final",
            format!("✅ Question {} completed", ordinal),
            json!({
                "response_length": extraction.text.chars().count(),
                "citation_count": extraction.citations.len(),
            }),
        );

        Ok(Some(QuestionResult {
            ordinal,
            question: question.to_string(),
            response: extraction.text,
            citations: extraction.citations,
            metadata: ResponseMeta {
                message_id: message.id.clone(),
                annotation_count: content.annotations.len(),
                created_at: message.created_at,
            },
        }))
    }

    /// Post the question, run the assistant, wait for the run and return the
    /// thread's messages (most recent first).
    pub async fn send(
        &self,
        ordinal: usize,
        question: &str,
        log: &mut ActivityLog,
    ) -> Result<Exchange, ProbeError> {
        log.record(
            "message",
            format!("📤 SENDING QUESTION {}", ordinal),
            json!({ "message": question, "thread_id": self.thread_id }),
        );

        let result = self.send_inner(question, log).await;
        if let Err(e) = &result {
            log.note("error", format!("ERROR IN SENDMESSAGE: {}", e));
        }
        result
    }

    async fn send_inner(
        &self,
        question: &str,
        log: &mut ActivityLog,
    ) -> Result<Exchange, ProbeError> {
        let message = self.service.post_message(&self.thread_id, question).await?;
        log.record(
            "message",
            "✅ User message added to thread",
            json!({ "message_id": message.id }),
        );

        let run = self
            .service
            .start_run(&self.thread_id, &self.assistant_id)
            .await?;
        log.record(
            "run",
            "🚀 Assistant run started",
            json!({
                "run_id": run.id,
                "status": run.status,
                "assistant_id": self.assistant_id,
            }),
        );

        let (run, attempts) = self.await_run(&run.id, log).await?;
        log.record(
            "run_complete",
            format!("✅ Run completed with status: {}", run.status),
            json!({
                "run_id": run.id,
                "status": run.status,
                "total_attempts": attempts,
                "usage": run.usage,
            }),
        );

        let messages = self.service.list_messages(&self.thread_id).await?;
        log.note(
            "messages",
            format!("📨 Retrieved {} messages from thread", messages.len()),
        );
        Ok(Exchange {
            question_id: message.id,
            messages,
        })
    }

    /// Poll the run until it reaches a terminal state or the poll budget runs
    /// out. Returns the completed run and the number of polls after the
    /// initial fetch.
    ///
    /// The budget is checked right after each poll is recorded, before that
    /// poll's status is looked at: a run still pending going into poll
    /// `max_attempts` times out whatever that poll returns.
    async fn await_run(&self, run_id: &str, log: &mut ActivityLog) -> Result<(Run, u32), ProbeError> {
        let max_attempts = self.policy.max_attempts();
        let mut run = self.service.retrieve_run(&self.thread_id, run_id).await?;
        let mut attempts = 0u32;

        while run.status.is_pending() {
            self.sleeper.sleep(self.policy.interval).await;
            run = self.service.retrieve_run(&self.thread_id, run_id).await?;
            attempts += 1;
            log.record(
                "run_status",
                format!("⏳ Run Status: {}", run.status),
                json!({
                    "attempt": attempts,
                    "max_attempts": max_attempts,
                    "run_id": run.id,
                }),
            );

            if attempts >= max_attempts {
                log.note("error", "❌ ASSISTANT RESPONSE TIMEOUT");
                return Err(ProbeError::RunTimeout {
                    run_id: run.id,
                    attempts,
                });
            }
        }

        match run.status {
            RunStatus::Completed => Ok((run, attempts)),
            RunStatus::Failed => {
                let message = run
                    .last_error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "UNKNOWN ERROR".to_string());
                log.record(
                    "error",
                    format!("❌ ASSISTANT RUN FAILED: {}", message),
                    json!({ "last_error": run.last_error }),
                );
                Err(ProbeError::RunFailed {
                    run_id: run.id,
                    message,
                })
            }
            RunStatus::Cancelled => {
                log.note("error", "❌ ASSISTANT RUN WAS CANCELLED");
                Err(ProbeError::RunCancelled { run_id: run.id })
            }
            other => {
                log.note(
                    "error",
                    format!("❌ ASSISTANT RUN STOPPED WITH STATUS: {}", other),
                );
                Err(ProbeError::UnexpectedRunStatus {
                    run_id: run.id,
                    status: other.to_string(),
                })
            }
        }
    }
}
