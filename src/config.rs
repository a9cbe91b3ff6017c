use std::path::PathBuf;
use std::time::Duration;

use tracing::{warn, Level};

use crate::conversation::citations::ReplacementMode;
use crate::conversation::{FailurePolicy, PollPolicy};
use crate::error::ProbeError;
use crate::provision::{DocumentSource, Portfolio};

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_PORTFOLIO: &str = "TS KNEE WITH USER NOTES PORTFOLIO";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Documents indexed for the probe, as (display name, local path).
pub const DOCUMENTS: &[(&str, &str)] = &[
    (
        "TS_Knee_triathlon-TS-Brochure.pdf",
        "data/ts_knee/TS_Knee_triathlon-TS-Brochure.pdf",
    ),
    ("user_notes_test.pdf", "user_notes/user_notes_test.pdf"),
];

/// Questions asked, in order, on one shared thread.
pub const QUESTIONS: &[&str] = &[
    "What retractors does Dr. Costanzo use for a total knee?",
    "What is the lateral bump setup in wilmington?",
];

/// Everything the probe reads from the environment.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub portfolio_name: String,
    pub poll: PollPolicy,
    pub on_failure: FailurePolicy,
    pub replacement: ReplacementMode,
    pub teardown: bool,
    pub report_dir: PathBuf,
}

impl ProbeConfig {
    pub fn from_env() -> Result<Self, ProbeError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build from any key lookup. The credential is the only required value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProbeError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var(API_KEY_VAR).ok_or(ProbeError::MissingCredential(API_KEY_VAR))?;

        let timeout_ms = parse_number(&var, "RUN_TIMEOUT_MS", DEFAULT_TIMEOUT_MS);
        let interval_ms = parse_number(&var, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);

        let on_failure = match var("ON_QUESTION_FAILURE").as_deref().map(str::to_lowercase) {
            Some(v) if v == "continue" => FailurePolicy::Continue,
            Some(v) if v != "abort" => {
                warn!(value = %v, "ON_QUESTION_FAILURE not recognised, using abort");
                FailurePolicy::Abort
            }
            _ => FailurePolicy::Abort,
        };

        let replacement = match var("CITATION_REPLACEMENT").as_deref().map(str::to_lowercase) {
            Some(v) if v == "offset" => ReplacementMode::Offset,
            Some(v) if v != "first_match" => {
                warn!(value = %v, "CITATION_REPLACEMENT not recognised, using first_match");
                ReplacementMode::FirstMatch
            }
            _ => ReplacementMode::FirstMatch,
        };

        Ok(Self {
            api_key,
            base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var("ASSISTANT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            portfolio_name: var("PORTFOLIO_NAME").unwrap_or_else(|| DEFAULT_PORTFOLIO.to_string()),
            poll: PollPolicy {
                interval: Duration::from_millis(interval_ms),
                timeout: Duration::from_millis(timeout_ms),
            },
            on_failure,
            replacement,
            teardown: var("TEARDOWN")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            report_dir: var("REPORT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    /// The fixed portfolio: both documents, named after `portfolio_name`.
    pub fn portfolio(&self) -> Portfolio {
        Portfolio {
            name: self.portfolio_name.clone(),
            model: self.model.clone(),
            documents: DOCUMENTS
                .iter()
                .map(|(name, path)| DocumentSource {
                    name: name.to_string(),
                    path: PathBuf::from(path),
                })
                .collect(),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        QUESTIONS.iter().map(|q| q.to_string()).collect()
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::from_lookup(|key| (key == API_KEY_VAR).then(|| "sk-test".to_string()))
            .expect("credential present")
    }
}

/// Console verbosity. Read on its own because logging starts before the
/// rest of the configuration is validated.
pub fn log_level() -> Level {
    dotenv::var("LOG_LEVEL")
        .ok()
        .and_then(|v| v.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

fn parse_number(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match var(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default, "not a valid number, using default");
            default
        }),
    }
}
