mod config;
mod conversation;
mod error;
mod ledger;
mod probe;
mod provision;
mod report;
mod service;

use tracing::info;

use config::{ProbeConfig, API_KEY_VAR};
use ledger::ActivityLog;
use service::openai::OpenAiClient;
use service::TokioSleeper;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(config::log_level())
        .with_target(false)
        .init();

    let mut log = ActivityLog::new();
    log.note("main", "🚀 Starting OpenAI Assistant Test");
    let key_present = dotenv::var(API_KEY_VAR)
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    log.note(
        "main",
        format!("API Key present: {}", if key_present { "Yes" } else { "No" }),
    );

    let config = match ProbeConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            log.note("error", format!("❌ {}", e.to_string().to_uppercase()));
            return Ok(());
        }
    };

    let service = OpenAiClient::from_config(&config)?;
    info!(base_url = %config.base_url, model = %config.model, "Assistant client initialized");

    let summary = probe::run(&config, &service, &TokioSleeper, &mut log).await;

    // Resources removed by teardown have no ids worth handing off.
    if let (Some(provisioned), None) = (&summary.provisioned, &summary.teardown) {
        println!("\nTS_KNEE_ASSISTANT_ID={}", provisioned.assistant.id);
        println!("TS_KNEE_VECTOR_STORE_ID={}", provisioned.vector_store.id);
    }

    if let Some(path) = &summary.report_path {
        println!("\n📝 Detailed log saved to: {}", path.display());
    }
    if summary.succeeded() {
        println!("🎉 ASSISTANT SETUP AND TESTING COMPLETE!");
    }

    Ok(())
}
