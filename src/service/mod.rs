pub mod openai;
pub mod types;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use types::{Assistant, AssistantSpec, FileBatch, FileObject, Run, Thread, ThreadMessage, VectorStore};

/// The hosted assistant service. Everything interesting happens remotely;
/// the probe only calls these and observes the results.
#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn create_vector_store(&self, name: &str) -> Result<VectorStore>;

    /// Upload a local document for assistant use.
    async fn upload_file(&self, path: &Path) -> Result<FileObject>;

    /// Attach files to a vector store as one batch and block until the batch
    /// leaves `in_progress`. No local deadline.
    async fn attach_file_batch(&self, vector_store_id: &str, file_ids: &[String]) -> Result<FileBatch>;

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant>;

    async fn create_thread(&self) -> Result<Thread>;

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage>;

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// All messages on the thread, most recent first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    async fn delete_assistant(&self, assistant_id: &str) -> Result<()>;

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<()>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

/// Suspension point of the run-poll loop, swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
