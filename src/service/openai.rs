use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::types::{
    Assistant, AssistantSpec, FileBatch, FileObject, List, Run, Thread, ThreadMessage, VectorStore,
};
use super::AssistantService;
use crate::config::ProbeConfig;

const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client for the hosted Assistants (v2) API.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    fn get(&self, path: &str) -> RequestBuilder {
        debug!(path, "GET");
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        debug!(path, "POST");
        self.authorize(self.client.post(self.url(path)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        debug!(path, "DELETE");
        self.authorize(self.client.delete(self.url(path)))
    }

    /// Send a request and decode the JSON body, turning non-2xx replies into
    /// errors that carry the service's own message.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
                .unwrap_or(text);
            return Err(anyhow!("{} failed ({}): {}", what, status, detail));
        }

        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} JSON", what))
    }
}

#[async_trait]
impl AssistantService for OpenAiClient {
    async fn create_vector_store(&self, name: &str) -> Result<VectorStore> {
        let req = self.post("vector_stores").json(&json!({ "name": name }));
        self.send(req, "create vector store").await
    }

    async fn upload_file(&self, path: &Path) -> Result<FileObject> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.bin".to_string());

        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(file_name));
        let req = self.post("files").multipart(form);
        self.send(req, "upload file").await
    }

    async fn attach_file_batch(&self, vector_store_id: &str, file_ids: &[String]) -> Result<FileBatch> {
        let req = self
            .post(&format!("vector_stores/{}/file_batches", vector_store_id))
            .json(&json!({ "file_ids": file_ids }));
        let mut batch: FileBatch = self.send(req, "create file batch").await?;

        while !batch.is_terminal() {
            tokio::time::sleep(BATCH_POLL_INTERVAL).await;
            let req = self.get(&format!(
                "vector_stores/{}/file_batches/{}",
                vector_store_id, batch.id
            ));
            batch = self.send(req, "retrieve file batch").await?;
            debug!(
                batch_id = %batch.id,
                status = %batch.status,
                completed = batch.file_counts.completed,
                total = batch.file_counts.total,
                "file batch poll"
            );
        }

        Ok(batch)
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant> {
        let body = json!({
            "name": spec.name,
            "instructions": spec.instructions,
            "model": spec.model,
            "tools": [{ "type": "file_search" }],
            "tool_resources": {
                "file_search": { "vector_store_ids": [spec.vector_store_id] }
            },
        });
        let req = self.post("assistants").json(&body);
        self.send(req, "create assistant").await
    }

    async fn create_thread(&self) -> Result<Thread> {
        let req = self.post("threads").json(&json!({}));
        self.send(req, "create thread").await
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        let req = self
            .post(&format!("threads/{}/messages", thread_id))
            .json(&json!({ "role": "user", "content": content }));
        self.send(req, "post message").await
    }

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let req = self
            .post(&format!("threads/{}/runs", thread_id))
            .json(&json!({ "assistant_id": assistant_id }));
        self.send(req, "start run").await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let req = self.get(&format!("threads/{}/runs/{}", thread_id, run_id));
        self.send(req, "retrieve run").await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let req = self.get(&format!("threads/{}/messages", thread_id));
        let list: List<ThreadMessage> = self.send(req, "list messages").await?;
        Ok(list.data)
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<()> {
        let req = self.delete(&format!("assistants/{}", assistant_id));
        let _: serde_json::Value = self.send(req, "delete assistant").await?;
        Ok(())
    }

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<()> {
        let req = self.delete(&format!("vector_stores/{}", vector_store_id));
        let _: serde_json::Value = self.send(req, "delete vector store").await?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let req = self.delete(&format!("files/{}", file_id));
        let _: serde_json::Value = self.send(req, "delete file").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> OpenAiClient {
        let mut config = ProbeConfig::for_tests();
        config.base_url = base_url.to_string();
        OpenAiClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let c = client("https://api.openai.com/v1/");
        assert_eq!(
            c.url("/threads/t1/runs"),
            "https://api.openai.com/v1/threads/t1/runs"
        );
        assert_eq!(c.url("files"), "https://api.openai.com/v1/files");
    }
}
