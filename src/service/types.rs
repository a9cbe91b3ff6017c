use std::fmt;

use serde::{Deserialize, Serialize};

/// List envelope used by every collection endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A file stored on the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub cancelled: u32,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBatch {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub file_counts: FileCounts,
}

impl FileBatch {
    pub fn is_terminal(&self) -> bool {
        self.status != "in_progress"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSearchResources {
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResources {
    #[serde(default)]
    pub file_search: Option<FileSearchResources>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub tool_resources: Option<ToolResources>,
}

impl Assistant {
    pub fn vector_store_ids(&self) -> Vec<String> {
        self.tool_resources
            .as_ref()
            .and_then(|r| r.file_search.as_ref())
            .map(|fs| fs.vector_store_ids.clone())
            .unwrap_or_default()
    }
}

/// What to create: a file-search assistant bound to one vector store.
#[derive(Debug, Clone)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub vector_store_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCitation {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
}

/// A span of response text pointing back at a source passage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default)]
    pub start_index: Option<usize>,
    #[serde(default)]
    pub end_index: Option<usize>,
    #[serde(default)]
    pub file_citation: Option<FileCitation>,
}

impl Annotation {
    pub fn is_file_citation(&self) -> bool {
        self.kind == "file_citation" && self.file_citation.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// The first content part, if it is text.
    pub fn first_text(&self) -> Option<&TextContent> {
        match self.content.first()? {
            MessageContent::Text { text } => Some(text),
            MessageContent::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Statuses the poll loop waits through.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_content_decodes_text_and_skips_others() {
        let raw = r#"{
            "id": "msg_1",
            "role": "assistant",
            "created_at": 1718000000,
            "content": [
                {"type": "text", "text": {"value": "See 【4:1†brochure.pdf】", "annotations": [
                    {"type": "file_citation", "text": "【4:1†brochure.pdf】", "start_index": 4, "end_index": 22,
                     "file_citation": {"file_id": "file-abc"}}
                ]}},
                {"type": "image_file", "image_file": {"file_id": "file-img"}}
            ]
        }"#;
        let msg: ThreadMessage = serde_json::from_str(raw).unwrap();
        let text = msg.first_text().unwrap();
        assert_eq!(text.annotations.len(), 1);
        assert!(text.annotations[0].is_file_citation());
        assert!(matches!(msg.content[1], MessageContent::Unsupported));
    }

    #[test]
    fn test_run_status_vocabulary() {
        let run: Run = serde_json::from_str(r#"{"id": "run_1", "status": "in_progress"}"#).unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert!(run.status.is_pending());

        let run: Run = serde_json::from_str(r#"{"id": "run_1", "status": "something_new"}"#).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!RunStatus::Completed.is_pending());
        assert_eq!(RunStatus::RequiresAction.to_string(), "requires_action");
    }

    #[test]
    fn test_assistant_vector_store_ids() {
        let raw = r#"{"id": "asst_1", "model": "gpt-4o", "tools": [{"type": "file_search"}],
            "tool_resources": {"file_search": {"vector_store_ids": ["vs_1"]}}}"#;
        let assistant: Assistant = serde_json::from_str(raw).unwrap();
        assert_eq!(assistant.vector_store_ids(), vec!["vs_1".to_string()]);
        assert_eq!(assistant.tools[0].kind, "file_search");
    }
}
