use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::error::ProbeError;
use crate::ledger::ActivityLog;
use crate::service::types::{Assistant, AssistantSpec, VectorStore};
use crate::service::AssistantService;

/// A local document destined for the vector store.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub name: String,
    pub path: PathBuf,
}

/// The set of documents one assistant is built over.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub name: String,
    pub model: String,
    pub documents: Vec<DocumentSource>,
}

impl Portfolio {
    pub fn instructions(&self) -> String {
        format!(
            r#"YOU ARE AN EXPERT MEDICAL ASSISTANT SPECIALIZING IN {name}. USE YOUR KNOWLEDGE BASE TO ANSWER QUESTIONS ABOUT SURGICAL TECHNIQUES, PROTOCOLS, AND MEDICAL PROCEDURES. ALWAYS PROVIDE ACCURATE, DETAILED INFORMATION BASED ON THE UPLOADED DOCUMENTS.

You have access to:
1. TS Knee system documentation
2. User notes with specific surgical preferences and setups

RESPONSE GUIDELINES:
- Provide comprehensive, detailed answers about surgical techniques and procedures
- Answer questions thoroughly using information from both the technical documentation and user notes
- ONLY when referencing user-uploaded images from the notes: include the URL directly in your response
- Format for user images: "Dr. Costanzo uses specific retractors for total knee procedures: www.example.com/image.jpg"
- Do NOT add quotes, explanatory text, or markdown formatting around the URL
- Do NOT say "you can view" or "available here" - just include the URL directly after the description
- For all other responses, provide normal detailed medical information

When answering questions, search through BOTH the technical documentation AND the user notes to provide comprehensive answers."#,
            name = self.name
        )
    }
}

/// A document that made it to remote storage.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub file_id: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Everything provisioning created remotely.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub assistant: Assistant,
    pub vector_store: VectorStore,
    pub uploaded_files: Vec<UploadedFile>,
}

/// Build the vector store and the assistant bound to it.
///
/// Missing local documents are skipped with a warning. Any remote failure
/// aborts the whole step: no partial assistant is handed back.
pub async fn provision(
    service: &dyn AssistantService,
    portfolio: &Portfolio,
    log: &mut ActivityLog,
) -> Result<Provisioned, ProbeError> {
    log.note("setup", "🚀 STARTING ASSISTANT SETUP...");
    log.note("setup", format!("📁 SETTING UP {}...", portfolio.name));

    match provision_inner(service, portfolio, log).await {
        Ok(provisioned) => {
            log.note("setup", format!("✅ {} SETUP COMPLETE", portfolio.name));
            Ok(provisioned)
        }
        Err(e) => {
            log.note(
                "error",
                format!("❌ ERROR SETTING UP {}: {:#}", portfolio.name, e),
            );
            Err(ProbeError::Provisioning(e))
        }
    }
}

async fn provision_inner(
    service: &dyn AssistantService,
    portfolio: &Portfolio,
    log: &mut ActivityLog,
) -> Result<Provisioned> {
    log.note("vector_store", "📦 CREATING VECTOR STORE...");
    let vector_store = service
        .create_vector_store(&format!("{} Vector Store", portfolio.name))
        .await?;
    log.record(
        "vector_store",
        "✅ VECTOR STORE CREATED",
        json!({ "vector_store_id": vector_store.id }),
    );

    log.note("file_upload", "📄 UPLOADING FILES...");
    let mut uploaded_files = Vec::new();
    for doc in &portfolio.documents {
        let size_bytes = match tokio::fs::metadata(&doc.path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                log.warn(
                    "file_upload",
                    format!("⚠️  FILE NOT FOUND: {}", doc.name),
                    Some(json!({ "path": doc.path.display().to_string() })),
                );
                continue;
            }
        };

        let file = service.upload_file(&doc.path).await?;
        let size_mb = (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        log.record(
            "file_upload",
            format!("✅ UPLOADED: {}", doc.name),
            json!({ "file_id": file.id, "size_mb": size_mb }),
        );
        uploaded_files.push(UploadedFile {
            filename: doc.name.clone(),
            file_id: file.id,
            size_bytes,
            path: doc.path.clone(),
        });
    }

    if !uploaded_files.is_empty() {
        log.note("vector_store", "🔗 ADDING FILES TO VECTOR STORE...");
        let file_ids: Vec<String> = uploaded_files.iter().map(|f| f.file_id.clone()).collect();
        let batch = service.attach_file_batch(&vector_store.id, &file_ids).await?;
        log.record(
            "vector_store",
            "✅ FILES ADDED TO VECTOR STORE",
            json!({
                "total_files": batch.file_counts.total,
                "completed": batch.file_counts.completed,
                "failed": batch.file_counts.failed,
                "batch_status": batch.status,
            }),
        );
    }

    log.note("assistant", "🤖 CREATING ASSISTANT...");
    let spec = AssistantSpec {
        name: format!("{} Assistant", portfolio.name),
        instructions: portfolio.instructions(),
        model: portfolio.model.clone(),
        vector_store_id: vector_store.id.clone(),
    };
    let assistant = service.create_assistant(&spec).await?;
    log.record(
        "assistant",
        "✅ ASSISTANT CREATED",
        json!({
            "assistant_id": assistant.id,
            "model": assistant.model,
            "tools": assistant.tools.iter().map(|t| t.kind.as_str()).collect::<Vec<_>>(),
            "vector_store_ids": assistant.vector_store_ids(),
        }),
    );

    Ok(Provisioned {
        assistant,
        vector_store,
        uploaded_files,
    })
}
