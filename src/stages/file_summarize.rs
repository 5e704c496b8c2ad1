use super::{fail_file, StageContext, StageOutcome};
use crate::models::{FileStatus, PromptType};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct MemberDocument {
    document_type: Option<String>,
    summary: Option<String>,
    structured_data: serde_json::Value,
}

#[derive(Serialize)]
struct FileSummarizeRequest {
    tags: Vec<String>,
    members: Vec<MemberDocument>,
}

impl crate::llm::LlmRequest for FileSummarizeRequest {
    fn system_prompt(&self) -> &str {
        ""
    }
}

#[derive(Deserialize)]
struct FileSummarizeResult {
    summary: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// File-Summarize (§4.B.7): the single stage of the File Flow. `pending` or
/// `outdated` files both land here; which entry status matched decides the
/// in-progress status (`generating`/`regenerating`) and, on failure, the
/// retry predecessor.
pub async fn run(ctx: &StageContext, file_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    let (entry, in_progress) = match ctx.files.cas_status(file_id, FileStatus::Pending, FileStatus::Generating).await {
        Ok(true) => (FileStatus::Pending, FileStatus::Generating),
        Ok(false) => match ctx.files.cas_status(file_id, FileStatus::Outdated, FileStatus::Regenerating).await {
            Ok(true) => (FileStatus::Outdated, FileStatus::Regenerating),
            Ok(false) => return StageOutcome::Skipped,
            Err(e) => return fail_file(ctx, file_id, e, FileStatus::Outdated).await,
        },
        Err(e) => return fail_file(ctx, file_id, e, FileStatus::Pending).await,
    };

    let file = match ctx.files.get(file_id).await {
        Ok(f) => f,
        Err(e) => return fail_file(ctx, file_id, e, entry).await,
    };

    let member_ids = match ctx.files.member_document_ids(file_id).await {
        Ok(ids) => ids,
        Err(e) => return fail_file(ctx, file_id, e, entry).await,
    };

    let mut members = Vec::with_capacity(member_ids.len());
    for id in member_ids {
        match ctx.documents.get(id).await {
            Ok(d) => members.push(MemberDocument {
                document_type: d.document_type,
                summary: d.summary,
                structured_data: d.structured_data_value(),
            }),
            Err(e) => return fail_file(ctx, file_id, e, entry).await,
        }
    }

    let active_prompt = match ctx.prompts.require_active(PromptType::FileSummarizer, None).await {
        Ok(p) => p,
        Err(e) => return fail_file(ctx, file_id, e, entry).await,
    };

    let permit = match ctx.gate.acquire("file-gen", cancel).await {
        Ok(p) => p,
        Err(e) => return fail_file(ctx, file_id, e, entry).await,
    };

    let request = FileSummarizeRequest { tags: file.tags_vec(), members };
    let result: Result<FileSummarizeResult, _> = ctx.llm.invoke(&active_prompt.prompt_text, &request).await;
    drop(permit);

    let summary = match result {
        Ok(r) => r,
        Err(e) => return fail_file(ctx, file_id, e.into(), entry).await,
    };

    if let Err(e) = ctx.files.set_summary(file_id, &summary.summary, &summary.metadata).await {
        return fail_file(ctx, file_id, e, entry).await;
    }

    match ctx.files.cas_status(file_id, in_progress, FileStatus::Generated).await {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_file(ctx, file_id, e, entry).await,
    }
}
