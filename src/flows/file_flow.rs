use crate::stages::{self, StageContext};
use tokio_util::sync::CancellationToken;

/// File Flow (§4.F): the single File-Summarize stage. On success the file
/// reaches `generated`; on failure it retries up to max_retries, then
/// `permanently_failed`.
pub async fn run(ctx: &StageContext, file_id: i64, cancel: &CancellationToken) {
    let _ = stages::file_summarize(ctx, file_id, cancel).await;
}
