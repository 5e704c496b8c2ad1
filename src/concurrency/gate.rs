use crate::error::PipelineError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Named counting semaphores, process-global, configured once at startup
/// (§4.C). `tokio::sync::Semaphore` already wakes waiters in arrival order,
/// which gives FIFO ordering among waiters without extra bookkeeping.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphores: Arc<HashMap<&'static str, Arc<Semaphore>>>,
}

/// Held while a permit is checked out; releases on drop, so a gate is never
/// left consumed by a panicking or cancelled caller.
pub struct GatePermit(#[allow(dead_code)] OwnedSemaphorePermit);

impl ConcurrencyGate {
    pub fn new(ocr: usize, llm: usize, file_gen: usize) -> Self {
        let mut semaphores = HashMap::new();
        semaphores.insert("ocr", Arc::new(Semaphore::new(ocr)));
        semaphores.insert("llm", Arc::new(Semaphore::new(llm)));
        semaphores.insert("file-gen", Arc::new(Semaphore::new(file_gen)));
        Self { semaphores: Arc::new(semaphores) }
    }

    /// Blocks until a permit is free for `name` or `cancel` fires. A
    /// cancelled waiter never consumes a permit (§4.C, §5 cancellation).
    pub async fn acquire(&self, name: &str, cancel: &CancellationToken) -> Result<GatePermit, PipelineError> {
        let semaphore = self
            .semaphores
            .get(name)
            .unwrap_or_else(|| panic!("unknown concurrency gate name: {name}"))
            .clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            permit = semaphore.acquire_owned() => {
                let permit = permit.map_err(|_| PipelineError::Cancelled)?;
                Ok(GatePermit(permit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_waiter_blocks_until_first_releases() {
        let gate = ConcurrencyGate::new(1, 1, 1);
        let cancel = CancellationToken::new();

        let first = gate.acquire("ocr", &cancel).await.unwrap();

        let gate2 = gate.clone();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move { gate2.acquire("ocr", &cancel2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_never_consumes_a_permit() {
        let gate = ConcurrencyGate::new(1, 1, 1);
        let cancel = CancellationToken::new();
        let _held = gate.acquire("ocr", &cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let waiter_cancel2 = waiter_cancel.clone();
        let gate2 = gate.clone();
        let handle = tokio::spawn(async move { gate2.acquire("ocr", &waiter_cancel2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter_cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
