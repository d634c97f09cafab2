use crate::model::DbModelEvent;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};

mod file;

pub use self::file::FileStore;

/// Batches queued ahead of the writer before `submit` starts waiting.
pub const SINK_CAPACITY: usize = 16;

/// Durable destination of the records produced for each block.
#[async_trait]
pub trait Persist: Send + Sync {
  async fn persist(&self, block: u64, records: &[DbModelEvent]) -> Result<()>;
}

struct BlockBatch {
  block: u64,
  records: Vec<DbModelEvent>,
}

/// Hands block batches to a single writer task so one chain's blocks reach the
/// store in submission order while the scanner moves on.
pub struct BlockWriter {
  chain: String,
  sender: mpsc::Sender<BlockBatch>,
  handle: JoinHandle<Result<()>>,
}

impl BlockWriter {
  pub fn spawn<P: Persist + 'static>(chain: &str, store: P) -> Self {
    let (sender, mut receiver) = mpsc::channel::<BlockBatch>(SINK_CAPACITY);
    let name = chain.to_string();

    let handle = tokio::spawn(async move {
      while let Some(batch) = receiver.recv().await {
        if let Err(e) = store.persist(batch.block, &batch.records).await {
          log::error!("chain[{name}] persist block[{}] err[{e}]", batch.block);
          return Err(e);
        }
        log::debug!(
          "chain[{name}] persisted block[{}] records[{}]",
          batch.block,
          batch.records.len()
        );
      }
      Ok(())
    });

    Self {
      chain: chain.to_string(),
      sender,
      handle,
    }
  }

  pub async fn submit(&self, block: u64, records: Vec<DbModelEvent>) -> Result<()> {
    self
      .sender
      .send(BlockBatch { block, records })
      .await
      .map_err(|_| anyhow!("chain[{}] sink writer stopped before block {block}", self.chain))
  }

  /// Waits until every submitted batch is written.
  pub async fn close(self) -> Result<()> {
    drop(self.sender);
    self.handle.await?
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Default, Clone)]
  pub(crate) struct MemoryStore {
    pub(crate) blocks: Arc<Mutex<Vec<u64>>>,
    pub(crate) fail_at: Option<u64>,
  }

  #[async_trait]
  impl Persist for MemoryStore {
    async fn persist(&self, block: u64, _records: &[DbModelEvent]) -> Result<()> {
      if self.fail_at == Some(block) {
        return Err(anyhow!("disk full"));
      }
      tokio::task::yield_now().await;
      self.blocks.lock().unwrap().push(block);
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_writer_keeps_submission_order() {
    let store = MemoryStore::default();
    let writer = BlockWriter::spawn("btc", store.clone());

    for block in 100..140 {
      writer.submit(block, Vec::new()).await.unwrap();
    }
    writer.close().await.unwrap();

    assert_eq!(
      *store.blocks.lock().unwrap(),
      (100..140).collect::<Vec<_>>()
    );
  }

  #[tokio::test]
  async fn test_writer_failure_is_reported() {
    let store = MemoryStore {
      fail_at: Some(101),
      ..Default::default()
    };
    let writer = BlockWriter::spawn("btc", store.clone());

    writer.submit(100, Vec::new()).await.unwrap();
    writer.submit(101, Vec::new()).await.unwrap();

    assert!(writer.close().await.is_err());
    assert_eq!(*store.blocks.lock().unwrap(), vec![100]);
  }
}
