use super::Persist;
use crate::model::DbModelEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::{
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
};

#[derive(Serialize)]
struct BlockLine<'a> {
  block: u64,
  records: &'a [DbModelEvent],
}

/// Appends one JSON line per block to a file. Lines are encoded on the caller
/// and written on the blocking pool.
pub struct FileStore {
  path: PathBuf,
  writer: Arc<Mutex<BufWriter<File>>>,
}

impl FileStore {
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create output dir `{}`", parent.display()))?;
    }
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(path)
      .with_context(|| format!("failed to open output `{}`", path.display()))?;

    Ok(Self {
      path: path.to_path_buf(),
      writer: Arc::new(Mutex::new(BufWriter::new(file))),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl Persist for FileStore {
  async fn persist(&self, block: u64, records: &[DbModelEvent]) -> Result<()> {
    let mut line = serde_json::to_vec(&BlockLine { block, records })?;
    line.push(b'\n');

    let writer = self.writer.clone();
    let path = self.path.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
      let mut writer = writer
        .lock()
        .map_err(|_| anyhow::anyhow!("output `{}` lock poisoned", path.display()))?;
      writer.write_all(&line)?;
      writer.flush()?;
      Ok(())
    })
    .await
    .context("output writer task failed")?
  }
}
