use anyhow::{anyhow, Result};
use log::LevelFilter;
use log4rs::{
  append::{
    console::ConsoleAppender,
    rolling_file::{
      policy::compound::{
        roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
      },
      RollingFileAppender,
    },
  },
  config::{Appender, Config, Root},
  encode::pattern::PatternEncoder,
};
use std::path::{Path, PathBuf};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l} {t} - {m}{n}";
const LOG_FILE_SIZE: u64 = 100 * 1024 * 1024;
const LOG_FILE_COUNT: u32 = 10;

fn rolling_file(log_dir: &Path) -> Result<RollingFileAppender> {
  let archive = log_dir.join("brc20-ledger.{}.log.gz");
  let roller = FixedWindowRoller::builder()
    .build(&archive.to_string_lossy(), LOG_FILE_COUNT)
    .map_err(|e| anyhow!("build log roller: {e}"))?;
  let policy = CompoundPolicy::new(
    Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
    Box::new(roller),
  );

  Ok(
    RollingFileAppender::builder()
      .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
      .build(log_dir.join("brc20-ledger.log"), Box::new(policy))?,
  )
}

/// Logs to the console, and to a size-rotated gzip-archived file when `log_dir` is set.
pub(crate) fn init(level: LevelFilter, log_dir: Option<PathBuf>) -> Result<()> {
  let console = ConsoleAppender::builder()
    .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
    .build();

  let mut builder =
    Config::builder().appender(Appender::builder().build("console", Box::new(console)));
  let mut root = Root::builder().appender("console");

  if let Some(log_dir) = log_dir {
    std::fs::create_dir_all(&log_dir)?;
    builder = builder.appender(Appender::builder().build("file", Box::new(rolling_file(&log_dir)?)));
    root = root.appender("file");
  }

  log4rs::init_config(builder.build(root.build(level))?)?;
  Ok(())
}
