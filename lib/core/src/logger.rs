use anyhow::Result;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) const LOG_FILE_NAME: &str = "onramp-sdk.log";

/// Writes SDK log lines to `onramp-sdk.log` and forwards records to an optional app logger
pub(crate) struct SdkLogger {
    app_logger: Option<Box<dyn Log>>,
    log_file: Mutex<File>,
    path: PathBuf,
    level: LevelFilter,
}

impl SdkLogger {
    /// Opens (or creates) the log file inside `log_dir`
    ///
    /// # Arguments
    ///
    /// * `log_dir` - Directory of the log file, created when missing
    /// * `app_logger` - Optional application logger to forward records to
    pub(crate) fn new(log_dir: &str, app_logger: Option<Box<dyn Log>>) -> Result<Self> {
        let log_dir = Path::new(log_dir);
        if !log_dir.exists() {
            create_dir_all(log_dir)?;
        }

        let path = log_dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            app_logger,
            log_file: Mutex::new(file),
            path,
            level: LevelFilter::Debug,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Registers the logger globally. Fails when a global logger is already set.
    pub(crate) fn init(log_dir: &str, app_logger: Option<Box<dyn Log>>) -> Result<()> {
        let logger = Self::new(log_dir, app_logger)?;
        let level = logger.level;
        let path = logger.path().to_path_buf();
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        log::info!("Logging to {}", path.display());
        Ok(())
    }

    fn format_line(record: &Record) -> String {
        format!(
            "{} [{}] {}: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for SdkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = Self::format_line(record);
        if let Ok(mut file) = self.log_file.lock() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }

        if let Some(app_logger) = &self.app_logger {
            app_logger.log(record);
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.log_file.lock() {
            let _ = file.flush();
        }

        if let Some(app_logger) = &self.app_logger {
            app_logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingLogger(Arc<AtomicUsize>);

    impl Log for CountingLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, _: &Record) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn flush(&self) {}
    }

    fn record(level: Level, message: &str, f: impl FnOnce(&Record)) {
        f(&Record::builder()
            .level(level)
            .target("onramp_sdk::monitor")
            .args(format_args!("{message}"))
            .build());
    }

    #[test]
    fn test_writes_to_log_file_and_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        let forwarded = Arc::new(AtomicUsize::new(0));
        let logger = SdkLogger::new(
            nested.to_str().unwrap(),
            Some(Box::new(CountingLogger(forwarded.clone()))),
        )
        .unwrap();

        record(Level::Error, "Status check failed", |r| logger.log(r));
        logger.flush();

        assert_eq!(logger.path(), nested.join(LOG_FILE_NAME));
        let contents = std::fs::read_to_string(logger.path()).unwrap();
        assert!(contents.contains("[ERROR] onramp_sdk::monitor: Status check failed"));
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().to_str().unwrap();

        let first = SdkLogger::new(log_dir, None).unwrap();
        record(Level::Error, "first", |r| first.log(r));
        drop(first);
        let second = SdkLogger::new(log_dir, None).unwrap();
        record(Level::Error, "second", |r| second.log(r));

        let contents = std::fs::read_to_string(second.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_trace_records_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SdkLogger::new(dir.path().to_str().unwrap(), None).unwrap();

        record(Level::Trace, "noise", |r| logger.log(r));
        record(Level::Debug, "kept", |r| logger.log(r));

        let contents = std::fs::read_to_string(logger.path()).unwrap();
        assert!(!contents.contains("noise"));
        assert!(contents.contains("kept"));
    }
}
