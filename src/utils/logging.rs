use crate::error::{PkiError, Result};
use chrono::Utc;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub trait Logger: Send + Sync {
    fn log(&mut self, message: &str);
    fn debug_log(&mut self, message: &str);
}

/// Append-only audit trail of a bootstrap run, opened once at startup.
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    file: File,
    debug: bool,
}

impl FileLogger {
    pub fn open(path: impl AsRef<Path>, debug: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::utils::fs::ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PkiError::storage(&path, "failed to open log file", e))?;

        Ok(Self { path, file, debug })
    }

    fn append(&mut self, level: &str, message: &str) {
        let stamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        if let Err(e) = writeln!(self.file, "{} {:<5} {}", stamp, level, message) {
            tracing::warn!(path = %self.path.display(), "dropping log line: {}", e);
        }
    }
}

impl Logger for FileLogger {
    fn log(&mut self, message: &str) {
        self.append("INFO", message);
    }

    fn debug_log(&mut self, message: &str) {
        if self.debug {
            self.append("DEBUG", message);
        }
    }
}

/// Forwards to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&mut self, message: &str) {
        tracing::info!("{}", message);
    }

    fn debug_log(&mut self, message: &str) {
        tracing::debug!("{}", message);
    }
}

// MultiLogger allows logging to multiple destinations
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn Logger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, logger: Box<dyn Logger>) -> Self {
        self.loggers.push(logger);
        self
    }
}

impl Logger for MultiLogger {
    fn log(&mut self, message: &str) {
        for logger in &mut self.loggers {
            logger.log(message);
        }
    }

    fn debug_log(&mut self, message: &str) {
        for logger in &mut self.loggers {
            logger.debug_log(message);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::Logger;
    use std::sync::{Arc, Mutex};

    /// Records messages so tests can assert on what a step reported.
    #[derive(Clone, Default)]
    pub struct MockLogger {
        pub logs: Arc<Mutex<Vec<String>>>,
    }

    impl MockLogger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.logs.lock().map(|l| l.clone()).unwrap_or_default()
        }
    }

    impl Logger for MockLogger {
        fn log(&mut self, message: &str) {
            if let Ok(mut logs) = self.logs.lock() {
                logs.push(message.to_string());
            }
        }

        fn debug_log(&mut self, message: &str) {
            if let Ok(mut logs) = self.logs.lock() {
                logs.push(format!("DEBUG: {}", message));
            }
        }
    }
}
