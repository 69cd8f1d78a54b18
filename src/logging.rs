//! Optional log file sink for the tracing subscriber

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

const LOG_DIR_NAME: &str = "apiwatch";
const LOG_FILE_NAME: &str = "apiwatch.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_FILE: Lazy<Option<Arc<Mutex<File>>>> = Lazy::new(|| {
    let opened = dirs::data_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))
        .and_then(|dir| open_log_file_in(&dir.join(LOG_DIR_NAME)))
        .or_else(|_| open_log_file_in(&std::env::temp_dir()));

    match opened {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(err) => {
            eprintln!("apiwatch: log file unavailable: {}", err);
            None
        }
    }
});

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// Writer for the shared log file. The file is opened on the first write
/// made while file logging is enabled.
pub fn file_writer() -> LogFileWriter {
    LogFileWriter {
        target: LogTarget::Shared,
    }
}

/// Create `dir` if needed and open the log file in append mode
pub fn open_log_file_in(dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path_in(dir))
}

pub fn log_path_in(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE_NAME)
}

#[derive(Clone)]
enum LogTarget {
    Shared,
    File(Arc<Mutex<File>>),
}

impl LogTarget {
    fn file(&self) -> Option<&Arc<Mutex<File>>> {
        match self {
            LogTarget::Shared => LOG_FILE.as_ref(),
            LogTarget::File(file) => Some(file),
        }
    }
}

#[derive(Clone)]
pub struct LogFileWriter {
    target: LogTarget,
}

impl LogFileWriter {
    pub fn from_file(file: File) -> Self {
        Self {
            target: LogTarget::File(Arc::new(Mutex::new(file))),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileGuard {
            target: self.target.clone(),
        }
    }
}

pub struct LogFileGuard {
    target: LogTarget,
}

impl Write for LogFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !file_logging_enabled() {
            return Ok(buf.len());
        }
        let Some(file) = self.target.file() else {
            return Ok(buf.len());
        };

        match file.lock() {
            Ok(mut file) => file.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !file_logging_enabled() {
            return Ok(());
        }
        match self.target.file().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}

/// Serializes tests that flip the process-wide toggle
#[cfg(test)]
pub(crate) static TOGGLE_TEST_LOCK: Mutex<()> = Mutex::new(());
