//! Per-request telemetry lines.
//!
//! Each handled request appends one JSON object to `LOG_FILE`. The file is
//! rotated by size into `<path>.1 .. <path>.N`; the newest backup can be
//! gzip-compressed. Write errors are counted and logged, never surfaced.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

use crate::config::RotationConfig;

pub const SCHEMA_VERSION: u32 = 1;

pub struct RotatingWriter {
    path: PathBuf,
    file: File,
    rotation: RotationConfig,
}

impl RotatingWriter {
    pub fn open(path: impl AsRef<Path>, rotation: RotationConfig) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            rotation,
        })
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if let Some(limit) = self.rotation.max_bytes {
            if self.size().unwrap_or(0) >= limit {
                self.rotate()?;
            }
        }
        writeln!(self.file, "{}", line)
    }

    pub fn size(&self) -> Option<u64> {
        self.path.metadata().ok().map(|m| m.len())
    }

    fn backup(&self, idx: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", idx));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        let keep = self.rotation.keep;
        if keep > 0 {
            for idx in (1..keep).rev() {
                let from = self.backup(idx);
                if from.exists() {
                    fs::rename(&from, self.backup(idx + 1))?;
                }
                let from_gz = gz_path(&from);
                if from_gz.exists() {
                    fs::rename(&from_gz, gz_path(&self.backup(idx + 1)))?;
                }
            }
            fs::rename(&self.path, self.backup(1))?;
            if self.rotation.compress {
                compress_in_place(&self.backup(1))?;
            }
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.to_path_buf().into_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn compress_in_place(path: &Path) -> std::io::Result<()> {
    let data = fs::read(path)?;
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&data)?;
    fs::write(gz_path(path), gz.finish()?)?;
    fs::remove_file(path)
}

/// Fields of one request event.
pub struct RequestEvent<'a> {
    pub endpoint: &'a str,
    pub status: u16,
    pub success: bool,
    pub latency_ms: u64,
    pub error_kind: Option<&'a str>,
    pub audit: Option<&'a str>,
}

impl RequestEvent<'_> {
    pub fn to_json(&self) -> Value {
        json!({
            "schemaVersion": SCHEMA_VERSION,
            "ts": chrono::Utc::now().to_rfc3339(),
            "endpoint": self.endpoint,
            "status": self.status,
            "success": self.success,
            "latencyMs": self.latency_ms,
            "error": self.error_kind,
            "audit": self.audit,
        })
    }
}

#[derive(Clone)]
pub struct TelemetrySink {
    writer: Option<Arc<Mutex<RotatingWriter>>>,
    log_stdout: bool,
    lines_total: Arc<AtomicU64>,
    write_errors_total: Arc<AtomicU64>,
    file_size_bytes: Arc<AtomicU64>,
}

impl TelemetrySink {
    pub fn new(writer: Option<RotatingWriter>, log_stdout: bool) -> Self {
        Self {
            writer: writer.map(|w| Arc::new(Mutex::new(w))),
            log_stdout,
            lines_total: Arc::new(AtomicU64::new(0)),
            write_errors_total: Arc::new(AtomicU64::new(0)),
            file_size_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: &RequestEvent<'_>) {
        if let Some(writer) = &self.writer {
            let line = event.to_json().to_string();
            match writer.lock() {
                Ok(mut guard) => match guard.write_line(&line) {
                    Ok(()) => {
                        self.lines_total.fetch_add(1, Ordering::Relaxed);
                        if let Some(size) = guard.size() {
                            self.file_size_bytes.store(size, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        self.write_errors_total.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error=%e, "Failed to write telemetry line");
                    }
                },
                Err(_) => {
                    self.write_errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if self.log_stdout {
            tracing::info!(
                target: "telemetry",
                endpoint = event.endpoint,
                status = event.status,
                success = event.success,
                latencyMs = event.latency_ms,
                error = ?event.error_kind,
                audit = ?event.audit
            );
        }
    }

    pub fn lines_total(&self) -> u64 {
        self.lines_total.load(Ordering::Relaxed)
    }

    pub fn write_errors_total(&self) -> u64 {
        self.write_errors_total.load(Ordering::Relaxed)
    }

    pub fn file_size_bytes(&self) -> u64 {
        self.file_size_bytes.load(Ordering::Relaxed)
    }
}
