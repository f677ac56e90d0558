// Configuration types and parsing

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::error::{Error, Result};
use super::types::*;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub root_dir: PathBuf,
    pub min_chunk: usize,
    pub max_chunk: usize,
    pub pacing: Duration,
    pub control_settle: Duration,
    pub max_sessions: usize,
    pub backlog: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            root_dir: PathBuf::from("."),
            min_chunk: MIN_CHUNK_SIZE,
            max_chunk: MAX_CHUNK_SIZE,
            pacing: DEFAULT_PACING,
            control_settle: DEFAULT_CONTROL_SETTLE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_root_dir(mut self, dir: PathBuf) -> Self {
        self.root_dir = dir;
        self
    }

    pub fn with_chunk_bounds(mut self, min: usize, max: usize) -> Result<Self> {
        validate_chunk_bounds(min, max)?;
        self.min_chunk = min;
        self.max_chunk = max;
        Ok(self)
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_control_settle(mut self, settle: Duration) -> Self {
        self.control_settle = settle;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Result<Self> {
        if max_sessions == 0 {
            return Err(Error::Config(
                "max_sessions must be at least 1".to_string(),
            ));
        }
        self.max_sessions = max_sessions;
        Ok(self)
    }

    pub fn with_backlog(mut self, backlog: usize) -> Result<Self> {
        if backlog > MAX_BACKLOG {
            return Err(Error::Config(format!(
                "backlog must be at most {} (got {})",
                MAX_BACKLOG, backlog
            )));
        }
        self.backlog = backlog;
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub bind_addr: SocketAddr,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub playback_threshold: u64,
    pub control_timeout: Duration,
    pub chunk_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            output_dir: PathBuf::from("."),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            playback_threshold: DEFAULT_PLAYBACK_THRESHOLD,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Default::default()
        }
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_output_prefix(mut self, prefix: &str) -> Self {
        self.output_prefix = prefix.to_string();
        self
    }

    pub fn with_playback_threshold(mut self, threshold: u64) -> Self {
        self.playback_threshold = threshold;
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Result<Self> {
        validate_timeout("control_timeout", timeout)?;
        self.control_timeout = timeout;
        Ok(self)
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Result<Self> {
        validate_timeout("chunk_timeout", timeout)?;
        self.chunk_timeout = timeout;
        Ok(self)
    }

    /// Both waits must be non-zero; the fields are public so sessions recheck.
    pub fn validate(&self) -> Result<()> {
        validate_timeout("control_timeout", self.control_timeout)?;
        validate_timeout("chunk_timeout", self.chunk_timeout)
    }

    /// Local file a request for `filename` is written to.
    ///
    /// Only the final path component of the request is used, so a request for
    /// `videos/clip.mp4` lands in `output_dir/streaming_clip.mp4`.
    pub fn output_path_for(&self, filename: &str) -> PathBuf {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.replace(['/', '\\'], "_"));
        self.output_dir
            .join(format!("{}{}", self.output_prefix, base))
    }
}

fn validate_timeout(name: &str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::Config(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

fn validate_chunk_bounds(min: usize, max: usize) -> Result<()> {
    if min == 0 || min > max || max > MAX_DATAGRAM_SIZE {
        return Err(Error::Config(format!(
            "Chunk bounds must satisfy 1 <= min <= max <= {} (got {}..={})",
            MAX_DATAGRAM_SIZE, min, max
        )));
    }
    Ok(())
}

/// On-disk configuration. Every field is optional; durations are milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub server: Option<ServerSection>,
    pub client: Option<ClientSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub root_dir: Option<PathBuf>,
    pub min_chunk: Option<usize>,
    pub max_chunk: Option<usize>,
    pub pacing_ms: Option<u64>,
    pub control_settle_ms: Option<u64>,
    pub max_sessions: Option<usize>,
    pub backlog: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub server: Option<SocketAddr>,
    pub bind: Option<SocketAddr>,
    pub output_dir: Option<PathBuf>,
    pub output_prefix: Option<String>,
    pub playback_threshold: Option<u64>,
    pub control_timeout_ms: Option<u64>,
    pub chunk_timeout_ms: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();
        let Some(section) = &self.server else {
            return Ok(config);
        };

        if let Some(bind) = section.bind {
            config.bind_addr = bind;
        }
        if let Some(dir) = &section.root_dir {
            config.root_dir = dir.clone();
        }
        let min = section.min_chunk.unwrap_or(config.min_chunk);
        let max = section.max_chunk.unwrap_or(config.max_chunk);
        config = config.with_chunk_bounds(min, max)?;
        if let Some(ms) = section.pacing_ms {
            config.pacing = Duration::from_millis(ms);
        }
        if let Some(ms) = section.control_settle_ms {
            config.control_settle = Duration::from_millis(ms);
        }
        if let Some(n) = section.max_sessions {
            config = config.with_max_sessions(n)?;
        }
        if let Some(n) = section.backlog {
            config = config.with_backlog(n)?;
        }
        Ok(config)
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();
        let Some(section) = &self.client else {
            return Ok(config);
        };

        if let Some(addr) = section.server {
            config.server_addr = addr;
        }
        if let Some(addr) = section.bind {
            config.bind_addr = addr;
        }
        if let Some(dir) = &section.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(prefix) = &section.output_prefix {
            config.output_prefix = prefix.clone();
        }
        if let Some(threshold) = section.playback_threshold {
            config.playback_threshold = threshold;
        }
        if let Some(ms) = section.control_timeout_ms {
            config = config.with_control_timeout(Duration::from_millis(ms))?;
        }
        if let Some(ms) = section.chunk_timeout_ms {
            config = config.with_chunk_timeout(Duration::from_millis(ms))?;
        }
        Ok(config)
    }
}
