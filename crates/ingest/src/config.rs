use std::path::{Path, PathBuf};

use common::config::{ConfigError, ConfigFile, Environment};

/// One camera stream: worker name, listening port, and the core the worker
/// thread is pinned to.
#[derive(Debug, Clone)]
pub struct CameraStream {
    pub name: String,
    pub port: u16,
    pub core: usize,
}

/// Ingest server settings, read from a line-oriented `KEY=VALUE` file.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub environment: Environment,
    pub cameras: Vec<CameraStream>,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Upper bound for a single encoded frame on the wire.
    pub encoded_frame_buf_size: usize,
    pub frameset_shm_prefix: String,
    pub consumer_ready_sem: String,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file(&ConfigFile::load(path)?)
    }

    pub fn from_file(file: &ConfigFile) -> Result<Self, ConfigError> {
        let cameras = parse_cameras(file.require("CAMERAS")?)?;

        let frame_width: u32 = file.require_parse("FRAME_WIDTH")?;
        let frame_height: u32 = file.require_parse("FRAME_HEIGHT")?;
        let default_buf = (frame_width as usize * frame_height as usize) * 3 / 2;

        Ok(Self {
            environment: Environment::from_env(),
            cameras,
            frame_width,
            frame_height,
            encoded_frame_buf_size: file
                .get_parse("ENCODED_FRAME_BUF_SIZE")?
                .unwrap_or(default_buf),
            frameset_shm_prefix: file
                .get("FRAMESET_SHM_PREFIX")
                .unwrap_or("/dev/shm/frameset")
                .to_string(),
            consumer_ready_sem: file
                .get("CONSUMER_READY_SEM")
                .unwrap_or("/frameset_consumer_ready")
                .to_string(),
            log_file: file.get("LOG_FILE").map(PathBuf::from),
        })
    }

    /// Total bytes of one decoded planar YUV420 frame.
    pub fn frame_bytes(&self) -> usize {
        let luma = self.frame_width as usize * self.frame_height as usize;
        luma + luma / 2
    }
}

/// `CAMERAS` is a comma-separated list of `name:port:core` entries.
fn parse_cameras(value: &str) -> Result<Vec<CameraStream>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "CAMERAS",
        value: value.to_string(),
    };

    let mut cameras = Vec::new();
    for entry in value.split(',') {
        let mut fields = entry.trim().split(':');
        let name = fields.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        let port = fields
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let core = fields
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(invalid)?;
        if fields.next().is_some() {
            return Err(invalid());
        }

        cameras.push(CameraStream {
            name: name.to_string(),
            port,
            core,
        });
    }

    if cameras.is_empty() {
        return Err(invalid());
    }
    Ok(cameras)
}
