use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use common::config::{ConfigError, ConfigFile, Environment};

/// Camera-node settings, read from a line-oriented `KEY=VALUE` file.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub environment: Environment,
    pub server_addr: SocketAddr,
    pub recording_cpu: usize,
    pub dma_buffers: usize,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Frame interval bounds in nanoseconds; equal values fix the framerate.
    pub frame_duration_min: i64,
    pub frame_duration_max: i64,
    pub log_file: Option<PathBuf>,
}

impl CaptureConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file(&ConfigFile::load(path)?)
    }

    pub fn from_file(file: &ConfigFile) -> Result<Self, ConfigError> {
        let ip: IpAddr = file.require_parse("SERVER_IP")?;
        let port: u16 = file.require_parse("PORT")?;

        let dma_buffers: usize = file.require_parse("DMA_BUFFERS")?;
        if dma_buffers < 3 {
            return Err(ConfigError::InvalidValue {
                key: "DMA_BUFFERS",
                value: dma_buffers.to_string(),
            });
        }

        let frame_duration_min: i64 = file.require_parse("FRAME_DURATION_MIN")?;
        let frame_duration_max: i64 = file.require_parse("FRAME_DURATION_MAX")?;
        if frame_duration_min <= 0 || frame_duration_max < frame_duration_min {
            return Err(ConfigError::InvalidValue {
                key: "FRAME_DURATION_MAX",
                value: frame_duration_max.to_string(),
            });
        }

        Ok(Self {
            environment: Environment::from_env(),
            server_addr: SocketAddr::new(ip, port),
            recording_cpu: file.require_parse("RECORDING_CPU")?,
            dma_buffers,
            frame_width: file.require_parse("FRAME_WIDTH")?,
            frame_height: file.require_parse("FRAME_HEIGHT")?,
            frame_duration_min,
            frame_duration_max,
            log_file: file.get("LOG_FILE").map(PathBuf::from),
        })
    }

    /// Total bytes of one planar YUV420 frame.
    pub fn frame_bytes(&self) -> usize {
        let luma = self.frame_width as usize * self.frame_height as usize;
        luma + luma / 2
    }
}
