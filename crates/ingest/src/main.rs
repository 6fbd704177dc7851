use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

use anyhow::Context as _;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use common::setup_logging;
use ingest::config::ServerConfig;
use ingest::sink::{FrameSink, FramesetWriter};
use ingest::worker::{self, DecoderFactory, StreamLimits, WorkerConfig};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("server.conf"));
    let config = ServerConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    setup_logging(&config.environment, config.log_file.as_deref())
        .context("Failed to initialize logging")?;
    tracing::info!(cameras = config.cameras.len(), "Ingest server starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    let mut workers = Vec::with_capacity(config.cameras.len());
    for camera in &config.cameras {
        let worker_cfg = WorkerConfig {
            name: camera.name.clone(),
            port: camera.port,
            core: camera.core,
            limits: StreamLimits {
                max_frame_size: config.encoded_frame_buf_size,
                frame_bytes: config.frame_bytes(),
            },
        };

        let sink: Box<dyn FrameSink> = Box::new(
            FramesetWriter::create(
                format!("{}_{}", config.frameset_shm_prefix, camera.name),
                config.frame_bytes(),
                &config.consumer_ready_sem,
            )
            .with_context(|| format!("Failed to create frameset sink for {}", camera.name))?,
        );

        let factory = decoder_factory(&config)?;
        let shutdown = Arc::clone(&shutdown);
        let name = camera.name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker::run_worker(worker_cfg, factory, sink, shutdown))
            .with_context(|| format!("Failed to spawn worker for {name}"))?;
        workers.push((name, handle));
    }

    let mut failed = false;
    for (name, handle) in workers {
        match handle.join() {
            Ok(Ok(())) => tracing::info!(camera = %name, "Worker finished"),
            Ok(Err(err)) => {
                failed = true;
                tracing::error!(camera = %name, error = %err, "Worker failed");
            }
            Err(_) => {
                failed = true;
                tracing::error!(camera = %name, "Worker panicked");
            }
        }
    }

    if failed {
        anyhow::bail!("One or more workers failed");
    }
    tracing::info!("Ingest server stopped");
    Ok(())
}

#[cfg(feature = "ffmpeg")]
fn decoder_factory(config: &ServerConfig) -> anyhow::Result<DecoderFactory> {
    let (width, height) = (config.frame_width, config.frame_height);
    Ok(Box::new(move || {
        ingest::decoder::H264Decoder::new(width, height)
            .map(|decoder| Box::new(decoder) as Box<dyn ingest::decoder::VideoDecoder>)
    }))
}

#[cfg(not(feature = "ffmpeg"))]
fn decoder_factory(_config: &ServerConfig) -> anyhow::Result<DecoderFactory> {
    anyhow::bail!("Built without a decoder backend; rebuild with --features ffmpeg")
}
