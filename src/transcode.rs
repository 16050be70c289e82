//! # Transcode Module
//!
//! Decoding arbitrary compressed audio into the pipeline's fixed PCM format
//! (48 kHz interleaved 16-bit stereo, little endian) through an external
//! process boundary. A transcode failure surfaces as an error from the
//! operation that requested it, never as a crash of the mixing loop.

use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context as TaskContext, Poll};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use crate::audio::source::PcmStream;
use crate::config::{Config, CHANNELS, SAMPLE_RATE};
use crate::sources::ByteStream;

/// Transcodificación externa a PCM crudo.
#[async_trait]
pub trait PcmTranscoder: Send + Sync {
    /// Decodifica un stream de audio comprimido a PCM s16le 48 kHz estéreo.
    async fn transcode(&self, input: ByteStream) -> Result<PcmStream>;
}

/// Transcodificador sobre un proceso ffmpeg por pareja de pipes.
pub struct FfmpegTranscoder {
    bin: String,
}

impl FfmpegTranscoder {
    pub fn new(config: &Config) -> Self {
        Self {
            bin: config.ffmpeg_bin.clone(),
        }
    }
}

#[async_trait]
impl PcmTranscoder for FfmpegTranscoder {
    async fn transcode(&self, mut input: ByteStream) -> Result<PcmStream> {
        let rate = SAMPLE_RATE.to_string();
        let channels = CHANNELS.to_string();

        let mut child = Command::new(&self.bin)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-ac",
                &channels,
                "-f",
                "s16le",
                "-ar",
                &rate,
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Error al lanzar ffmpeg")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg sin stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg sin stdout"))?;

        // Bombea la entrada comprimida hacia ffmpeg en segundo plano; un
        // pipe roto solo significa que el consumidor soltó la fuente
        tokio::spawn(async move {
            if let Err(e) = tokio::io::copy(&mut input, &mut stdin).await {
                debug!("Pipe hacia ffmpeg cerrado: {}", e);
            }
            let _ = stdin.shutdown().await;
        });

        Ok(Box::new(ProcessStream::new(child, stdout)))
    }
}

/// Stdout de un proceso hijo como stream de bytes.
///
/// Mantiene vivo el `Child` mientras alguien lee; al soltarse, el proceso se
/// mata (`kill_on_drop`) y sus recursos se liberan.
pub(crate) struct ProcessStream {
    _child: Child,
    stdout: ChildStdout,
}

impl ProcessStream {
    pub(crate) fn new(child: Child, stdout: ChildStdout) -> Self {
        Self {
            _child: child,
            stdout,
        }
    }
}

impl AsyncRead for ProcessStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}
