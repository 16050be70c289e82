use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::sources::{ByteStream, MediaResolver, ResolvedMedia};
use crate::transcode::ProcessStream;

/// Resolver de medios sobre yt-dlp con streaming directo por stdout.
pub struct YtDlpResolver {
    bin: String,
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            bin: config.ytdlp_bin.clone(),
        }
    }

    /// Verifica que yt-dlp esté disponible.
    pub async fn verify_dependencies(&self) -> Result<()> {
        let output = Command::new(&self.bin)
            .arg("--version")
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp no disponible");
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("✅ yt-dlp versión: {}", version.trim());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn search(&self, query: &str) -> Result<ResolvedMedia> {
        info!("🔍 Buscando: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let output = Command::new(&self.bin)
            .args([
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Sin resultados para: {}", query))?;

        let info: YtDlpInfo =
            serde_json::from_str(line).context("Error al parsear respuesta de yt-dlp")?;

        let url = info
            .webpage_url
            .or(info.url)
            .ok_or_else(|| anyhow::anyhow!("Resultado sin URL para: {}", query))?;

        Ok(ResolvedMedia {
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            url,
            duration: info.duration.map(Duration::from_secs_f64),
        })
    }

    async fn open_audio(&self, url: &str) -> Result<ByteStream> {
        debug!("🎵 Abriendo stream de audio: {}", url);

        let mut child = Command::new(&self.bin)
            .args([
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                "--quiet",
                "-o",
                "-",
                url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Error al lanzar yt-dlp")?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp sin stdout"))?;

        Ok(Box::new(ProcessStream::new(child, stdout)))
    }
}
