//! mpv playback driver: one mpv child process per playback session.
//!
//! Each session spawns its own mpv with the track preloaded, paused and at
//! volume 0, then drives it over the JSON IPC socket.  Commands carry a
//! `request_id` and the reply with the matching id is awaited before the
//! next command goes out; unsolicited events on the socket are skipped.
//! Releasing the session kills the child, so the native playback resource
//! never outlives it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::music::{Player, PlayerBackend};
use gmbox_core::platform;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one [`MpvSession`] per track.
pub struct MpvBackend;

impl MpvBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpvBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerBackend for MpvBackend {
    type Handle = MpvSession;

    async fn open(&self, path: &Path) -> Result<MpvSession> {
        MpvSession::spawn(path).await
    }
}

/// A live mpv process plus its IPC socket halves.
pub struct MpvSession {
    child: Child,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    socket_path: PathBuf,
}

impl MpvSession {
    async fn spawn(path: &Path) -> Result<Self> {
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let socket_path = PathBuf::from(platform::mpv_socket_name(session_id));
        let _ = tokio::fs::remove_file(&socket_path).await;

        let binary = platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        info!("mpv: spawning player for {}", path.display());
        let mut child = tokio::process::Command::new(binary)
            .arg("--no-video")
            .arg("--quiet")
            // Ambience tracks repeat until stopped.
            .arg("--loop-file=inf")
            // Held back until play(); the fade-in starts from silence.
            .arg("--pause")
            .arg("--volume=0")
            .arg(platform::mpv_socket_arg(session_id))
            .arg(path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        // Wait for the IPC socket to appear.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            let _ = child.kill().await;
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        debug!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            child,
            reader: BufReader::new(read_half),
            writer: write_half,
            socket_path,
        })
    }

    /// Fire one command and await its reply.  Dispatch is strictly
    /// sequential, so replies can be matched in-line by request id.
    async fn send(&mut self, command: Value) -> Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');
        self.writer.write_all(raw.as_bytes()).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::time::timeout(IPC_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))??;
            if read == 0 {
                anyhow::bail!("mpv IPC connection closed");
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let val: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(err) => {
                    debug!("mpv: invalid json {:?}: {}", trimmed, err);
                    continue;
                }
            };
            if val.get("request_id").and_then(Value::as_u64) != Some(req_id) {
                // Unsolicited event (or a reply we stopped waiting for).
                debug!("mpv: skipping event {}", trimmed);
                continue;
            }
            if val["error"].as_str() == Some("success") {
                return Ok(val);
            }
            let err = val["error"].as_str().unwrap_or("unknown error");
            anyhow::bail!("mpv error: {}", err);
        }
    }
}

impl Player for MpvSession {
    async fn play(&mut self) -> Result<()> {
        self.send(json!(["set_property", "pause", false])).await?;
        Ok(())
    }

    async fn toggle_pause(&mut self) -> Result<()> {
        self.send(json!(["cycle", "pause"])).await?;
        Ok(())
    }

    async fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.send(json!(["set_property", "volume", volume.min(100)]))
            .await?;
        Ok(())
    }

    async fn get_volume(&mut self) -> Result<u8> {
        let resp = self.send(json!(["get_property", "volume"])).await?;
        let volume = resp["data"].as_f64().unwrap_or(0.0);
        Ok(volume.round().clamp(0.0, 100.0) as u8)
    }

    async fn stop(&mut self) -> Result<()> {
        // Best-effort clean quit; the kill below is what guarantees release.
        if let Err(err) = self.send(json!(["quit"])).await {
            debug!("mpv: quit command failed: {:#}", err);
        }
        if let Err(err) = self.child.kill().await {
            warn!("mpv: kill failed: {}", err);
        }
        let _ = tokio::fs::remove_file(&self.socket_path).await;
        Ok(())
    }
}

impl Drop for MpvSession {
    fn drop(&mut self) {
        // Covers exit paths that skip stop(); kill is idempotent.
        let _ = self.child.start_kill();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
