//! One streaming session against the bridge.
//!
//! Discover (or use the configured id), attach, subscribe, stream for
//! the configured duration, then suspend, detach and save.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use e4link_core::{E4Client, E4Device, E4Error};

use crate::config::E4Config;

// ── StreamingSession ─────────────────────────────────────────────

pub struct StreamingSession {
    config: E4Config,
    stop: Arc<Notify>,
}

impl StreamingSession {
    pub fn new(config: E4Config) -> Self {
        Self {
            config,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Handle that ends the streaming phase early (Ctrl-C).
    pub fn stop_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.stop)
    }

    /// Run the whole session.
    ///
    /// 1. Connects to the bridge and picks a device.
    /// 2. Attaches it and subscribes the configured streams.
    /// 3. Streams until the duration elapses or a stop is signalled.
    /// 4. Suspends, detaches and writes the readings.
    pub async fn run(&self) -> Result<(), E4Error> {
        let streams = self.config.streams()?;
        let timeout = self.config.command_timeout();

        let client =
            E4Client::connect(&self.config.connection_info(), self.config.client_options()).await?;
        let device_id = self.pick_device(&client).await?;
        let device = client.connect_device(&device_id, timeout).await?;

        for stream in streams {
            if let Err(e) = device.subscribe(stream, timeout).await {
                warn!(%stream, "subscribe failed: {e}");
            }
        }

        device.start_streaming().await?;
        info!(device = %device_id, duration = ?self.config.duration(), "streaming");
        tokio::select! {
            _ = tokio::time::sleep(self.config.duration()) => {}
            _ = self.stop.notified() => info!("stop requested"),
        }

        self.wind_down(&device).await;
        device.save_readings(&self.config.session.output)?;
        client.close().await;
        Ok(())
    }

    async fn pick_device(&self, client: &E4Client) -> Result<String, E4Error> {
        if !self.config.device.id.is_empty() {
            return Ok(self.config.device.id.clone());
        }
        let found = client.discover(self.config.list_settle()).await?;
        info!(?found, "devices discovered");
        found
            .into_iter()
            .next()
            .ok_or_else(|| E4Error::Other("no E4 device found on the bridge".into()))
    }

    /// Suspend and detach. Failures here still let the readings be saved.
    async fn wind_down(&self, device: &E4Device) {
        if let Err(e) = device.suspend_streaming().await {
            warn!("suspend failed: {e}");
        }
        if let Err(e) = device.disconnect(self.config.command_timeout()).await {
            warn!("disconnect failed: {e}");
        }

        let errors = device.errors();
        if !errors.is_empty() {
            warn!(
                total = errors.total(),
                last = errors.last_error.as_deref().unwrap_or_default(),
                "errors during session"
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Answers every command with success and emits a few GSR samples
    /// once streaming starts.
    async fn fake_bridge(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let reply = match tokens.as_slice() {
                ["device_list"] => "R device_list 1 | 9ff167 Empatica_E4\r\n".to_string(),
                ["device_connect", _] => "R device_connect OK\r\n".to_string(),
                ["device_subscribe", s, _] => format!("R device_subscribe {s} OK\r\n"),
                ["pause", "OFF"] => {
                    "R pause OFF\r\nE4_Gsr 1.0 0.4\r\nE4_Gsr 1.25 0.41\r\n".to_string()
                }
                ["pause", "ON"] => "R pause ON\r\n".to_string(),
                ["device_disconnect"] => "R device_disconnect OK\r\n".to_string(),
                _ => continue,
            };
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    fn config_for(port: u16, output: std::path::PathBuf) -> E4Config {
        let mut cfg = E4Config::default();
        cfg.bridge.port = port;
        cfg.session.duration_secs = 0.2;
        cfg.session.list_settle_ms = 100;
        cfg.session.streams = vec!["gsr".into(), "tag".into()];
        cfg.session.output = output;
        cfg
    }

    #[tokio::test]
    async fn full_session_writes_readings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let bridge = tokio::spawn(fake_bridge(listener));

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("readings.txt");
        let session = StreamingSession::new(config_for(port, output.clone()));

        tokio::time::timeout(std::time::Duration::from_secs(10), session.run())
            .await
            .expect("session hung")
            .unwrap();
        bridge.await.unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("# device 9ff167\n"));
        assert!(text.contains("# Gsr\n1,0.4\n1.25,0.41\n"));
    }

    #[tokio::test]
    async fn unknown_stream_name_fails_before_connecting() {
        let mut cfg = E4Config::default();
        cfg.session.streams = vec!["ecg".into()];
        let err = StreamingSession::new(cfg).run().await.unwrap_err();
        assert!(matches!(err, E4Error::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_bridge_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let session = StreamingSession::new(config_for(port, dir.path().join("r.txt")));
        assert!(matches!(
            session.run().await,
            Err(E4Error::ConnectFailure { .. })
        ));
    }
}
