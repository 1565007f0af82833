//! Caller-facing handle for the attached device.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::client::Shared;
use crate::device::{DeviceRecord, DeviceStatus};
use crate::error::E4Error;
use crate::error_log::ErrorLog;
use crate::message::Command;
use crate::persist;
use crate::state::PendingKey;
use crate::stream::StreamKind;
use crate::window::WindowRecord;

/// Commands and reads for one attached wristband.
///
/// Cheap to clone; every handle refers to the same record. Reads return
/// snapshots taken under the record's lock.
#[derive(Clone)]
pub struct E4Device {
    shared: Arc<Shared>,
    record: Arc<Mutex<DeviceRecord>>,
}

impl E4Device {
    pub(crate) fn new(shared: Arc<Shared>, record: Arc<Mutex<DeviceRecord>>) -> Self {
        Self { shared, record }
    }

    pub fn name(&self) -> String {
        self.record.lock().name().to_string()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Detach from the device and, once confirmed, stop the receive loop.
    pub async fn disconnect(&self, timeout: Duration) -> Result<(), E4Error> {
        self.shared
            .command_and_wait(Command::DeviceDisconnect, self.name(), timeout, |s| !s.connected)
            .await?;
        tracing::info!(device = %self.name(), "device disconnected");
        self.shared.close();
        Ok(())
    }

    /// Turn `stream` on and wait for the bridge to confirm.
    pub async fn subscribe(&self, stream: StreamKind, timeout: Duration) -> Result<(), E4Error> {
        self.set_subscription(stream, true, timeout).await
    }

    /// Turn `stream` off and wait for the bridge to confirm.
    pub async fn unsubscribe(&self, stream: StreamKind, timeout: Duration) -> Result<(), E4Error> {
        self.set_subscription(stream, false, timeout).await
    }

    async fn set_subscription(&self, stream: StreamKind, on: bool, timeout: Duration) -> Result<(), E4Error> {
        let key = PendingKey::Subscribe(stream);
        self.shared.pending.lock().track(key, on);

        let result = self
            .shared
            .command_and_wait(
                Command::DeviceSubscribe(stream, on),
                stream.to_string(),
                timeout,
                move |s| s.is_subscribed(stream) == on,
            )
            .await;
        if result.is_err() {
            // A late ack without an ON/OFF token must not flip the flag.
            self.shared.pending.lock().resolve(key);
        }
        result
    }

    /// Resume data flow (`pause OFF`). Does not wait for the ack.
    pub async fn start_streaming(&self) -> Result<(), E4Error> {
        self.shared.pending.lock().track(PendingKey::Pause, false);
        self.shared.sender.send(Command::Pause(false)).await
    }

    /// Suspend data flow (`pause ON`). Does not wait for the ack.
    pub async fn suspend_streaming(&self) -> Result<(), E4Error> {
        self.shared.pending.lock().track(PendingKey::Pause, true);
        self.shared.sender.send(Command::Pause(true)).await
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn status(&self) -> DeviceStatus {
        self.record.lock().status().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.record.lock().is_connected()
    }

    pub fn is_subscribed(&self, stream: StreamKind) -> bool {
        self.record.lock().status().is_subscribed(stream)
    }

    pub fn on_wrist(&self) -> bool {
        self.record.lock().on_wrist()
    }

    /// Full copy of the record: status, buffers and window history.
    pub fn snapshot(&self) -> DeviceRecord {
        self.record.lock().clone()
    }

    pub fn windows(&self) -> Vec<WindowRecord> {
        self.record.lock().windows().to_vec()
    }

    /// The connection's error log.
    pub fn errors(&self) -> ErrorLog {
        self.shared.errors.lock().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.errors.lock().last_error.clone()
    }

    /// Persist the readings: window history when windowing is
    /// configured, otherwise a text dump of every channel.
    pub fn save_readings(&self, path: &Path) -> Result<(), E4Error> {
        let snapshot = self.snapshot();
        if self.shared.options.windowing().is_some() {
            persist::save_windows(snapshot.windows(), path)
        } else {
            persist::save_channels(&snapshot, path)
        }
    }
}

impl std::fmt::Debug for E4Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("E4Device")
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}
