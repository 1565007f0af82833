//! Client coordinator and caller-facing command facade.
//!
//! [`E4Client`] owns the bridge connection and its background receive
//! loop. Commands are fire-then-await: the command is sent and the
//! caller awaits a `watch` on the acknowledgement-driven
//! [`DeviceStatus`] until the expected value appears or the timeout
//! elapses. There are no protocol request ids, so at most one command
//! of a given type may be outstanding at a time.

mod device;
mod receiver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::{DEFAULT_WRIST_SENSITIVITY, DeviceRecord, DeviceStatus};
use crate::error::E4Error;
use crate::error_log::{ErrorCategory, ErrorLog};
use crate::message::Command;
use crate::network::{Connection, ConnectionInfo, ConnectionSender};
use crate::state::{LinkPhase, PendingRequests};
use crate::window::{WindowSchedule, spawn_window_task, window_period};

pub use device::E4Device;

// ── ClientOptions ────────────────────────────────────────────────

/// Constructor parameters for [`E4Client`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Trailing zero GSR samples that mark the device off wrist.
    pub wrist_sensitivity: usize,
    /// Window length in seconds; `None` disables windowing.
    pub window_secs: Option<f64>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            wrist_sensitivity: DEFAULT_WRIST_SENSITIVITY,
            window_secs: None,
        }
    }
}

impl ClientOptions {
    /// Effective window period. `None` when unset or outside
    /// `MIN_WINDOW_SECS..=MAX_WINDOW_SECS`.
    pub fn windowing(&self) -> Option<Duration> {
        self.window_secs.and_then(window_period)
    }
}

// ── Shared ───────────────────────────────────────────────────────

/// State shared between the receive loop, window task and callers.
///
/// Locks are short and never held across an `.await`.
pub(crate) struct Shared {
    options: ClientOptions,
    sender: ConnectionSender,
    cancel: CancellationToken,
    closed_locally: AtomicBool,

    phase: Mutex<LinkPhase>,
    discovered: Mutex<Vec<String>>,
    device: Mutex<Option<Arc<Mutex<DeviceRecord>>>>,
    status: watch::Sender<DeviceStatus>,
    pending: Mutex<PendingRequests>,
    errors: Mutex<ErrorLog>,
    window_task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn device(&self) -> Option<Arc<Mutex<DeviceRecord>>> {
        self.device.lock().clone()
    }

    /// Append to the error log and emit a warning.
    pub(crate) fn record(&self, category: ErrorCategory, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%category, "{message}");
        self.errors.lock().record(category, message);
    }

    /// Mutate the attached device's status and publish the result.
    ///
    /// No-op when no device is attached.
    pub(crate) fn update_status(&self, f: impl FnOnce(&mut DeviceStatus)) {
        let Some(device) = self.device() else {
            tracing::debug!("status update with no device attached");
            return;
        };
        let snapshot = {
            let mut dev = device.lock();
            f(dev.status_mut());
            dev.status().clone()
        };
        self.status.send_replace(snapshot);
    }

    /// Start the window task for the attached device, if configured.
    pub(crate) fn arm_window(&self) {
        let Some(device) = self.device() else {
            return;
        };
        let Some(period) = self.options.windowing() else {
            if let Some(secs) = self.options.window_secs {
                tracing::warn!(window_secs = secs, "window size out of range, windowing disabled");
            }
            return;
        };
        let secs = period.as_secs_f64();
        let schedule = WindowSchedule::aligned(period);
        let handle = spawn_window_task(
            device,
            self.status.subscribe(),
            secs,
            schedule,
            self.cancel.child_token(),
        );
        if let Some(previous) = self.window_task.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(window_secs = secs, first_tick = ?schedule.first_tick, "window task armed");
    }

    /// Send `command` and wait until `done` holds for the device status.
    pub(crate) async fn command_and_wait(
        &self,
        command: Command,
        target: String,
        timeout: Duration,
        done: impl Fn(&DeviceStatus) -> bool,
    ) -> Result<(), E4Error> {
        let name = command.name();
        let mut status = self.status.subscribe();
        self.sender.send(command).await?;

        let outcome = tokio::time::timeout(timeout, status.wait_for(|s| done(s)))
            .await
            .map(|r| r.is_ok());
        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(E4Error::ConnectionLost),
            Err(_) => {
                tracing::warn!(command = name, %target, ?timeout, "acknowledgement timed out");
                Err(E4Error::CommandTimeout {
                    command: name,
                    target,
                    timeout,
                })
            }
        }
    }

    /// Close the connection. The receive loop exits on its own.
    pub(crate) fn close(&self) {
        self.closed_locally.store(true, Ordering::SeqCst);
        self.sender.close();
    }
}

// ── E4Client ─────────────────────────────────────────────────────

/// A connection to the bridge plus its background receive loop.
pub struct E4Client {
    shared: Arc<Shared>,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl E4Client {
    /// Connect to the bridge and start the receive loop.
    pub async fn connect(info: &ConnectionInfo, options: ClientOptions) -> Result<Self, E4Error> {
        let conn = Connection::open(info).await?;
        tracing::info!(bridge = %info, "connected to bridge");
        Ok(Self::with_connection(conn, options))
    }

    /// Wrap an already-open connection.
    pub fn with_connection(conn: Connection, options: ClientOptions) -> Self {
        let (status, _) = watch::channel(DeviceStatus::default());

        let shared = Arc::new(Shared {
            options,
            sender: conn.sender(),
            cancel: conn.cancel_token(),
            closed_locally: AtomicBool::new(false),
            phase: Mutex::new(LinkPhase::default()),
            discovered: Mutex::new(Vec::new()),
            device: Mutex::new(None),
            status,
            pending: Mutex::new(PendingRequests::new()),
            errors: Mutex::new(ErrorLog::new()),
            window_task: Mutex::new(None),
        });

        let handle = tokio::spawn(receiver::receive_loop(conn, Arc::clone(&shared)));

        Self {
            shared,
            receive_loop: Mutex::new(Some(handle)),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    // ── Discovery ────────────────────────────────────────────────

    /// Ask the bridge for its device list. Does not wait for the reply.
    pub async fn list_devices(&self) -> Result<(), E4Error> {
        self.shared.sender.send(Command::DeviceList).await
    }

    /// Devices from the most recent list reply. Empty means none found.
    pub fn device_list(&self) -> Vec<String> {
        self.shared.discovered.lock().clone()
    }

    /// `list_devices`, wait `settle`, then read the list.
    pub async fn discover(&self, settle: Duration) -> Result<Vec<String>, E4Error> {
        self.list_devices().await?;
        tokio::time::sleep(settle).await;
        Ok(self.device_list())
    }

    // ── Device ───────────────────────────────────────────────────

    /// Attach `device_id` and wait for the connect acknowledgement.
    ///
    /// The record is attached before the command is sent so an early
    /// acknowledgement always has somewhere to land. On timeout the
    /// record stays attached; a late acknowledgement still connects it.
    pub async fn connect_device(&self, device_id: &str, timeout: Duration) -> Result<E4Device, E4Error> {
        let record = Arc::new(Mutex::new(DeviceRecord::new(
            device_id,
            self.shared.options.wrist_sensitivity,
        )));
        *self.shared.device.lock() = Some(Arc::clone(&record));
        self.shared.status.send_replace(DeviceStatus::default());

        self.shared
            .command_and_wait(
                Command::DeviceConnect(device_id.to_string()),
                device_id.to_string(),
                timeout,
                |s| s.connected,
            )
            .await?;
        tracing::info!(device = device_id, "device connected");
        Ok(E4Device::new(Arc::clone(&self.shared), record))
    }

    /// Handle to the attached device, connected or not.
    pub fn device(&self) -> Option<E4Device> {
        self.shared
            .device()
            .map(|record| E4Device::new(Arc::clone(&self.shared), record))
    }

    // ── Errors & lifecycle ───────────────────────────────────────

    /// Snapshot of every failure the receive loop has swallowed.
    pub fn errors(&self) -> ErrorLog {
        self.shared.errors.lock().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.errors.lock().last_error.clone()
    }

    /// `Connecting` until the receive loop has started.
    pub fn phase(&self) -> LinkPhase {
        self.shared.phase.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.phase.lock().is_active()
    }

    /// Close the socket and wait for the receive loop to exit. Idempotent.
    pub async fn close(&self) {
        self.shared.close();
        let handle = self.receive_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("receive loop panicked: {e}");
            }
        }
    }
}

impl Drop for E4Client {
    fn drop(&mut self) {
        self.shared.close();
    }
}
