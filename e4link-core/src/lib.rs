//! # e4link-core
//!
//! Protocol engine for the E4 streaming bridge, a local TCP server that
//! proxies a wristband sensor.
//!
//! This crate contains:
//! - **Codec**: `E4Codec` for line-framed TCP I/O via `tokio_util`
//! - **Network**: `Connection` with background reader/writer tasks
//! - **Messages**: `Command`, `Message`, `Ack`, `DataRecord`
//! - **Device state**: `DeviceRecord` buffers and the data demultiplexer
//! - **Client**: `E4Client` receive loop and the `E4Device` command facade
//! - **Windowing**: periodic `WindowRecord` segmentation
//! - **Persistence**: channel dumps and window history files
//! - **Error**: `E4Error`, `DecodeError` and the swallowed-error `ErrorLog`

pub mod client;
pub mod codec;
pub mod device;
pub mod error;
pub mod error_log;
pub mod message;
pub mod network;
pub mod persist;
pub mod state;
pub mod stream;
pub mod window;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientOptions, E4Client, E4Device};
pub use codec::{E4Codec, Frame, MAX_LINE_LENGTH};
pub use device::{AccBuffer, ChannelBuffer, DEFAULT_WRIST_SENSITIVITY, DeviceRecord, DeviceStatus};
pub use error::{DecodeError, E4Error};
pub use error_log::{ErrorCategory, ErrorLog};
pub use message::{Ack, AckKind, Command, DataRecord, DeviceEntry, KNOWN_DEVICE_TYPE, Message, Sample};
pub use network::{Connection, ConnectionInfo, ConnectionSender, DEFAULT_PORT};
pub use state::{LinkPhase, PendingKey, PendingRequests};
pub use stream::{Channel, StreamKind};
pub use window::{MAX_WINDOW_SECS, MIN_WINDOW_SECS, WindowRecord, WindowSchedule, window_period};
