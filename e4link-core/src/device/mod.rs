//! Per-device state: status flags, channel buffers, window history.
//!
//! [`DeviceRecord::apply`] is the data demultiplexer. It is only ever
//! handed a fully decoded [`DataRecord`], so a record either lands in
//! its buffers completely or not at all.

use serde::{Deserialize, Serialize};

use crate::message::{DataRecord, Sample};
use crate::stream::{Channel, StreamKind};
use crate::window::WindowRecord;

/// Default number of trailing zero GSR samples that mean "off wrist".
pub const DEFAULT_WRIST_SENSITIVITY: usize = 8;

// ── ChannelBuffer ────────────────────────────────────────────────

/// A value series and its timestamps, always the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelBuffer {
    values: Vec<f64>,
    timestamps: Vec<f64>,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp: f64, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of the last `n` samples (fewer if the buffer is shorter).
    pub fn tail(&self, n: usize) -> ChannelBuffer {
        let start = self.len().saturating_sub(n);
        ChannelBuffer {
            values: self.values[start..].to_vec(),
            timestamps: self.timestamps[start..].to_vec(),
        }
    }

    /// Move the contents out, leaving the buffer empty.
    pub fn take(&mut self) -> ChannelBuffer {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }
}

// ── AccBuffer ────────────────────────────────────────────────────

/// Accelerometer series: three axes, the interleaved `x,y,z,...` form,
/// and timestamps. `combined` is always three times the axis length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccBuffer {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    combined: Vec<f64>,
    timestamps: Vec<f64>,
}

impl AccBuffer {
    pub fn push(&mut self, timestamp: f64, [x, y, z]: [f64; 3]) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.combined.extend_from_slice(&[x, y, z]);
        self.timestamps.push(timestamp);
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn combined(&self) -> &[f64] {
        &self.combined
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Copy of the last `n` samples across all five series.
    pub fn tail(&self, n: usize) -> AccBuffer {
        let start = self.len().saturating_sub(n);
        AccBuffer {
            x: self.x[start..].to_vec(),
            y: self.y[start..].to_vec(),
            z: self.z[start..].to_vec(),
            combined: self.combined[start * 3..].to_vec(),
            timestamps: self.timestamps[start..].to_vec(),
        }
    }
}

// ── DeviceStatus ─────────────────────────────────────────────────

/// Acknowledgement-driven flags. Only the receive loop changes these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub connected: bool,
    /// Indexed by [`StreamKind::index`].
    pub subscribed: [bool; 7],
    /// `false` after `pause ON`, `true` after `pause OFF`.
    pub streaming: bool,
}

impl DeviceStatus {
    pub fn is_subscribed(&self, stream: StreamKind) -> bool {
        self.subscribed[stream.index()]
    }

    pub fn set_subscribed(&mut self, stream: StreamKind, on: bool) {
        self.subscribed[stream.index()] = on;
    }
}

// ── DeviceRecord ─────────────────────────────────────────────────

/// Everything known about the attached wristband.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    name: String,
    status: DeviceStatus,
    wrist_sensitivity: usize,
    on_wrist: bool,

    pub(crate) acc: AccBuffer,
    pub(crate) bvp: ChannelBuffer,
    pub(crate) gsr: ChannelBuffer,
    pub(crate) tmp: ChannelBuffer,
    pub(crate) tag: ChannelBuffer,
    pub(crate) ibi: ChannelBuffer,
    pub(crate) hr: ChannelBuffer,
    pub(crate) bat: ChannelBuffer,

    pub(crate) windows: Vec<WindowRecord>,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, wrist_sensitivity: usize) -> Self {
        Self {
            name: name.into(),
            status: DeviceStatus::default(),
            wrist_sensitivity: wrist_sensitivity.max(1),
            on_wrist: true,
            acc: AccBuffer::default(),
            bvp: ChannelBuffer::new(),
            gsr: ChannelBuffer::new(),
            tmp: ChannelBuffer::new(),
            tag: ChannelBuffer::new(),
            ibi: ChannelBuffer::new(),
            hr: ChannelBuffer::new(),
            bat: ChannelBuffer::new(),
            windows: Vec::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub(crate) fn status_mut(&mut self) -> &mut DeviceStatus {
        &mut self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status.connected
    }

    pub fn on_wrist(&self) -> bool {
        self.on_wrist
    }

    pub fn wrist_sensitivity(&self) -> usize {
        self.wrist_sensitivity
    }

    pub fn acc(&self) -> &AccBuffer {
        &self.acc
    }

    /// Buffer for a scalar channel. `Channel::Acc` has no scalar buffer.
    pub fn channel(&self, channel: Channel) -> Option<&ChannelBuffer> {
        match channel {
            Channel::Acc => None,
            Channel::Bvp => Some(&self.bvp),
            Channel::Gsr => Some(&self.gsr),
            Channel::Temperature => Some(&self.tmp),
            Channel::Tag => Some(&self.tag),
            Channel::Ibi => Some(&self.ibi),
            Channel::Hr => Some(&self.hr),
            Channel::Battery => Some(&self.bat),
        }
    }

    pub fn windows(&self) -> &[WindowRecord] {
        &self.windows
    }

    /// Samples held for `channel`.
    pub fn sample_count(&self, channel: Channel) -> usize {
        match self.channel(channel) {
            Some(buf) => buf.len(),
            None => self.acc.len(),
        }
    }

    // ── Demultiplexing ───────────────────────────────────────────

    /// Append one record to its channel.
    pub fn apply(&mut self, record: &DataRecord) {
        let ts = record.timestamp;
        match (record.channel, record.sample) {
            (Channel::Acc, Sample::Triaxial(xyz)) => self.acc.push(ts, xyz),
            (Channel::Acc, Sample::Scalar(v)) => self.acc.push(ts, [v, v, v]),
            (channel, Sample::Scalar(v) | Sample::Triaxial([v, _, _])) => {
                if let Some(buf) = self.scalar_buffer_mut(channel) {
                    buf.push(ts, v);
                }
                if channel == Channel::Gsr {
                    self.update_on_wrist();
                }
            }
        }
    }

    fn scalar_buffer_mut(&mut self, channel: Channel) -> Option<&mut ChannelBuffer> {
        match channel {
            Channel::Acc => None,
            Channel::Bvp => Some(&mut self.bvp),
            Channel::Gsr => Some(&mut self.gsr),
            Channel::Temperature => Some(&mut self.tmp),
            Channel::Tag => Some(&mut self.tag),
            Channel::Ibi => Some(&mut self.ibi),
            Channel::Hr => Some(&mut self.hr),
            Channel::Battery => Some(&mut self.bat),
        }
    }

    /// Off wrist once the last `wrist_sensitivity` GSR samples are all zero.
    fn update_on_wrist(&mut self) {
        let values = self.gsr.values();
        if values.len() < self.wrist_sensitivity {
            self.on_wrist = true;
            return;
        }
        let recent = &values[values.len() - self.wrist_sensitivity..];
        self.on_wrist = !recent.iter().all(|v| *v == 0.0);
    }
}
