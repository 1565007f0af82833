//! Fixed-interval segmentation of the buffered readings.
//!
//! Every `window_secs`, aligned to wall-clock multiples of the window
//! size, the high-rate channels are sliced (trailing `window_secs ×
//! rate` samples) and the low-rate channels are moved out whole. The
//! high-rate buffers themselves are never truncated, so they keep
//! growing for as long as the device is attached.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::{AccBuffer, ChannelBuffer, DeviceRecord, DeviceStatus};
use crate::stream::Channel;

// ── WindowRecord ─────────────────────────────────────────────────

/// Immutable snapshot of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Seconds since the Unix epoch at which the split ran.
    pub captured_at: f64,

    pub acc: AccBuffer,
    pub bvp: ChannelBuffer,
    pub gsr: ChannelBuffer,
    pub tmp: ChannelBuffer,

    pub tag: ChannelBuffer,
    pub ibi: ChannelBuffer,
    pub hr: ChannelBuffer,
    pub bat: ChannelBuffer,
}

/// Shortest accepted window: one sample of the slowest high-rate channel.
pub const MIN_WINDOW_SECS: f64 = 0.25;

/// Longest accepted window.
pub const MAX_WINDOW_SECS: f64 = 86_400.0;

/// Window length as a timer period.
///
/// `None` for anything outside `MIN_WINDOW_SECS..=MAX_WINDOW_SECS`,
/// NaN and infinities included.
pub fn window_period(secs: f64) -> Option<Duration> {
    if !(MIN_WINDOW_SECS..=MAX_WINDOW_SECS).contains(&secs) {
        return None;
    }
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

/// Samples of `channel` that fit in one window.
pub fn samples_per_window(channel: Channel, window_secs: f64) -> usize {
    let rate = channel.nominal_rate().unwrap_or(0);
    (window_secs * f64::from(rate)).round() as usize
}

/// Cut a window from `device` and append it to its history.
///
/// Resets the tag, IBI, heart-rate and battery buffers.
pub fn split_window(device: &mut DeviceRecord, window_secs: f64, captured_at: f64) {
    let record = WindowRecord {
        captured_at,
        acc: device.acc.tail(samples_per_window(Channel::Acc, window_secs)),
        bvp: device.bvp.tail(samples_per_window(Channel::Bvp, window_secs)),
        gsr: device.gsr.tail(samples_per_window(Channel::Gsr, window_secs)),
        tmp: device
            .tmp
            .tail(samples_per_window(Channel::Temperature, window_secs)),
        tag: device.tag.take(),
        ibi: device.ibi.take(),
        hr: device.hr.take(),
        bat: device.bat.take(),
    };
    tracing::debug!(
        device = device.name(),
        window = device.windows.len(),
        gsr = record.gsr.len(),
        "window split"
    );
    device.windows.push(record);
}

// ── Schedule ─────────────────────────────────────────────────────

/// When the first split fires and how often the rest follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSchedule {
    pub period: Duration,
    pub first_tick: Duration,
}

impl WindowSchedule {
    /// First tick at the next wall-clock multiple of `period`.
    pub fn aligned(period: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::aligned_at(period, now)
    }

    /// Same as [`aligned`](Self::aligned) for a given time since the epoch.
    pub fn aligned_at(period: Duration, since_epoch: Duration) -> Self {
        let period_ns = period.as_nanos().max(1);
        let remaining = period_ns - since_epoch.as_nanos() % period_ns;
        let first_tick = u64::try_from(remaining)
            .map(Duration::from_nanos)
            .unwrap_or(period);
        Self { period, first_tick }
    }
}

pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ── Window task ──────────────────────────────────────────────────

/// Spawn the periodic splitter for `device`.
///
/// The task exits when `status` reports the device disconnected, when
/// its sender is dropped, or when `cancel` fires.
pub fn spawn_window_task(
    device: Arc<Mutex<DeviceRecord>>,
    mut status: watch::Receiver<DeviceStatus>,
    window_secs: f64,
    schedule: WindowSchedule,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // `interval_at` rejects a zero period.
        let period = schedule.period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + schedule.first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() || !status.borrow_and_update().connected {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !status.borrow().connected {
                        break;
                    }
                    split_window(&mut device.lock(), window_secs, unix_now());
                }
            }
        }
        tracing::debug!("window task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DataRecord, Sample};

    fn record(channel: Channel, ts: f64, v: f64) -> DataRecord {
        DataRecord {
            channel,
            timestamp: ts,
            sample: Sample::Scalar(v),
        }
    }

    #[test]
    fn window_sizes_follow_nominal_rates() {
        assert_eq!(samples_per_window(Channel::Acc, 5.0), 160);
        assert_eq!(samples_per_window(Channel::Bvp, 5.0), 320);
        assert_eq!(samples_per_window(Channel::Gsr, 5.0), 20);
        assert_eq!(samples_per_window(Channel::Temperature, 2.5), 10);
    }

    #[test]
    fn split_slices_high_rate_and_resets_low_rate() {
        let mut dev = DeviceRecord::new("dev", 8);
        for i in 0..30 {
            dev.apply(&record(Channel::Gsr, i as f64 * 0.25, 0.5));
        }
        dev.apply(&record(Channel::Hr, 1.0, 70.0));
        dev.apply(&record(Channel::Tag, 2.0, 2.0));

        split_window(&mut dev, 5.0, 100.0);

        let w = &dev.windows()[0];
        assert_eq!(w.gsr.len(), 20);
        assert_eq!(w.gsr.timestamps()[0], 2.5);
        assert_eq!(w.hr.values(), &[70.0]);
        assert_eq!(w.tag.len(), 1);
        assert_eq!(w.captured_at, 100.0);

        assert_eq!(dev.sample_count(Channel::Gsr), 30, "high-rate untouched");
        assert_eq!(dev.sample_count(Channel::Hr), 0);
        assert_eq!(dev.sample_count(Channel::Tag), 0);
        assert_eq!(dev.sample_count(Channel::Ibi), 0);
        assert_eq!(dev.sample_count(Channel::Battery), 0);
    }

    #[test]
    fn short_buffers_give_partial_windows() {
        let mut dev = DeviceRecord::new("dev", 8);
        dev.apply(&record(Channel::Bvp, 0.0, 1.0));
        split_window(&mut dev, 5.0, 0.0);
        assert_eq!(dev.windows()[0].bvp.len(), 1);
        assert!(dev.windows()[0].acc.is_empty());
    }

    #[test]
    fn window_period_bounds() {
        assert_eq!(window_period(5.0), Some(Duration::from_secs(5)));
        assert_eq!(window_period(MIN_WINDOW_SECS), Some(Duration::from_millis(250)));
        assert_eq!(window_period(MAX_WINDOW_SECS), Some(Duration::from_secs(86_400)));
        assert_eq!(window_period(1e-12), None);
        assert_eq!(window_period(1e20), None);
        assert_eq!(window_period(0.0), None);
        assert_eq!(window_period(-5.0), None);
        assert_eq!(window_period(f64::NAN), None);
        assert_eq!(window_period(f64::INFINITY), None);
    }

    #[test]
    fn schedule_for_longest_window() {
        let period = Duration::from_secs_f64(MAX_WINDOW_SECS);
        let s = WindowSchedule::aligned_at(period, Duration::from_secs(1_700_000_000));
        assert!(s.first_tick <= period);
        assert!(!s.first_tick.is_zero());
    }

    #[test]
    fn schedule_aligns_to_boundary() {
        let s = WindowSchedule::aligned_at(Duration::from_secs(5), Duration::from_millis(12_300));
        assert_eq!(s.first_tick, Duration::from_millis(2_700));

        let s = WindowSchedule::aligned_at(Duration::from_secs(5), Duration::from_secs(10));
        assert_eq!(s.first_tick, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn twelve_seconds_of_gsr_make_two_windows() {
        let device = Arc::new(Mutex::new(DeviceRecord::new("dev", 8)));
        let (status_tx, status_rx) = watch::channel(DeviceStatus {
            connected: true,
            ..Default::default()
        });
        let schedule = WindowSchedule {
            period: Duration::from_secs(5),
            first_tick: Duration::from_secs(5),
        };
        let cancel = CancellationToken::new();
        let task = spawn_window_task(device.clone(), status_rx, 5.0, schedule, cancel.clone());

        // 4 Hz GSR for 12 s, heart rate at odd seconds away from the boundaries.
        for i in 1..=48u32 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let ts = f64::from(i) * 0.25;
            let mut dev = device.lock();
            dev.apply(&record(Channel::Gsr, ts, 0.3));
            if [1.0, 3.0, 7.0, 9.0, 11.0].contains(&ts) {
                dev.apply(&record(Channel::Hr, ts, 60.0));
            }
        }

        {
            let dev = device.lock();
            assert_eq!(dev.windows().len(), 2);
            for w in dev.windows() {
                assert!(w.gsr.len() <= 20);
                assert!(w.gsr.len() >= 19);
            }
            assert_eq!(dev.windows()[0].hr.timestamps(), &[1.0, 3.0]);
            assert_eq!(dev.windows()[1].hr.timestamps(), &[7.0, 9.0]);
            assert_eq!(dev.channel(Channel::Hr).unwrap().timestamps(), &[11.0]);
        }

        status_tx.send_modify(|s| s.connected = false);
        task.await.unwrap();
        assert_eq!(device.lock().windows().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_task() {
        let device = Arc::new(Mutex::new(DeviceRecord::new("dev", 8)));
        let (_status_tx, status_rx) = watch::channel(DeviceStatus {
            connected: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let task = spawn_window_task(
            device,
            status_rx,
            1.0,
            WindowSchedule::aligned(Duration::from_secs(1)),
            cancel.clone(),
        );
        cancel.cancel();
        task.await.unwrap();
    }
}
