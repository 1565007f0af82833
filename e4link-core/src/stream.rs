//! Stream kinds (subscription level) and data channels (record level).
//!
//! The bridge subscribes per [`StreamKind`] but tags every data record
//! with a finer [`Channel`]: the IBI subscription, for example, yields
//! both `E4_Ibi` and `E4_Hr` records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

// ── StreamKind ───────────────────────────────────────────────────

/// One of the seven subscribable sensor streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// 3-axis accelerometer.
    Acc,
    /// Blood-volume pulse.
    Bvp,
    /// Galvanic skin response (skin conductance).
    Gsr,
    /// Skin temperature.
    Tmp,
    /// Event tags (button presses).
    Tag,
    /// Inter-beat interval, also carries heart rate.
    Ibi,
    /// Battery level.
    Bat,
}

impl StreamKind {
    /// Every stream, in wire order.
    pub const ALL: [StreamKind; 7] = [
        StreamKind::Acc,
        StreamKind::Bvp,
        StreamKind::Gsr,
        StreamKind::Tmp,
        StreamKind::Tag,
        StreamKind::Ibi,
        StreamKind::Bat,
    ];

    /// The token the bridge uses for this stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Acc => "acc",
            StreamKind::Bvp => "bvp",
            StreamKind::Gsr => "gsr",
            StreamKind::Tmp => "tmp",
            StreamKind::Tag => "tag",
            StreamKind::Ibi => "ibi",
            StreamKind::Bat => "bat",
        }
    }

    /// Position in [`StreamKind::ALL`], used to index flag arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for StreamKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DecodeError::UnknownStream(s.to_string()))
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// Prefix shared by every data record.
pub const DATA_PREFIX: &str = "E4_";

/// A data channel as tagged on an inbound record (`E4_<suffix>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Acc,
    Bvp,
    Gsr,
    Temperature,
    Ibi,
    Hr,
    Battery,
    Tag,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::Acc,
        Channel::Bvp,
        Channel::Gsr,
        Channel::Temperature,
        Channel::Ibi,
        Channel::Hr,
        Channel::Battery,
        Channel::Tag,
    ];

    /// Record suffix after [`DATA_PREFIX`].
    pub fn suffix(&self) -> &'static str {
        match self {
            Channel::Acc => "Acc",
            Channel::Bvp => "Bvp",
            Channel::Gsr => "Gsr",
            Channel::Temperature => "Temperature",
            Channel::Ibi => "Ibi",
            Channel::Hr => "Hr",
            Channel::Battery => "Battery",
            Channel::Tag => "Tag",
        }
    }

    /// Full record name, e.g. `E4_Gsr`.
    pub fn record_name(&self) -> &'static str {
        match self {
            Channel::Acc => "E4_Acc",
            Channel::Bvp => "E4_Bvp",
            Channel::Gsr => "E4_Gsr",
            Channel::Temperature => "E4_Temperature",
            Channel::Ibi => "E4_Ibi",
            Channel::Hr => "E4_Hr",
            Channel::Battery => "E4_Battery",
            Channel::Tag => "E4_Tag",
        }
    }

    /// Resolve a record suffix (case-sensitive, as the bridge emits it).
    pub fn from_suffix(suffix: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.suffix() == suffix)
    }

    /// The subscription that produces this channel.
    pub fn stream(&self) -> StreamKind {
        match self {
            Channel::Acc => StreamKind::Acc,
            Channel::Bvp => StreamKind::Bvp,
            Channel::Gsr => StreamKind::Gsr,
            Channel::Temperature => StreamKind::Tmp,
            Channel::Ibi | Channel::Hr => StreamKind::Ibi,
            Channel::Battery => StreamKind::Bat,
            Channel::Tag => StreamKind::Tag,
        }
    }

    /// Fixed nominal sampling rate in Hz for the high-rate channels.
    ///
    /// Low-rate channels are event driven and return `None`.
    pub fn nominal_rate(&self) -> Option<u32> {
        match self {
            Channel::Acc => Some(32),
            Channel::Bvp => Some(64),
            Channel::Gsr | Channel::Temperature => Some(4),
            _ => None,
        }
    }

    /// Number of numeric values after the timestamp.
    pub fn value_count(&self) -> usize {
        match self {
            Channel::Acc => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
