//! Protocol message types: outbound commands and decoded inbound lines.
//!
//! Inbound lines are classified into acknowledgements (`R ...`) and
//! data records (`E4_<Type> ...`). Decoding is total: a data record is
//! either fully parsed or rejected, never half-built.

use std::fmt;

use crate::error::DecodeError;
use crate::stream::{Channel, DATA_PREFIX, StreamKind};

/// Device type reported by the bridge for supported wristbands.
pub const KNOWN_DEVICE_TYPE: &str = "Empatica_E4";

// ── Command ──────────────────────────────────────────────────────

/// Every command this client sends to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query the devices visible to the bridge.
    DeviceList,
    /// Attach to a device by identity.
    DeviceConnect(String),
    /// Detach from the current device.
    DeviceDisconnect,
    /// Turn one stream on (`true`) or off.
    DeviceSubscribe(StreamKind, bool),
    /// Suspend (`true`) or resume streaming.
    Pause(bool),
}

impl Command {
    /// Command keyword, as it appears in the acknowledgement.
    pub fn name(&self) -> &'static str {
        match self {
            Command::DeviceList => "device_list",
            Command::DeviceConnect(_) => "device_connect",
            Command::DeviceDisconnect => "device_disconnect",
            Command::DeviceSubscribe(..) => "device_subscribe",
            Command::Pause(_) => "pause",
        }
    }

    /// Wire form without the line terminator.
    pub fn to_line(&self) -> String {
        match self {
            Command::DeviceList => "device_list".to_string(),
            Command::DeviceConnect(id) => format!("device_connect {id}"),
            Command::DeviceDisconnect => "device_disconnect".to_string(),
            Command::DeviceSubscribe(stream, on) => {
                format!("device_subscribe {stream} {}", on_off(*on))
            }
            Command::Pause(on) => format!("pause {}", on_off(*on)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

fn parse_on_off(token: &str) -> Option<bool> {
    if token.eq_ignore_ascii_case("ON") {
        Some(true)
    } else if token.eq_ignore_ascii_case("OFF") {
        Some(false)
    } else {
        None
    }
}

// ── Acknowledgements ─────────────────────────────────────────────

/// One `(identity, type)` pair from a device-list reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: String,
    pub device_type: String,
}

/// What an acknowledgement refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum AckKind {
    DeviceList(Vec<DeviceEntry>),
    Connect,
    Disconnect,
    /// `state` is the ON/OFF token when the bridge echoes one.
    Subscribe {
        stream: Option<StreamKind>,
        state: Option<bool>,
    },
    Pause(Option<bool>),
    /// Unsolicited `R connection lost to device <id>`.
    DeviceLost,
    Other(String),
}

/// A decoded control line.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub kind: AckKind,
    /// The bridge flagged this reply as an error.
    pub is_error: bool,
    /// The raw line, kept for the error log.
    pub raw: String,
}

impl Ack {
    fn decode(tokens: &[&str], raw: &str) -> Ack {
        let is_error = tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case("ERR") || t.eq_ignore_ascii_case("ERROR"));
        let rest = tokens.get(2..).unwrap_or_default();

        let kind = match tokens.get(1).copied().unwrap_or_default() {
            "device_list" => AckKind::DeviceList(parse_device_list(rest)),
            "device_connect" => AckKind::Connect,
            "device_disconnect" => AckKind::Disconnect,
            "device_subscribe" => AckKind::Subscribe {
                stream: rest.first().and_then(|t| t.parse().ok()),
                state: rest.iter().skip(1).find_map(|t| parse_on_off(t)),
            },
            "pause" => AckKind::Pause(rest.iter().find_map(|t| parse_on_off(t))),
            "connection" if rest.first() == Some(&"lost") => AckKind::DeviceLost,
            other => AckKind::Other(other.to_string()),
        };

        Ack {
            kind,
            is_error,
            raw: raw.to_string(),
        }
    }
}

/// `<n> [|] <id> <type> [|] <id> <type> ...` → entries.
///
/// The count is advisory; entries are read until the tokens run out.
fn parse_device_list(rest: &[&str]) -> Vec<DeviceEntry> {
    let fields: Vec<&str> = rest
        .iter()
        .skip(1)
        .copied()
        .filter(|t| *t != "|")
        .collect();
    fields
        .chunks_exact(2)
        .map(|pair| DeviceEntry {
            id: pair[0].to_string(),
            device_type: pair[1].to_string(),
        })
        .collect()
}

// ── Data records ─────────────────────────────────────────────────

/// Numeric payload of a data record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Triaxial([f64; 3]),
    Scalar(f64),
}

/// A fully parsed data record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRecord {
    pub channel: Channel,
    /// Seconds since the Unix epoch, as stamped by the bridge.
    pub timestamp: f64,
    pub sample: Sample,
}

impl DataRecord {
    fn decode(head: &str, tokens: &[&str]) -> Result<DataRecord, DecodeError> {
        let suffix = &head[DATA_PREFIX.len()..];
        let channel =
            Channel::from_suffix(suffix).ok_or_else(|| DecodeError::UnknownStream(suffix.into()))?;
        let record = channel.record_name();

        let timestamp = parse_field(record, "timestamp", tokens.get(1))?;

        let sample = match channel {
            Channel::Acc => Sample::Triaxial([
                parse_field(record, "x", tokens.get(2))?,
                parse_field(record, "y", tokens.get(3))?,
                parse_field(record, "z", tokens.get(4))?,
            ]),
            // Tags are bare timestamps on the wire.
            Channel::Tag if tokens.len() < 3 => Sample::Scalar(timestamp),
            _ => Sample::Scalar(parse_field(record, "value", tokens.get(2))?),
        };

        Ok(DataRecord {
            channel,
            timestamp,
            sample,
        })
    }
}

fn parse_field(
    record: &'static str,
    field: &'static str,
    token: Option<&&str>,
) -> Result<f64, DecodeError> {
    let token = token.ok_or(DecodeError::MissingField { record, field })?;
    // The bridge emits decimal commas on some locales.
    let normalized = token.replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::InvalidNumber {
            record,
            field,
            value: token.to_string(),
        })
}

// ── Message ──────────────────────────────────────────────────────

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Control(Ack),
    Data(DataRecord),
}

impl Message {
    /// Classify one line.
    ///
    /// Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Message>, DecodeError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(head) = tokens.first().copied() else {
            return Ok(None);
        };

        if head == "R" {
            return Ok(Some(Message::Control(Ack::decode(&tokens, line))));
        }
        if head.starts_with(DATA_PREFIX) {
            return DataRecord::decode(head, &tokens).map(|r| Some(Message::Data(r)));
        }
        Err(DecodeError::Malformed(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(line: &str) -> Ack {
        match Message::parse(line).unwrap() {
            Some(Message::Control(ack)) => ack,
            other => panic!("expected control, got {other:?}"),
        }
    }

    fn data(line: &str) -> DataRecord {
        match Message::parse(line).unwrap() {
            Some(Message::Data(rec)) => rec,
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn command_wire_forms() {
        assert_eq!(Command::DeviceList.to_line(), "device_list");
        assert_eq!(
            Command::DeviceConnect("9ff167".into()).to_line(),
            "device_connect 9ff167"
        );
        assert_eq!(
            Command::DeviceSubscribe(StreamKind::Gsr, true).to_line(),
            "device_subscribe gsr ON"
        );
        assert_eq!(Command::Pause(false).to_line(), "pause OFF");
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(Message::parse("   \t").unwrap(), None);
    }

    #[test]
    fn device_list_with_separators() {
        let ack = control("R device_list 2 | 9ff167 Empatica_E4 | 7a3166 Empatica_E4");
        let AckKind::DeviceList(entries) = ack.kind else {
            panic!("not a device list");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "9ff167");
        assert_eq!(entries[1].device_type, KNOWN_DEVICE_TYPE);
        assert!(!ack.is_error);
    }

    #[test]
    fn device_list_empty() {
        let ack = control("R device_list 0");
        assert_eq!(ack.kind, AckKind::DeviceList(Vec::new()));
    }

    #[test]
    fn connect_error_is_flagged() {
        let ack = control("R device_connect ERR The device requested for connection is not available.");
        assert_eq!(ack.kind, AckKind::Connect);
        assert!(ack.is_error);
    }

    #[test]
    fn subscribe_parses_stream_and_state() {
        let ack = control("R device_subscribe acc ON OK");
        assert_eq!(
            ack.kind,
            AckKind::Subscribe {
                stream: Some(StreamKind::Acc),
                state: Some(true)
            }
        );

        let ack = control("R device_subscribe bvp OK");
        assert_eq!(
            ack.kind,
            AckKind::Subscribe {
                stream: Some(StreamKind::Bvp),
                state: None
            }
        );
    }

    #[test]
    fn pause_and_lost() {
        assert_eq!(control("R pause ON").kind, AckKind::Pause(Some(true)));
        assert_eq!(control("R connection lost to device 9ff167").kind, AckKind::DeviceLost);
        assert_eq!(control("R hello").kind, AckKind::Other("hello".into()));
    }

    #[test]
    fn acc_record() {
        let rec = data("E4_Acc 1495101345.6543 51 -2 -10");
        assert_eq!(rec.channel, Channel::Acc);
        assert_eq!(rec.sample, Sample::Triaxial([51.0, -2.0, -10.0]));
        assert!((rec.timestamp - 1495101345.6543).abs() < 1e-6);
    }

    #[test]
    fn scalar_records_and_decimal_comma() {
        let rec = data("E4_Gsr 123.5 0,25");
        assert_eq!(rec.sample, Sample::Scalar(0.25));
        let rec = data("E4_Temperature 10 33.1");
        assert_eq!(rec.channel, Channel::Temperature);
    }

    #[test]
    fn bare_tag_uses_timestamp() {
        let rec = data("E4_Tag 42.5");
        assert_eq!(rec.sample, Sample::Scalar(42.5));
    }

    #[test]
    fn bad_number_rejected() {
        let err = Message::parse("E4_Acc 1.0 1 two 3").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNumber { field: "y", .. }));
    }

    #[test]
    fn missing_value_rejected() {
        let err = Message::parse("E4_Bvp 1.0").unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "value", .. }));
    }

    #[test]
    fn unknown_stream_and_garbage() {
        assert_eq!(
            Message::parse("E4_Eeg 1.0 2.0").unwrap_err(),
            DecodeError::UnknownStream("Eeg".into())
        );
        assert!(matches!(
            Message::parse("hello world").unwrap_err(),
            DecodeError::Malformed(_)
        ));
    }
}
