//! Line framing for the bridge socket.
//!
//! The bridge writes `\r\n`-terminated ASCII lines but a single TCP read
//! may hold any number of them, or half of one. `E4Codec` keeps the
//! remainder in the read buffer until its terminator arrives.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::E4Error;
use crate::message::Command;

/// Longest line the decoder will buffer before discarding it.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// One decoded unit from the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped.
    Line(String),
    /// A line that blew past [`MAX_LINE_LENGTH`] and was dropped.
    Oversized(usize),
}

#[derive(Debug, Default)]
pub struct E4Codec {
    /// Bytes already scanned for a terminator.
    next_index: usize,
    /// Set while skipping the tail of an oversized line.
    discarding: Option<usize>,
}

impl E4Codec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for E4Codec {
    type Item = Frame;
    type Error = E4Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

            match (newline, self.discarding) {
                (Some(offset), Some(skipped)) => {
                    src.advance(self.next_index + offset + 1);
                    self.next_index = 0;
                    self.discarding = None;
                    return Ok(Some(Frame::Oversized(skipped + offset)));
                }
                (None, Some(skipped)) => {
                    self.discarding = Some(skipped + src.len());
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (Some(offset), None) => {
                    let end = self.next_index + offset;
                    if end > MAX_LINE_LENGTH {
                        src.advance(end + 1);
                        self.next_index = 0;
                        return Ok(Some(Frame::Oversized(end)));
                    }
                    let line = src.split_to(end + 1);
                    self.next_index = 0;
                    let text = String::from_utf8_lossy(&line[..end]);
                    let text = text.trim_end_matches('\r');
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(Frame::Line(text.to_string())));
                }
                (None, None) => {
                    if src.len() > MAX_LINE_LENGTH {
                        self.discarding = Some(src.len());
                        src.clear();
                        self.next_index = 0;
                    } else {
                        self.next_index = src.len();
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // An unterminated final line is still delivered, oversized or not.
        if let Some(skipped) = self.discarding.take() {
            let total = skipped + src.len();
            src.clear();
            self.next_index = 0;
            return Ok(Some(Frame::Oversized(total)));
        }
        if src.is_empty() {
            self.next_index = 0;
            return Ok(None);
        }
        let rest = src.split();
        self.next_index = 0;
        let text = String::from_utf8_lossy(&rest);
        let text = text.trim_end_matches('\r').trim();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Frame::Line(text.to_string())))
        }
    }
}

impl Encoder<Command> for E4Codec {
    type Error = E4Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_line();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamKind;

    fn drain(codec: &mut E4Codec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn splits_many_lines_in_one_chunk() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::from(&b"E4_Gsr 1.0 0.5\r\nE4_Gsr 1.25 0.6\r\nR pause ON\r\n"[..]);
        let frames = drain(&mut codec, &mut buf);
        assert_eq!(
            frames,
            vec![
                Frame::Line("E4_Gsr 1.0 0.5".into()),
                Frame::Line("E4_Gsr 1.25 0.6".into()),
                Frame::Line("R pause ON".into()),
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn reassembles_partial_line() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::from(&b"E4_Bvp 1.0 "[..]);
        assert!(drain(&mut codec, &mut buf).is_empty());

        buf.extend_from_slice(b"-12.5\r\nE4_B");
        assert_eq!(
            drain(&mut codec, &mut buf),
            vec![Frame::Line("E4_Bvp 1.0 -12.5".into())]
        );
        assert_eq!(&buf[..], b"E4_B");
    }

    #[test]
    fn skips_blank_lines() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::from(&b"\r\n\r\nR device_list 0\r\n"[..]);
        assert_eq!(
            drain(&mut codec, &mut buf),
            vec![Frame::Line("R device_list 0".into())]
        );
    }

    #[test]
    fn oversized_line_is_dropped_then_recovers() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_LENGTH + 10]);
        assert!(drain(&mut codec, &mut buf).is_empty());

        buf.extend_from_slice(b"yyy\nR pause OFF\n");
        let frames = drain(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Frame::Oversized(n) if n > MAX_LINE_LENGTH));
        assert_eq!(frames[1], Frame::Line("R pause OFF".into()));
    }

    #[test]
    fn oversized_line_in_one_chunk_is_discarded() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_LENGTH + 10]);
        buf.extend_from_slice(b"\nR pause ON\r\n");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Oversized(MAX_LINE_LENGTH + 10))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Line("R pause ON".into()))
        );
    }

    #[test]
    fn line_at_limit_is_kept() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_LENGTH]);
        buf.extend_from_slice(b"\n");
        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Line(line)) => assert_eq!(line.len(), MAX_LINE_LENGTH),
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[test]
    fn eof_reports_unterminated_oversized_tail() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_LENGTH + 1]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"yyy");
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Frame::Oversized(MAX_LINE_LENGTH + 4))
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn eof_flushes_unterminated_line() {
        let mut codec = E4Codec::new();
        let mut buf = BytesMut::from(&b"R device_disconnect OK"[..]);
        let frame = codec.decode_eof(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Line("R device_disconnect OK".into())));
    }

    #[test]
    fn encodes_crlf() {
        let mut codec = E4Codec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(Command::DeviceSubscribe(StreamKind::Tmp, false), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"device_subscribe tmp OFF\r\n");
    }

    #[tokio::test]
    async fn framed_reassembles_split_reads() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let mock = tokio_test::io::Builder::new()
            .read(b"R device_connect O")
            .read(b"K\r\nE4_Gsr 1.0 0.2\r\n\r\nE4_")
            .read(b"Hr 1.0 70")
            .build();
        let mut framed = FramedRead::new(mock, E4Codec::new());

        let mut lines = Vec::new();
        while let Some(frame) = framed.next().await {
            lines.push(frame.unwrap());
        }
        assert_eq!(
            lines,
            vec![
                Frame::Line("R device_connect OK".into()),
                Frame::Line("E4_Gsr 1.0 0.2".into()),
                Frame::Line("E4_Hr 1.0 70".into()),
            ]
        );
    }
}
