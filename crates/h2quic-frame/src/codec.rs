use bytes::{Buf, BufMut, Bytes, BytesMut};
use h2quic_transport::StreamId;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Frame header: length (3) + type (1) + flags (1) + stream id (4) = 9 bytes.
pub const FRAME_HEADER_LEN: usize = 9;

/// Default maximum frame payload (`SETTINGS_MAX_FRAME_SIZE` initial value).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Largest payload the 24-bit length field can express.
pub const MAX_FRAME_SIZE_LIMIT: usize = (1 << 24) - 1;

// Frame types (RFC 7540 Section 6).
pub const FRAME_DATA: u8 = 0x0;
pub const FRAME_HEADERS: u8 = 0x1;
pub const FRAME_PRIORITY: u8 = 0x2;
pub const FRAME_RST_STREAM: u8 = 0x3;
pub const FRAME_SETTINGS: u8 = 0x4;
pub const FRAME_PUSH_PROMISE: u8 = 0x5;
pub const FRAME_PING: u8 = 0x6;
pub const FRAME_GOAWAY: u8 = 0x7;
pub const FRAME_WINDOW_UPDATE: u8 = 0x8;
pub const FRAME_CONTINUATION: u8 = 0x9;

// Flags.
pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// Returns a human-readable name for a frame type.
pub fn frame_type_name(kind: u8) -> &'static str {
    match kind {
        FRAME_DATA => "DATA",
        FRAME_HEADERS => "HEADERS",
        FRAME_PRIORITY => "PRIORITY",
        FRAME_RST_STREAM => "RST_STREAM",
        FRAME_SETTINGS => "SETTINGS",
        FRAME_PUSH_PROMISE => "PUSH_PROMISE",
        FRAME_PING => "PING",
        FRAME_GOAWAY => "GOAWAY",
        FRAME_WINDOW_UPDATE => "WINDOW_UPDATE",
        FRAME_CONTINUATION => "CONTINUATION",
        _ => "UNKNOWN",
    }
}

/// Stream dependency carried by a HEADERS frame with the PRIORITY flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub exclusive: bool,
    pub dependency: StreamId,
    pub weight: u8,
}

/// A HEADERS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    /// Stream the header block belongs to.
    pub stream_id: StreamId,
    /// HPACK-encoded header block fragment (padding and priority removed).
    pub block: Bytes,
    /// END_STREAM: the sender will send no body.
    pub end_stream: bool,
    /// END_HEADERS: the block is complete without CONTINUATION frames.
    pub end_headers: bool,
    pub priority: Option<Priority>,
}

impl HeadersFrame {
    /// A complete header block with no body following.
    pub fn new(stream_id: StreamId, block: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            block: block.into(),
            end_stream: false,
            end_headers: true,
            priority: None,
        }
    }

    pub fn with_end_stream(mut self, end_stream: bool) -> Self {
        self.end_stream = end_stream;
        self
    }

    pub fn with_end_headers(mut self, end_headers: bool) -> Self {
        self.end_headers = end_headers;
        self
    }
}

/// A frame read from or written to the header stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Headers(HeadersFrame),
    Continuation {
        stream_id: StreamId,
        block: Bytes,
        end_headers: bool,
    },
    /// Any other frame type, kept undecoded.
    Other {
        kind: u8,
        flags: u8,
        stream_id: StreamId,
        payload: Bytes,
    },
}

impl Frame {
    /// Wire type of this frame.
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Headers(_) => FRAME_HEADERS,
            Frame::Continuation { .. } => FRAME_CONTINUATION,
            Frame::Other { kind, .. } => *kind,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        frame_type_name(self.kind())
    }

    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Headers(headers) => headers.stream_id,
            Frame::Continuation { stream_id, .. } | Frame::Other { stream_id, .. } => *stream_id,
        }
    }
}

impl From<HeadersFrame> for Frame {
    fn from(frame: HeadersFrame) -> Self {
        Frame::Headers(frame)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// +-----------------------------------------------+
/// |                 Length (24)                   |
/// +---------------+---------------+---------------+
/// |   Type (8)    |   Flags (8)   |
/// +-+-------------+---------------+-------------------------------+
/// |R|                 Stream Identifier (31)                      |
/// +=+=============================================================+
/// |                   Frame Payload (0...)                      ...
/// +---------------------------------------------------------------+
/// ```
///
/// HEADERS frames are written without padding.
pub fn encode_frame(frame: &Frame, max_frame_size: usize, dst: &mut BytesMut) -> Result<()> {
    match frame {
        Frame::Headers(headers) => {
            let mut flags = 0;
            if headers.end_stream {
                flags |= FLAG_END_STREAM;
            }
            if headers.end_headers {
                flags |= FLAG_END_HEADERS;
            }
            let priority_len = if headers.priority.is_some() { 5 } else { 0 };
            if headers.priority.is_some() {
                flags |= FLAG_PRIORITY;
            }
            let len = priority_len + headers.block.len();
            put_header(dst, len, max_frame_size, FRAME_HEADERS, flags, headers.stream_id)?;
            if let Some(priority) = headers.priority {
                let mut dependency = priority.dependency & STREAM_ID_MASK;
                if priority.exclusive {
                    dependency |= !STREAM_ID_MASK;
                }
                dst.put_u32(dependency);
                dst.put_u8(priority.weight);
            }
            dst.put_slice(&headers.block);
        }
        Frame::Continuation {
            stream_id,
            block,
            end_headers,
        } => {
            let flags = if *end_headers { FLAG_END_HEADERS } else { 0 };
            put_header(dst, block.len(), max_frame_size, FRAME_CONTINUATION, flags, *stream_id)?;
            dst.put_slice(block);
        }
        Frame::Other {
            kind,
            flags,
            stream_id,
            payload,
        } => {
            put_header(dst, payload.len(), max_frame_size, *kind, *flags, *stream_id)?;
            dst.put_slice(payload);
        }
    }
    Ok(())
}

fn put_header(
    dst: &mut BytesMut,
    len: usize,
    max_frame_size: usize,
    kind: u8,
    flags: u8,
    stream_id: StreamId,
) -> Result<()> {
    if len > max_frame_size.min(MAX_FRAME_SIZE_LIMIT) {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }
    dst.reserve(FRAME_HEADER_LEN + len);
    dst.put_uint(len as u64, 3);
    dst.put_u8(kind);
    dst.put_u8(flags);
    dst.put_u32(stream_id & STREAM_ID_MASK);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = (usize::from(src[0]) << 16) | (usize::from(src[1]) << 8) | usize::from(src[2]);
    if len > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }
    if src.len() < FRAME_HEADER_LEN + len {
        return Ok(None);
    }

    let kind = src[3];
    let flags = src[4];
    let stream_id = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) & STREAM_ID_MASK;
    src.advance(FRAME_HEADER_LEN);
    let payload = src.split_to(len).freeze();

    let frame = match kind {
        FRAME_HEADERS => Frame::Headers(decode_headers(flags, stream_id, payload)?),
        FRAME_CONTINUATION => {
            if stream_id == 0 {
                return Err(FrameError::ZeroStreamId {
                    kind: "CONTINUATION",
                });
            }
            Frame::Continuation {
                stream_id,
                block: payload,
                end_headers: flags & FLAG_END_HEADERS != 0,
            }
        }
        _ => Frame::Other {
            kind,
            flags,
            stream_id,
            payload,
        },
    };
    Ok(Some(frame))
}

fn decode_headers(flags: u8, stream_id: StreamId, mut payload: Bytes) -> Result<HeadersFrame> {
    const KIND: &str = "HEADERS";

    if stream_id == 0 {
        return Err(FrameError::ZeroStreamId { kind: KIND });
    }

    let mut pad_len = 0usize;
    if flags & FLAG_PADDED != 0 {
        if payload.is_empty() {
            return Err(FrameError::ShortPayload { kind: KIND, len: 0 });
        }
        pad_len = usize::from(payload.get_u8());
    }

    let mut priority = None;
    if flags & FLAG_PRIORITY != 0 {
        if payload.len() < 5 {
            return Err(FrameError::ShortPayload {
                kind: KIND,
                len: payload.len(),
            });
        }
        let raw = payload.get_u32();
        priority = Some(Priority {
            exclusive: raw & !STREAM_ID_MASK != 0,
            dependency: raw & STREAM_ID_MASK,
            weight: payload.get_u8(),
        });
    }

    if pad_len > payload.len() {
        return Err(FrameError::InvalidPadding { kind: KIND });
    }
    payload.truncate(payload.len() - pad_len);

    Ok(HeadersFrame {
        stream_id,
        block: payload,
        end_stream: flags & FLAG_END_STREAM != 0,
        end_headers: flags & FLAG_END_HEADERS != 0,
        priority,
    })
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame payload size in bytes. Default: 16 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// `tokio_util` codec over [`decode_frame`] / [`encode_frame`].
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: FrameConfig,
}

impl FrameCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let frame = decode_frame(src, self.config.max_frame_size)?;
        if let Some(frame) = &frame {
            trace!(
                kind = frame.kind_name(),
                stream_id = frame.stream_id(),
                "frame decoded"
            );
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Truncated {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&frame, self.config.max_frame_size, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(kind: u8, flags: u8, stream_id: u32, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_uint(payload.len() as u64, 3);
        buf.put_u8(kind);
        buf.put_u8(flags);
        buf.put_u32(stream_id);
        buf.put_slice(payload);
        buf
    }

    #[test]
    fn test_encode_headers_layout() {
        let frame = HeadersFrame::new(5, Bytes::from_static(b"\x82\x84")).with_end_stream(true);
        let mut buf = BytesMut::new();
        encode_frame(&frame.into(), DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0, 0, 2, FRAME_HEADERS, FLAG_END_STREAM | FLAG_END_HEADERS, 0, 0, 0, 5, 0x82, 0x84]
        );
    }

    #[test]
    fn test_encode_decode_headers_with_priority() {
        let mut frame = HeadersFrame::new(7, Bytes::from_static(b"block"));
        frame.priority = Some(Priority {
            exclusive: true,
            dependency: 5,
            weight: 200,
        });
        let mut buf = BytesMut::new();
        encode_frame(&Frame::Headers(frame.clone()), DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, Frame::Headers(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_padded_headers() {
        // pad length 3, block "abc", 3 bytes padding
        let mut buf = raw_frame(
            FRAME_HEADERS,
            FLAG_PADDED | FLAG_END_HEADERS,
            5,
            &[3, b'a', b'b', b'c', 0, 0, 0],
        );

        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        match frame {
            Frame::Headers(headers) => {
                assert_eq!(headers.block.as_ref(), b"abc");
                assert!(headers.end_headers);
                assert!(!headers.end_stream);
            }
            other => panic!("expected HEADERS, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_invalid_padding() {
        let mut buf = raw_frame(FRAME_HEADERS, FLAG_PADDED, 5, &[9, b'a']);
        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::InvalidPadding { .. })));
    }

    #[test]
    fn test_decode_short_priority() {
        let mut buf = raw_frame(FRAME_HEADERS, FLAG_PRIORITY, 5, &[0, 0, 1]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            result,
            Err(FrameError::ShortPayload { len: 3, .. })
        ));
    }

    #[test]
    fn test_decode_headers_on_stream_zero() {
        let mut buf = raw_frame(FRAME_HEADERS, FLAG_END_HEADERS, 0, b"x");
        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::ZeroStreamId { .. })));
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0u8, 0, 4, FRAME_HEADERS][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = raw_frame(FRAME_HEADERS, FLAG_END_HEADERS, 5, b"hello");
        buf.truncate(FRAME_HEADER_LEN + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), FRAME_HEADER_LEN + 2);
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_uint(64 * 1024, 3);
        buf.put_u8(FRAME_HEADERS);
        buf.put_u8(0);
        buf.put_u32(5);

        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_encode_rejects_oversized_block() {
        let frame = HeadersFrame::new(5, vec![0u8; 32]);
        let mut buf = BytesMut::new();
        let result = encode_frame(&frame.into(), 16, &mut buf);
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size: 32, max: 16 })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_non_header_frames_stay_tagged() {
        let mut buf = raw_frame(FRAME_SETTINGS, 0, 0, &[0, 1, 0, 0, 0x10, 0]);
        buf.extend_from_slice(&raw_frame(FRAME_DATA, FLAG_END_STREAM, 5, b"body"));

        let settings = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(settings.kind_name(), "SETTINGS");
        assert_eq!(settings.stream_id(), 0);

        let data = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        match data {
            Frame::Other {
                kind,
                flags,
                stream_id,
                payload,
            } => {
                assert_eq!((kind, flags, stream_id), (FRAME_DATA, FLAG_END_STREAM, 5));
                assert_eq!(payload.as_ref(), b"body");
            }
            other => panic!("expected DATA, got {other:?}"),
        }
    }

    #[test]
    fn test_continuation_frame() {
        let mut buf = raw_frame(FRAME_CONTINUATION, FLAG_END_HEADERS, 5, b"rest");
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            Frame::Continuation {
                stream_id: 5,
                block: Bytes::from_static(b"rest"),
                end_headers: true,
            }
        );
    }

    #[test]
    fn test_reserved_bit_is_ignored() {
        let mut buf = raw_frame(FRAME_HEADERS, FLAG_END_HEADERS, 0x8000_0005, b"x");
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.stream_id(), 5);
    }

    #[test]
    fn test_codec_decode_eof_reports_truncation() {
        let mut codec = FrameCodec::default();
        let mut buf = raw_frame(FRAME_HEADERS, FLAG_END_HEADERS, 5, b"hello");
        buf.truncate(FRAME_HEADER_LEN + 1);

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { buffered: 10 }));

        let mut empty = BytesMut::new();
        assert!(codec.decode_eof(&mut empty).unwrap().is_none());
    }
}
