//! Connection-scoped HPACK decoding.
//!
//! One [`HeaderDecoder`] exists per connection and is owned by the
//! dispatcher task. Its dynamic table changes with every block decoded, so
//! blocks must be fed in exactly the order they arrived.

use bytes::Bytes;
use tracing::trace;

use crate::error::DecodeError;

/// Pseudo-header fields of a request header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PseudoHeaders {
    pub method: Option<Bytes>,
    pub scheme: Option<Bytes>,
    pub authority: Option<Bytes>,
    pub path: Option<Bytes>,
}

/// A decoded header block: pseudo-headers split from ordinary fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    pub pseudo: PseudoHeaders,
    /// Ordinary fields in arrival order, duplicates kept.
    pub fields: Vec<(Bytes, Bytes)>,
}

impl HeaderSet {
    /// Split raw `(name, value)` pairs into pseudo-headers and ordinary fields.
    ///
    /// Unknown pseudo-headers are dropped.
    pub fn from_fields<I, N, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<Bytes>,
        V: Into<Bytes>,
    {
        let mut set = Self::default();
        for (name, value) in fields {
            let name = name.into();
            let value = value.into();
            if !name.starts_with(b":") {
                set.fields.push((name, value));
                continue;
            }
            let slot = match name.as_ref() {
                b":method" => &mut set.pseudo.method,
                b":scheme" => &mut set.pseudo.scheme,
                b":authority" => &mut set.pseudo.authority,
                b":path" => &mut set.pseudo.path,
                other => {
                    trace!(name = %String::from_utf8_lossy(other), "ignoring pseudo-header");
                    continue;
                }
            };
            *slot = Some(value);
        }
        set
    }

    /// First value of an ordinary field.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|(field, _)| field.as_ref() == name.as_bytes())
            .map(|(_, value)| value)
    }

    /// Number of ordinary fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// HPACK decoder holding one connection's compression context.
pub struct HeaderDecoder {
    inner: fluke_hpack::Decoder<'static>,
    blocks: u64,
}

impl HeaderDecoder {
    /// A decoder with the default 4096-byte dynamic table.
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
            blocks: 0,
        }
    }

    /// Decode one complete header block.
    ///
    /// An error leaves the dynamic table in an unknown state; the connection
    /// cannot decode further blocks.
    pub fn decode(&mut self, block: &[u8]) -> Result<HeaderSet, DecodeError> {
        let fields = self
            .inner
            .decode(block)
            .map_err(|err| DecodeError::new(format!("{err:?}")))?;
        self.blocks += 1;
        trace!(block = self.blocks, fields = fields.len(), "decoded header block");
        Ok(HeaderSet::from_fields(fields))
    }

    /// Number of blocks decoded so far.
    pub fn blocks_decoded(&self) -> u64 {
        self.blocks
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(encoder: &mut fluke_hpack::Encoder<'static>, headers: &[(&str, &str)]) -> Vec<u8> {
        encoder.encode(headers.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())))
    }

    #[test]
    fn splits_pseudo_headers_from_fields() {
        let mut encoder = fluke_hpack::Encoder::new();
        let block = encode(
            &mut encoder,
            &[
                (":method", "GET"),
                (":scheme", "https"),
                (":authority", "example.com"),
                (":path", "/x"),
                ("accept", "*/*"),
                ("cookie", "a=1"),
                ("cookie", "b=2"),
            ],
        );

        let mut decoder = HeaderDecoder::new();
        let set = decoder.decode(&block).unwrap();

        assert_eq!(set.pseudo.method.as_deref(), Some(&b"GET"[..]));
        assert_eq!(set.pseudo.scheme.as_deref(), Some(&b"https"[..]));
        assert_eq!(set.pseudo.authority.as_deref(), Some(&b"example.com"[..]));
        assert_eq!(set.pseudo.path.as_deref(), Some(&b"/x"[..]));
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("cookie").map(|v| v.as_ref()), Some(&b"a=1"[..]));
        assert_eq!(decoder.blocks_decoded(), 1);
    }

    #[test]
    fn unknown_pseudo_headers_are_dropped() {
        let set = HeaderSet::from_fields(vec![
            (b":status".to_vec(), b"200".to_vec()),
            (b":path".to_vec(), b"/".to_vec()),
            (b"x-a".to_vec(), b"1".to_vec()),
        ]);
        assert_eq!(set.pseudo.path.as_deref(), Some(&b"/"[..]));
        assert_eq!(set.fields.len(), 1);
    }

    #[test]
    fn dynamic_table_spans_blocks() {
        // Block 1 adds "x-seq: a" to the dynamic table (literal, incremental indexing).
        let first = [0x82, 0x40, 0x05, b'x', b'-', b's', b'e', b'q', 0x01, b'a'];
        // Block 2 refers to dynamic index 62.
        let second = [0x82, 0xbe];

        let mut decoder = HeaderDecoder::new();
        decoder.decode(&first).unwrap();
        let set = decoder.decode(&second).unwrap();
        assert_eq!(set.get("x-seq").map(|v| v.as_ref()), Some(&b"a"[..]));
    }

    #[test]
    fn out_of_order_block_fails() {
        let second = [0x82, 0xbe];
        let mut decoder = HeaderDecoder::new();
        assert!(decoder.decode(&second).is_err());
        assert_eq!(decoder.blocks_decoded(), 0);
    }

    #[test]
    fn truncated_block_fails() {
        // Literal with a 5-byte name but only 2 bytes present.
        let block = [0x40, 0x05, b'x', b'-'];
        let mut decoder = HeaderDecoder::new();
        assert!(decoder.decode(&block).is_err());
    }
}
