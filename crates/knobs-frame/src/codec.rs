use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Default knob count.
pub const DEFAULT_CAPACITY: usize = 24;

/// One complete set of raw knob values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnobFrame {
    /// Raw values, one byte per knob, in knob order.
    pub values: Bytes,
}

impl KnobFrame {
    /// Create a new frame.
    pub fn new(values: impl Into<Bytes>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// A frame of `capacity` knobs all at zero.
    pub fn zeroed(capacity: usize) -> Self {
        Self::new(vec![0u8; capacity])
    }

    /// Number of knobs in the frame.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of one knob, or `None` past the end.
    pub fn raw(&self, index: usize) -> Option<u8> {
        self.values.get(index).copied()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.values.as_ref()
    }
}

/// What the reader does with a receive that returns fewer than `capacity` bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortReadPolicy {
    /// Buffer partial receipts and publish only once `capacity` bytes arrived.
    #[default]
    Accumulate,
    /// Publish the whole receive buffer after any non-empty receive, even if
    /// only part of it was refreshed. Matches the legacy clients.
    Overwrite,
}

/// Split one complete frame off the front of a buffer.
///
/// Returns `None` if fewer than `capacity` bytes are buffered yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, capacity: usize) -> Option<KnobFrame> {
    if capacity == 0 || src.len() < capacity {
        return None;
    }
    Some(KnobFrame::new(src.split_to(capacity).freeze()))
}

/// Configuration for frame reading.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Knobs per frame. Default: 24.
    pub capacity: usize,
    /// Partial receive handling. Default: accumulate.
    pub short_read: ShortReadPolicy,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            short_read: ShortReadPolicy::default(),
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_needs_full_capacity() {
        let mut buf = BytesMut::from(&[1u8, 2, 3][..]);
        assert!(decode_frame(&mut buf, 4).is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn decode_splits_exactly_one_frame() {
        let mut buf = BytesMut::from(&[1u8, 2, 3, 4, 5, 6][..]);

        let frame = decode_frame(&mut buf, 4).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(buf.as_ref(), &[5, 6]);
    }

    #[test]
    fn decode_zero_capacity_never_yields() {
        let mut buf = BytesMut::from(&[1u8][..]);
        assert!(decode_frame(&mut buf, 0).is_none());
    }

    #[test]
    fn zeroed_frame_reads_zero() {
        let frame = KnobFrame::zeroed(8);
        assert_eq!(frame.len(), 8);
        assert!((0..8).all(|i| frame.raw(i) == Some(0)));
        assert_eq!(frame.raw(8), None);
    }

    #[test]
    fn short_read_policy_defaults_to_accumulate() {
        assert_eq!(ShortReadPolicy::default(), ShortReadPolicy::Accumulate);
        assert_eq!(FrameConfig::default().capacity, DEFAULT_CAPACITY);
    }
}
