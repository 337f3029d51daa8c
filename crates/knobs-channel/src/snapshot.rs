use knobs_frame::{normalize, scale, ClampPolicy, KnobFrame};

use crate::error::{ChannelError, Result};

/// One complete, immutable set of knob values.
///
/// Snapshots are what the receiver publishes; a reader holding one sees a
/// single frame no matter how many arrive afterwards. Take one per render
/// pass when every knob must come from the same frame.
#[derive(Debug, Clone)]
pub struct KnobSnapshot {
    frame: KnobFrame,
    sequence: u64,
    clamp: ClampPolicy,
}

impl KnobSnapshot {
    pub(crate) fn new(frame: KnobFrame, sequence: u64, clamp: ClampPolicy) -> Self {
        Self {
            frame,
            sequence,
            clamp,
        }
    }

    /// All-zero snapshot, sequence 0.
    pub fn zeroed(capacity: usize, clamp: ClampPolicy) -> Self {
        Self::new(KnobFrame::zeroed(capacity), 0, clamp)
    }

    /// Number of knobs.
    pub fn capacity(&self) -> usize {
        self.frame.len()
    }

    /// Frames received in this session when the snapshot was taken; 0 until
    /// the first frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn clamp(&self) -> ClampPolicy {
        self.clamp
    }

    /// Raw byte for one knob.
    pub fn raw(&self, index: usize) -> Result<u8> {
        self.frame
            .raw(index)
            .ok_or_else(|| ChannelError::IndexOutOfBounds {
                index,
                capacity: self.capacity(),
            })
    }

    /// Knob value in `[0, 1]`.
    pub fn get(&self, index: usize) -> Result<f32> {
        self.get_range(index, 0.0, 1.0)
    }

    /// Knob value in `[0, max]`.
    pub fn get_to(&self, index: usize, max: f32) -> Result<f32> {
        self.get_range(index, 0.0, max)
    }

    /// Knob value in `[min, max]`.
    pub fn get_range(&self, index: usize, min: f32, max: f32) -> Result<f32> {
        let raw = self.raw(index)?;
        Ok(scale(raw, min, max, self.clamp))
    }

    /// Every knob in `[0, 1]`.
    pub fn normalized(&self) -> Vec<f32> {
        self.frame
            .as_bytes()
            .iter()
            .map(|&raw| normalize(raw, self.clamp))
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.frame.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(values: &[u8]) -> KnobSnapshot {
        KnobSnapshot::new(KnobFrame::new(values.to_vec()), 1, ClampPolicy::PassThrough)
    }

    #[test]
    fn zeroed_reads_zero() {
        let snap = KnobSnapshot::zeroed(6, ClampPolicy::PassThrough);
        assert_eq!(snap.sequence(), 0);
        for i in 0..6 {
            assert_eq!(snap.get(i).unwrap(), 0.0);
        }
    }

    #[test]
    fn three_forms_agree() {
        let snap = snapshot(&[127, 0, 64]);
        assert_eq!(snap.get(0).unwrap(), 1.0);
        assert_eq!(snap.get_to(0, 10.0).unwrap(), 10.0);
        assert_eq!(snap.get_range(0, -1.0, 1.0).unwrap(), 1.0);
        assert_eq!(snap.get_range(1, -1.0, 1.0).unwrap(), -1.0);
        assert!((snap.get_to(2, 127.0).unwrap() - 64.0).abs() < 1e-4);
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let snap = snapshot(&[1, 2, 3]);
        let err = snap.get(3).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::IndexOutOfBounds {
                index: 3,
                capacity: 3
            }
        ));
        assert!(snap.raw(usize::MAX).is_err());
    }

    #[test]
    fn clamp_policy_applies_to_reads() {
        let clamped = KnobSnapshot::new(KnobFrame::new(vec![200u8]), 1, ClampPolicy::Clamp);
        assert_eq!(clamped.get(0).unwrap(), 1.0);

        let raw = snapshot(&[200]);
        assert!(raw.get(0).unwrap() > 1.5);
        assert_eq!(raw.raw(0).unwrap(), 200);
    }

    #[test]
    fn normalized_lists_every_knob() {
        let snap = snapshot(&[0, 127]);
        assert_eq!(snap.normalized(), vec![0.0, 1.0]);
        assert_eq!(snap.as_bytes(), &[0, 127]);
    }
}
