//! EEG sample frame decoding.
//!
//! ```text
//! ┌──────┬────────┬───────────┬─────────────────────────────────┐
//! │ 0x04 │ Length │ Index     │ Samples (repeating 8-byte stride)│
//! │ 1 B  │ 1 B    │ uint16 LE │ ch1 int32 LE │ ch2 int32 LE      │
//! └──────┴────────┴───────────┴─────────────────────────────────┘
//! ```
//!
//! A trailing partial stride is dropped without error.

use serde::{Deserialize, Serialize};

use crate::error::{NeocoreError, Result};

/// Bytes before the first sample stride.
pub const EEG_HEADER_SIZE: usize = 4;

/// One sample per channel.
pub const EEG_STRIDE: usize = 8;

/// How the embedded length byte is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Ignore the length byte and trust the buffer.
    #[default]
    Lenient,
    /// Reject frames whose length byte differs from the sample bytes present.
    ///
    /// The byte cannot describe more than 255 sample bytes; longer frames are
    /// accepted without the check.
    Strict,
}

/// One decoded EEG frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EegPacket {
    /// Device frame counter (wraps at 65535).
    pub index: u16,
    /// Channel 1 samples, in arrival order.
    pub channel1: Vec<i32>,
    /// Channel 2 samples, same length as `channel1`.
    pub channel2: Vec<i32>,
}

impl EegPacket {
    /// Samples per channel.
    #[inline]
    pub fn len(&self) -> usize {
        self.channel1.len()
    }

    /// True when the frame carried no complete stride.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channel1.is_empty()
    }

    /// Iterate `(channel1, channel2)` sample pairs.
    pub fn samples(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.channel1.iter().copied().zip(self.channel2.iter().copied())
    }
}

/// Decode an EEG frame, ignoring the length byte.
///
/// # Example
///
/// ```
/// use neocore_client::protocol::decode_eeg;
///
/// let frame = [0x04, 0x08, 0x01, 0x00, 0x01, 0, 0, 0, 0x02, 0, 0, 0];
/// let packet = decode_eeg(&frame).unwrap();
/// assert_eq!(packet.index, 1);
/// assert_eq!(packet.channel1, vec![1]);
/// assert_eq!(packet.channel2, vec![2]);
/// ```
pub fn decode_eeg(frame: &[u8]) -> Result<EegPacket> {
    decode_eeg_with(frame, LengthPolicy::Lenient)
}

/// Decode an EEG frame under the given length policy.
pub fn decode_eeg_with(frame: &[u8], policy: LengthPolicy) -> Result<EegPacket> {
    if frame.len() < EEG_HEADER_SIZE {
        return Err(NeocoreError::TooShort {
            expected: EEG_HEADER_SIZE,
            actual: frame.len(),
        });
    }

    let samples = &frame[EEG_HEADER_SIZE..];
    if policy == LengthPolicy::Strict
        && samples.len() <= usize::from(u8::MAX)
        && usize::from(frame[1]) != samples.len()
    {
        return Err(NeocoreError::LengthMismatch {
            declared: frame[1].into(),
            actual: samples.len(),
        });
    }

    let index = u16::from_le_bytes([frame[2], frame[3]]);
    let strides = samples.chunks_exact(EEG_STRIDE);
    let mut channel1 = Vec::with_capacity(strides.len());
    let mut channel2 = Vec::with_capacity(strides.len());
    for stride in strides {
        channel1.push(i32::from_le_bytes([stride[0], stride[1], stride[2], stride[3]]));
        channel2.push(i32::from_le_bytes([stride[4], stride[5], stride[6], stride[7]]));
    }

    Ok(EegPacket {
        index,
        channel1,
        channel2,
    })
}

/// Detects dropped EEG frames from the 16-bit index.
///
/// Indices are expected to advance by one per frame. Duplicates and frames
/// that arrive behind the last seen index never count as gaps and never move
/// the anchor.
#[derive(Debug, Default, Clone)]
pub struct IndexTracker {
    last: Option<u16>,
}

/// Backward deltas larger than this are treated as counter wrap.
const WRAP_WINDOW: u16 = 0x1000;

impl IndexTracker {
    /// Create a tracker with no anchor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `index`; returns how many frames went missing before it.
    pub fn observe(&mut self, index: u16) -> Option<u16> {
        let Some(last) = self.last else {
            self.last = Some(index);
            return None;
        };

        let delta = index.wrapping_sub(last);
        if delta == 0 || delta > u16::MAX - WRAP_WINDOW {
            // duplicate or late
            return None;
        }

        self.last = Some(index);
        (delta > 1).then(|| delta - 1)
    }

    /// Forget the anchor (e.g. after reconnecting).
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u16, pairs: &[(i32, i32)], trailing: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x04, (pairs.len() * EEG_STRIDE + trailing.len()) as u8];
        buf.extend_from_slice(&index.to_le_bytes());
        for (a, b) in pairs {
            buf.extend_from_slice(&a.to_le_bytes());
            buf.extend_from_slice(&b.to_le_bytes());
        }
        buf.extend_from_slice(trailing);
        buf
    }

    #[test]
    fn test_header_only_frame() {
        let packet = decode_eeg(&[0x04, 0x00, 0x05, 0x00]).unwrap();
        assert_eq!(packet.index, 5);
        assert!(packet.channel1.is_empty());
        assert!(packet.channel2.is_empty());
        assert!(packet.is_empty());
    }

    #[test]
    fn test_single_stride() {
        let bytes = [0x04, 0x08, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        let packet = decode_eeg(&bytes).unwrap();
        assert_eq!(packet.index, 1);
        assert_eq!(packet.channel1, vec![1]);
        assert_eq!(packet.channel2, vec![2]);
    }

    #[test]
    fn test_trailing_partial_stride_dropped() {
        let bytes = frame(9, &[(10, -10)], &[0xAA, 0xBB]);
        assert_eq!(bytes.len(), EEG_HEADER_SIZE + 10);
        let packet = decode_eeg(&bytes).unwrap();
        assert_eq!(packet.len(), 1);
        assert_eq!(packet.samples().collect::<Vec<_>>(), vec![(10, -10)]);
    }

    #[test]
    fn test_signed_little_endian_samples() {
        let pairs = [(i32::MIN, i32::MAX), (-1, 0), (0x0102_0304, -0x0102_0304)];
        let packet = decode_eeg(&frame(0xBEEF, &pairs, &[])).unwrap();
        assert_eq!(packet.index, 0xBEEF);
        assert_eq!(packet.channel1, vec![i32::MIN, -1, 0x0102_0304]);
        assert_eq!(packet.channel2, vec![i32::MAX, 0, -0x0102_0304]);
    }

    #[test]
    fn test_too_short() {
        for len in 0..EEG_HEADER_SIZE {
            let err = decode_eeg(&[0x04, 0, 0, 0][..len]).unwrap_err();
            assert!(matches!(err, NeocoreError::TooShort { expected: 4, actual } if actual == len));
        }
    }

    #[test]
    fn test_lenient_ignores_length_byte() {
        let mut bytes = frame(3, &[(1, 2), (3, 4)], &[]);
        bytes[1] = 0xFF;
        assert_eq!(decode_eeg(&bytes).unwrap().len(), 2);
    }

    #[test]
    fn test_strict_length_check() {
        let good = frame(3, &[(1, 2)], &[0x00]);
        assert_eq!(decode_eeg_with(&good, LengthPolicy::Strict).unwrap().len(), 1);

        let mut bad = good.clone();
        bad[1] = 16;
        assert!(matches!(
            decode_eeg_with(&bad, LengthPolicy::Strict),
            Err(NeocoreError::LengthMismatch { declared: 16, actual: 9 })
        ));
    }

    #[test]
    fn test_strict_accepts_frames_beyond_length_byte() {
        // 32 strides = 256 sample bytes, one more than the byte can hold
        let pairs: Vec<(i32, i32)> = (0..32).map(|i| (i, -i)).collect();
        let bytes = frame(1, &pairs, &[]);
        assert_eq!(bytes[1], 0);
        let packet = decode_eeg_with(&bytes, LengthPolicy::Strict).unwrap();
        assert_eq!(packet.len(), 32);
        assert_eq!(packet.channel2[31], -31);
    }

    #[test]
    fn test_index_tracker_gaps() {
        let mut tracker = IndexTracker::new();
        assert_eq!(tracker.observe(10), None);
        assert_eq!(tracker.observe(11), None);
        assert_eq!(tracker.observe(14), Some(2));
        // duplicate and late frames
        assert_eq!(tracker.observe(14), None);
        assert_eq!(tracker.observe(12), None);
        assert_eq!(tracker.observe(15), None);
    }

    #[test]
    fn test_index_tracker_wraps() {
        let mut tracker = IndexTracker::new();
        tracker.observe(0xFFFE);
        assert_eq!(tracker.observe(0xFFFF), None);
        assert_eq!(tracker.observe(0x0001), Some(1));

        tracker.reset();
        assert_eq!(tracker.observe(500), None);
    }
}
