//! Acquisition frame decoder
//!
//! Turns one raw acquisition buffer into three channel sequences:
//!
//! - CH0: drive/reference voltage
//! - CH1: DUT1 voltage (black lead)
//! - CH2: DUT2 voltage (red lead)
//!
//! Every 16-bit little-endian word is masked to 12 bits, which also strips the
//! sync flag carried on the first word. Values are not range-checked; any
//! 12-bit code is a valid ADC reading. The per-DUT current (`drive - dut`) is
//! derived once here and cached on the [`Frame`].

use crate::error::DecodeError;
use crate::types::{
    DutId, CHANNEL_COUNT, FRAME_BYTES, FRAME_SAMPLES, POINTS_PER_CHANNEL, SAMPLE_MASK, SYNC_FLAG,
};

/// One decoded acquisition cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    drive: Vec<u16>,
    dut1: Vec<u16>,
    dut2: Vec<u16>,
    current1: Vec<i32>,
    current2: Vec<i32>,
    sync_flag: bool,
}

impl Frame {
    /// Build a frame from already de-interleaved channels
    ///
    /// Fails with [`DecodeError::SampleCountMismatch`] unless every channel
    /// holds exactly [`POINTS_PER_CHANNEL`] samples.
    pub fn from_channels(
        drive: Vec<u16>,
        dut1: Vec<u16>,
        dut2: Vec<u16>,
    ) -> Result<Self, DecodeError> {
        if [&drive, &dut1, &dut2]
            .iter()
            .any(|channel| channel.len() != POINTS_PER_CHANNEL)
        {
            return Err(DecodeError::SampleCountMismatch {
                expected: FRAME_SAMPLES,
                actual: drive.len() + dut1.len() + dut2.len(),
            });
        }

        let current1 = derive_current(&drive, &dut1);
        let current2 = derive_current(&drive, &dut2);

        Ok(Self {
            drive,
            dut1,
            dut2,
            current1,
            current2,
            sync_flag: false,
        })
    }

    /// Drive/reference voltage (CH0)
    pub fn drive(&self) -> &[u16] {
        &self.drive
    }

    /// Voltage across the given DUT (CH1 or CH2)
    pub fn voltage(&self, dut: DutId) -> &[u16] {
        match dut {
            DutId::Dut1 => &self.dut1,
            DutId::Dut2 => &self.dut2,
        }
    }

    /// Current through the given DUT, proportional to `drive - dut`
    pub fn current(&self, dut: DutId) -> &[i32] {
        match dut {
            DutId::Dut1 => &self.current1,
            DutId::Dut2 => &self.current2,
        }
    }

    /// Points per channel
    pub fn len(&self) -> usize {
        self.drive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drive.is_empty()
    }

    /// Whether the first word carried the sync flag
    pub fn sync_flag(&self) -> bool {
        self.sync_flag
    }

    /// (voltage, current) pairs for one DUT in acquisition order
    pub fn iv_points(&self, dut: DutId) -> impl Iterator<Item = (u16, i32)> + '_ {
        self.voltage(dut)
            .iter()
            .copied()
            .zip(self.current(dut).iter().copied())
    }
}

fn derive_current(drive: &[u16], dut: &[u16]) -> Vec<i32> {
    drive
        .iter()
        .zip(dut)
        .map(|(&d, &v)| i32::from(d) - i32::from(v))
        .collect()
}

/// Decoder for fixed-size acquisition buffers
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            frame_bytes: FRAME_BYTES,
        }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder that expects a different buffer size
    ///
    /// Buffers of that size still have to yield exactly [`FRAME_SAMPLES`]
    /// samples, so any size other than [`FRAME_BYTES`] produces
    /// [`DecodeError::SampleCountMismatch`].
    pub fn with_frame_size(frame_bytes: usize) -> Self {
        Self { frame_bytes }
    }

    /// Expected buffer size in bytes
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Decode one buffer
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame, DecodeError> {
        if bytes.len() != self.frame_bytes {
            return Err(DecodeError::SizeMismatch {
                expected: self.frame_bytes,
                actual: bytes.len(),
            });
        }

        let words: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        if words.len() != FRAME_SAMPLES {
            return Err(DecodeError::SampleCountMismatch {
                expected: FRAME_SAMPLES,
                actual: words.len(),
            });
        }

        let sync_flag = words.first().is_some_and(|w| w & SYNC_FLAG != 0);
        if !sync_flag {
            tracing::trace!("Frame arrived without sync flag on first word");
        }

        let points = FRAME_SAMPLES / CHANNEL_COUNT;
        let mut drive = Vec::with_capacity(points);
        let mut dut1 = Vec::with_capacity(points);
        let mut dut2 = Vec::with_capacity(points);

        for (i, word) in words.iter().enumerate() {
            let sample = word & SAMPLE_MASK;
            match i % CHANNEL_COUNT {
                0 => drive.push(sample),
                1 => dut1.push(sample),
                _ => dut2.push(sample),
            }
        }

        let mut frame = Frame::from_channels(drive, dut1, dut2)?;
        frame.sync_flag = sync_flag;
        Ok(frame)
    }
}

/// Decode a buffer with the standard frame size
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, DecodeError> {
    FrameDecoder::default().decode(bytes)
}

/// Encode interleaved sample words the way the tracer sends them
///
/// The sync flag is set on the first word. Used by the mock tracer and tests.
pub fn encode_words(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for (i, &word) in words.iter().enumerate() {
        let word = if i == 0 { word | SYNC_FLAG } else { word };
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::POINTS_PER_CHANNEL;
    use proptest::prelude::*;

    fn sequential_buffer() -> Vec<u8> {
        let words: Vec<u16> = (0..FRAME_SAMPLES as u16).collect();
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_deinterleave_sequential() {
        let frame = decode_frame(&sequential_buffer()).unwrap();

        assert_eq!(frame.len(), POINTS_PER_CHANNEL);
        assert_eq!(&frame.drive()[..3], &[0, 3, 6]);
        assert_eq!(&frame.voltage(DutId::Dut1)[..3], &[1, 4, 7]);
        assert_eq!(&frame.voltage(DutId::Dut2)[..3], &[2, 5, 8]);
        assert_eq!(frame.voltage(DutId::Dut1).len(), POINTS_PER_CHANNEL);
        assert_eq!(frame.voltage(DutId::Dut2).len(), POINTS_PER_CHANNEL);
        assert_eq!(*frame.drive().last().unwrap(), 1005);
        assert!(!frame.sync_flag());
    }

    #[test]
    fn test_masking() {
        let mut bytes = vec![0u8; FRAME_BYTES];
        bytes[0..2].copy_from_slice(&0x8FFFu16.to_le_bytes());
        bytes[2..4].copy_from_slice(&0x0000u16.to_le_bytes());
        bytes[4..6].copy_from_slice(&0xF123u16.to_le_bytes());

        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.drive()[0], 0x0FFF);
        assert_eq!(frame.voltage(DutId::Dut1)[0], 0);
        assert_eq!(frame.voltage(DutId::Dut2)[0], 0x0123);
        assert!(frame.sync_flag());
    }

    #[test]
    fn test_current_is_drive_minus_dut() {
        let mut words = vec![0u16; FRAME_SAMPLES];
        words[0] = 3000;
        words[1] = 1000;
        words[2] = 3500;
        let frame = decode_frame(&encode_words(&words)).unwrap();

        assert_eq!(frame.current(DutId::Dut1)[0], 2000);
        assert_eq!(frame.current(DutId::Dut2)[0], -500);
        assert_eq!(frame.iv_points(DutId::Dut1).next(), Some((1000, 2000)));
    }

    #[test]
    fn test_size_mismatch() {
        for len in [0, 1, 2014, 2015, 2017, 4032] {
            let err = decode_frame(&vec![0u8; len]).unwrap_err();
            assert_eq!(
                err,
                DecodeError::SizeMismatch {
                    expected: FRAME_BYTES,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn test_sample_count_mismatch_with_other_frame_size() {
        let decoder = FrameDecoder::with_frame_size(2022);
        let err = decoder.decode(&vec![0u8; 2022]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::SampleCountMismatch {
                expected: FRAME_SAMPLES,
                actual: 1011
            }
        );
    }

    #[test]
    fn test_from_channels_rejects_uneven_lengths() {
        let n = POINTS_PER_CHANNEL;
        let result = Frame::from_channels(vec![0; n], vec![0; n], vec![0; n - 1]);
        assert!(matches!(
            result,
            Err(DecodeError::SampleCountMismatch { .. })
        ));
    }

    #[test]
    fn test_from_channels_requires_full_frame() {
        for n in [0, 2, POINTS_PER_CHANNEL + 1] {
            assert_eq!(
                Frame::from_channels(vec![0; n], vec![0; n], vec![0; n]),
                Err(DecodeError::SampleCountMismatch {
                    expected: FRAME_SAMPLES,
                    actual: 3 * n
                })
            );
        }
        let frame = Frame::from_channels(
            vec![0; POINTS_PER_CHANNEL],
            vec![0; POINTS_PER_CHANNEL],
            vec![0; POINTS_PER_CHANNEL],
        );
        assert_eq!(frame.map(|f| f.len()), Ok(POINTS_PER_CHANNEL));
    }

    #[test]
    fn test_encode_sets_sync_flag() {
        let bytes = encode_words(&[0x0123, 0x0456]);
        assert_eq!(bytes, vec![0x23, 0x81, 0x56, 0x04]);
    }

    proptest! {
        #[test]
        fn test_decode_is_deterministic(bytes in prop::collection::vec(any::<u8>(), FRAME_BYTES)) {
            let a = decode_frame(&bytes).unwrap();
            let b = decode_frame(&bytes).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn test_exact_size_never_miscounts(
            bytes in prop::collection::vec(any::<u8>(), FRAME_BYTES)
        ) {
            let frame = decode_frame(&bytes).unwrap();
            prop_assert_eq!(frame.len(), POINTS_PER_CHANNEL);
            prop_assert!(frame.drive().iter().all(|&s| s <= SAMPLE_MASK));
            prop_assert!(frame.voltage(DutId::Dut1).iter().all(|&s| s <= SAMPLE_MASK));
            prop_assert!(frame.voltage(DutId::Dut2).iter().all(|&s| s <= SAMPLE_MASK));
        }

        #[test]
        fn test_wrong_size_always_size_mismatch(len in 0usize..5000) {
            prop_assume!(len != FRAME_BYTES);
            let result = decode_frame(&vec![0u8; len]);
            prop_assert!(
                matches!(result, Err(DecodeError::SizeMismatch { .. })),
                "expected SizeMismatch, got {:?}",
                result
            );
        }
    }
}
