//! Test data builders for raw acquisition buffers

use curvebug_rs::tracer::encode_words;
use curvebug_rs::types::{FRAME_BYTES, POINTS_PER_CHANNEL};

type Channel = Box<dyn Fn(usize) -> u16>;

/// Builder for raw tracer buffers
///
/// Each channel is a function of the point index; the default is a flat
/// mid-scale level on every channel.
pub struct FrameBuilder {
    drive: Channel,
    dut1: Channel,
    dut2: Channel,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            drive: Box::new(|_| 2048),
            dut1: Box::new(|_| 2048),
            dut2: Box::new(|_| 2048),
        }
    }

    pub fn drive(mut self, f: impl Fn(usize) -> u16 + 'static) -> Self {
        self.drive = Box::new(f);
        self
    }

    pub fn dut1(mut self, f: impl Fn(usize) -> u16 + 'static) -> Self {
        self.dut1 = Box::new(f);
        self
    }

    pub fn dut2(mut self, f: impl Fn(usize) -> u16 + 'static) -> Self {
        self.dut2 = Box::new(f);
        self
    }

    /// Interleaved little-endian bytes, sync flag on the first word
    pub fn build(self) -> Vec<u8> {
        let mut words = Vec::with_capacity(POINTS_PER_CHANNEL * 3);
        for i in 0..POINTS_PER_CHANNEL {
            words.push((self.drive)(i));
            words.push((self.dut1)(i));
            words.push((self.dut2)(i));
        }
        let bytes = encode_words(&words);
        debug_assert_eq!(bytes.len(), FRAME_BYTES);
        bytes
    }
}

/// Linear ramp from `start` to `end` across one channel
pub fn ramp(start: u16, end: u16) -> impl Fn(usize) -> u16 {
    move |i| {
        let t = i as f64 / (POINTS_PER_CHANNEL - 1) as f64;
        (f64::from(start) + (f64::from(end) - f64::from(start)) * t).round() as u16
    }
}

/// Same value at every point
pub fn flat(level: u16) -> impl Fn(usize) -> u16 {
    move |_| level
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvebug_rs::tracer::decode_frame;

    #[test]
    fn test_frame_builder() {
        let bytes = FrameBuilder::new().drive(ramp(1000, 3000)).dut1(flat(500)).build();
        let frame = decode_frame(&bytes).unwrap();

        assert_eq!(frame.drive()[0], 1000);
        assert_eq!(frame.drive()[POINTS_PER_CHANNEL - 1], 3000);
        assert!(frame.sync_flag());
    }
}
