//! Feeding clock
//!
//! Converts caller-supplied tick timestamps into a count of encoder
//! blocks due. Bytes are accumulated exactly: the sub-byte remainder of
//! every tick is carried over, so throughput over any run of ticks stays
//! at the configured PCM rate regardless of tick jitter.

use tracing::trace;

use crate::constants::{ENCODER_BLOCK_SAMPLES, ENCODER_INTERVAL_MS, ENCODER_INTERVAL_US};

/// PCM parameters the clock paces against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedingParams {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channel_count: u16,
}

impl FeedingParams {
    pub fn new(sample_rate: u32, bits_per_sample: u8, channel_count: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channel_count,
        }
    }

    /// Bytes of one interleaved sample frame
    pub fn bytes_per_sample_frame(&self) -> usize {
        usize::from(self.bits_per_sample / 8) * usize::from(self.channel_count)
    }

    /// PCM bytes consumed per nominal tick
    pub fn bytes_per_tick(&self) -> u64 {
        u64::from(self.sample_rate) * self.bytes_per_sample_frame() as u64 * ENCODER_INTERVAL_MS / 1000
    }

    /// PCM bytes of one encoder block
    pub fn bytes_per_frame(&self) -> usize {
        ENCODER_BLOCK_SAMPLES * self.bytes_per_sample_frame()
    }
}

/// Accumulator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedingState {
    /// Whole bytes accumulated and not yet consumed by a block
    pub counter: u64,
    pub bytes_per_tick: u64,
    /// Timestamp of the previous tick
    pub last_tick_us: Option<u64>,
    /// Sub-byte remainder, in units of 1 / tick interval (us)
    pub residual: u64,
}

/// Tick-driven pacing for encoder blocks
#[derive(Debug, Clone, Default)]
pub struct FeedingClock {
    params: FeedingParams,
    state: FeedingState,
}

impl FeedingClock {
    pub fn new(params: FeedingParams) -> Self {
        let mut clock = Self::default();
        clock.reset(params);
        clock
    }

    /// Reconfigure and zero the accumulator and last tick
    pub fn reset(&mut self, params: FeedingParams) {
        self.params = params;
        self.state = FeedingState {
            bytes_per_tick: params.bytes_per_tick(),
            ..FeedingState::default()
        };
        trace!(bytes_per_tick = self.state.bytes_per_tick, "feeding reset");
    }

    /// Drop pending bytes, keeping the tick reference
    pub fn flush(&mut self) {
        self.state.counter = 0;
        self.state.residual = 0;
    }

    /// Number of encoder blocks due at `now_us`.
    ///
    /// The first tick after a reset counts as one nominal interval. A
    /// timestamp earlier than the previous tick counts as no elapsed time.
    pub fn frames_due(&mut self, now_us: u64) -> u32 {
        let elapsed = match self.state.last_tick_us {
            Some(last) => now_us.saturating_sub(last),
            None => ENCODER_INTERVAL_US,
        };
        self.state.last_tick_us = Some(now_us);

        let numerator =
            u128::from(self.state.bytes_per_tick) * u128::from(elapsed) + u128::from(self.state.residual);
        let interval = u128::from(ENCODER_INTERVAL_US);
        let whole = u64::try_from(numerator / interval).unwrap_or(u64::MAX);
        self.state.residual = (numerator % interval) as u64;
        self.state.counter = self.state.counter.saturating_add(whole);

        let per_frame = self.params.bytes_per_frame() as u64;
        if per_frame == 0 {
            return 0;
        }
        let frames = self.state.counter / per_frame;
        self.state.counter -= frames * per_frame;

        trace!(elapsed, frames, counter = self.state.counter, "frames due");
        u32::try_from(frames).unwrap_or(u32::MAX)
    }

    /// Give back the byte budget of frames that were due but not produced
    pub fn credit(&mut self, frames: u32) {
        let bytes = u64::from(frames) * self.params.bytes_per_frame() as u64;
        self.state.counter = self.state.counter.saturating_add(bytes);
    }

    pub fn params(&self) -> &FeedingParams {
        &self.params
    }

    pub fn state(&self) -> &FeedingState {
        &self.state
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.params.bytes_per_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stereo_16(rate: u32) -> FeedingParams {
        FeedingParams::new(rate, 16, 2)
    }

    #[test]
    fn test_bytes_per_tick() {
        assert_eq!(stereo_16(48_000).bytes_per_tick(), 3840);
        assert_eq!(stereo_16(44_100).bytes_per_tick(), 3528);
        assert_eq!(FeedingParams::new(96_000, 24, 2).bytes_per_tick(), 11_520);
        assert_eq!(stereo_16(48_000).bytes_per_frame(), 2048);
    }

    #[test]
    fn test_counter_stays_below_one_frame() {
        let mut clock = FeedingClock::new(stereo_16(48_000));
        let mut now = 0;
        let mut total = 0u32;
        for _ in 0..50 {
            now += ENCODER_INTERVAL_US;
            total += clock.frames_due(now);
            assert!(clock.state().counter < clock.bytes_per_frame() as u64);
        }
        // 50 ticks = 1 s = 48000 samples = 93.75 blocks
        assert_eq!(total, 93);
    }

    #[test]
    fn test_first_tick_is_nominal() {
        let mut clock = FeedingClock::new(stereo_16(48_000));
        assert_eq!(clock.frames_due(1_000_000_000), 1);
        assert_eq!(clock.state().counter, 3840 - 2048);
    }

    #[test]
    fn test_backwards_time_adds_nothing() {
        let mut clock = FeedingClock::new(stereo_16(48_000));
        clock.frames_due(100_000);
        let counter = clock.state().counter;
        assert_eq!(clock.frames_due(50_000), 0);
        assert_eq!(clock.state().counter, counter);
    }

    #[test]
    fn test_flush_and_credit() {
        let mut clock = FeedingClock::new(stereo_16(48_000));
        clock.frames_due(0);
        clock.credit(3);
        assert_eq!(clock.state().counter, 3840 - 2048 + 3 * 2048);

        clock.flush();
        assert_eq!(clock.state().counter, 0);
        assert_eq!(clock.state().last_tick_us, Some(0));
    }

    #[test]
    fn test_unconfigured_clock_yields_nothing() {
        let mut clock = FeedingClock::default();
        assert_eq!(clock.frames_due(20_000), 0);
    }

    proptest! {
        #[test]
        fn test_drift_is_bounded(
            rate in prop::sample::select(vec![44_100u32, 48_000, 88_200, 96_000]),
            bits in prop::sample::select(vec![16u8, 24]),
            gaps in prop::collection::vec(1u64..100_000, 1..200),
        ) {
            let params = FeedingParams::new(rate, bits, 2);
            let mut clock = FeedingClock::new(params);
            let per_frame = params.bytes_per_frame() as u128;

            let mut now = 1_000u64;
            let mut frames = u128::from(clock.frames_due(now));
            let mut elapsed = u128::from(ENCODER_INTERVAL_US);
            for gap in gaps {
                now += gap;
                elapsed += u128::from(gap);
                frames += u128::from(clock.frames_due(now));
            }

            let expected = u128::from(params.bytes_per_tick()) * elapsed / u128::from(ENCODER_INTERVAL_US);
            let produced = frames * per_frame;
            prop_assert!(produced <= expected);
            prop_assert!(expected - produced < per_frame);
        }
    }
}
