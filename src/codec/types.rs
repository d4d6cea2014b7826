//! Codec parameter types
//!
//! Sample rate, bit depth and channel mode are each modelled as a small
//! enum plus a [`Mask`] over it. A capability carries any number of bits;
//! a committed configuration carries exactly one per field (bit depth may
//! also carry the 16|24 pair meaning "either depth accepted").

use std::fmt;
use std::marker::PhantomData;

/// A value that occupies one bit of a [`Mask`].
pub trait Flag: Copy + Eq + fmt::Debug + 'static {
    /// Every value, in bit order
    const ALL: &'static [Self];

    /// Selection order when no preference applies, best first
    const PRIORITY: &'static [Self];

    fn bit(self) -> u8;
}

/// Bitset over the values of a [`Flag`] type.
pub struct Mask<T: Flag> {
    bits: u8,
    _flag: PhantomData<T>,
}

impl<T: Flag> Mask<T> {
    pub const fn from_bits_unchecked(bits: u8) -> Self {
        Self {
            bits,
            _flag: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self::from_bits_unchecked(0)
    }

    /// Mask holding every known value
    pub fn all() -> Self {
        T::ALL.iter().copied().collect()
    }

    /// Build a mask from raw bits, discarding bits that name no value
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self::from_bits_unchecked(bits & Self::all().bits)
    }

    pub fn single(value: T) -> Self {
        Self::from_bits_unchecked(value.bit())
    }

    pub fn bits(self) -> u8 {
        self.bits
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn contains(self, value: T) -> bool {
        self.bits & value.bit() != 0
    }

    pub fn intersect(self, other: Self) -> Self {
        Self::from_bits_unchecked(self.bits & other.bits)
    }

    pub fn union(self, other: Self) -> Self {
        Self::from_bits_unchecked(self.bits | other.bits)
    }

    pub fn count(self) -> u32 {
        self.bits.count_ones()
    }

    /// The only value in the mask, if exactly one bit is set
    pub fn as_single(self) -> Option<T> {
        if self.count() != 1 {
            return None;
        }
        self.iter().next()
    }

    /// Highest-priority value present in the mask
    pub fn best(self) -> Option<T> {
        T::PRIORITY.iter().copied().find(|v| self.contains(*v))
    }

    pub fn iter(self) -> impl Iterator<Item = T> {
        T::ALL.iter().copied().filter(move |v| self.contains(*v))
    }
}

impl<T: Flag> Clone for Mask<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Flag> Copy for Mask<T> {}

impl<T: Flag> PartialEq for Mask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T: Flag> Eq for Mask<T> {}

impl<T: Flag> Default for Mask<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Flag> From<T> for Mask<T> {
    fn from(value: T) -> Self {
        Self::single(value)
    }
}

impl<T: Flag> FromIterator<T> for Mask<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let bits = iter.into_iter().fold(0u8, |acc, v| acc | v.bit());
        Self::from_bits_unchecked(bits)
    }
}

impl<T: Flag> fmt::Debug for Mask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Audio sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz88200,
    Hz96000,
}

impl SampleRate {
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz44100 => 44_100,
            Self::Hz48000 => 48_000,
            Self::Hz88200 => 88_200,
            Self::Hz96000 => 96_000,
        }
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = u32;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        match hz {
            44_100 => Ok(Self::Hz44100),
            48_000 => Ok(Self::Hz48000),
            88_200 => Ok(Self::Hz88200),
            96_000 => Ok(Self::Hz96000),
            other => Err(other),
        }
    }
}

impl Flag for SampleRate {
    const ALL: &'static [Self] = &[Self::Hz44100, Self::Hz48000, Self::Hz88200, Self::Hz96000];
    const PRIORITY: &'static [Self] = &[Self::Hz96000, Self::Hz88200, Self::Hz48000, Self::Hz44100];

    fn bit(self) -> u8 {
        match self {
            Self::Hz44100 => 0x01,
            Self::Hz48000 => 0x02,
            Self::Hz88200 => 0x04,
            Self::Hz96000 => 0x08,
        }
    }
}

/// PCM bits per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Bits16,
    Bits24,
}

impl BitDepth {
    pub fn bits(self) -> u8 {
        match self {
            Self::Bits16 => 16,
            Self::Bits24 => 24,
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(Self::Bits16),
            24 => Ok(Self::Bits24),
            other => Err(other),
        }
    }
}

impl Flag for BitDepth {
    const ALL: &'static [Self] = &[Self::Bits16, Self::Bits24];
    const PRIORITY: &'static [Self] = &[Self::Bits24, Self::Bits16];

    fn bit(self) -> u8 {
        match self {
            Self::Bits16 => 0x01,
            Self::Bits24 => 0x02,
        }
    }
}

/// Channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    Mono,
    Dual,
    Stereo,
}

impl ChannelMode {
    pub fn channel_count(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Dual | Self::Stereo => 2,
        }
    }
}

impl Flag for ChannelMode {
    const ALL: &'static [Self] = &[Self::Stereo, Self::Dual, Self::Mono];
    // Mono and dual are not offered by the encoder.
    const PRIORITY: &'static [Self] = &[Self::Stereo];

    fn bit(self) -> u8 {
        match self {
            Self::Stereo => 0x01,
            Self::Dual => 0x02,
            Self::Mono => 0x04,
        }
    }
}

pub type SampleRates = Mask<SampleRate>;
pub type BitDepths = Mask<BitDepth>;
pub type ChannelModes = Mask<ChannelMode>;

/// LHDC vendor identifier
pub const LHDC_VENDOR_ID: u32 = 0x0000_053A;

/// LHDC codec identifier within the vendor namespace
pub const LHDC_CODEC_ID: u16 = 0x484C;

/// Decoded LHDC Codec Information Element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cie {
    pub vendor_id: u32,
    pub codec_id: u16,
    pub sample_rate: SampleRates,
    pub bits_per_sample: BitDepths,
    pub channel_mode: ChannelModes,
}

impl Cie {
    /// An LHDC element with the given parameter masks
    pub fn lhdc(sample_rate: SampleRates, bits_per_sample: BitDepths, channel_mode: ChannelModes) -> Self {
        Self {
            vendor_id: LHDC_VENDOR_ID,
            codec_id: LHDC_CODEC_ID,
            sample_rate,
            bits_per_sample,
            channel_mode,
        }
    }

    /// An LHDC element with every parameter mask empty
    pub fn empty() -> Self {
        Self::lhdc(Mask::empty(), Mask::empty(), Mask::empty())
    }
}

/// Source codec capabilities advertised to peers
pub fn local_capability() -> Cie {
    Cie::lhdc(
        SampleRates::all(),
        BitDepths::all(),
        ChannelModes::single(ChannelMode::Stereo),
    )
}

/// Preferred configuration used as fallback during negotiation
pub fn default_config() -> Cie {
    Cie::lhdc(
        SampleRates::single(SampleRate::Hz96000),
        BitDepths::single(BitDepth::Bits24),
        ChannelModes::single(ChannelMode::Stereo),
    )
}

/// Externally visible codec configuration.
///
/// Used for the resolved configuration, the common and selectable
/// capability summaries, and for user / session audio preferences. An
/// empty mask means "unset". The four `codec_specific` fields are opaque
/// vendor extensions: field 1 selects the quality mode and field 2 the
/// latency mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecConfig {
    pub sample_rate: SampleRates,
    pub bits_per_sample: BitDepths,
    pub channel_mode: ChannelModes,
    pub codec_specific: [i64; 4],
}

impl CodecConfig {
    pub fn new(sample_rate: SampleRates, bits_per_sample: BitDepths, channel_mode: ChannelModes) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channel_mode,
            codec_specific: [0; 4],
        }
    }

    pub fn with_codec_specific(mut self, index: usize, value: i64) -> Self {
        if let Some(slot) = self.codec_specific.get_mut(index) {
            *slot = value;
        }
        self
    }

    /// Concrete sample rate, if exactly one is selected
    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.sample_rate.as_single()
    }

    /// Concrete bit depth, if exactly one is selected
    pub fn bit_depth(&self) -> Option<BitDepth> {
        self.bits_per_sample.as_single()
    }

    /// Concrete channel mode, if exactly one is selected
    pub fn channel_mode(&self) -> Option<ChannelMode> {
        self.channel_mode.as_single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_single_and_best() {
        let rates: SampleRates = [SampleRate::Hz44100, SampleRate::Hz48000].into_iter().collect();
        assert_eq!(rates.count(), 2);
        assert_eq!(rates.as_single(), None);
        assert_eq!(rates.best(), Some(SampleRate::Hz48000));

        let one = SampleRates::single(SampleRate::Hz88200);
        assert_eq!(one.as_single(), Some(SampleRate::Hz88200));
    }

    #[test]
    fn test_channel_priority_is_stereo_only() {
        let modes: ChannelModes = [ChannelMode::Mono, ChannelMode::Dual].into_iter().collect();
        assert_eq!(modes.best(), None);
        assert_eq!(ChannelModes::all().best(), Some(ChannelMode::Stereo));
    }

    #[test]
    fn test_from_bits_truncate() {
        let depths = BitDepths::from_bits_truncate(0xFF);
        assert_eq!(depths, BitDepths::all());
    }

    #[test]
    fn test_sample_rate_conversion() {
        assert_eq!(SampleRate::try_from(88_200), Ok(SampleRate::Hz88200));
        assert_eq!(SampleRate::try_from(32_000), Err(32_000));
        assert_eq!(SampleRate::Hz96000.hz(), 96_000);
    }
}
