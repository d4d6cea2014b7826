//! LHDC Codec Information Element wire format
//!
//! ```text
//! [0] LOSC = 9
//! [1] media type << 4          (audio = 0x0)
//! [2] media codec type         (0xFF, vendor specific)
//! [3..=6] vendor id, LE        (0x0000053A)
//! [7..=8] codec id, LE         (0x484C)
//! [9] sample rate | bit depth
//! ```
//!
//! Channel mode is not carried on the wire; LHDC streams are stereo.

use tracing::debug;

use crate::codec::types::{
    BitDepth, BitDepths, ChannelMode, ChannelModes, Cie, Flag, SampleRate, SampleRates, LHDC_CODEC_ID,
    LHDC_VENDOR_ID,
};
use crate::error::CieError;

/// Length octet value (bytes following it)
pub const CODEC_LEN: u8 = 9;

/// Full element size including the length octet
pub const CODEC_INFO_SIZE: usize = CODEC_LEN as usize + 1;

/// AVDTP audio media type
pub const MEDIA_TYPE_AUDIO: u8 = 0x00;

/// Media codec type for non-A2DP (vendor) codecs
pub const MEDIA_CT_NON_A2DP: u8 = 0xFF;

pub const SAMPLING_FREQ_MASK: u8 = 0x27;
pub const SAMPLING_FREQ_44100: u8 = 0x04;
pub const SAMPLING_FREQ_48000: u8 = 0x02;
pub const SAMPLING_FREQ_88200: u8 = 0x20;
pub const SAMPLING_FREQ_96000: u8 = 0x01;

pub const BIT_FMT_MASK: u8 = 0x18;
pub const BIT_FMT_24: u8 = 0x08;
pub const BIT_FMT_16: u8 = 0x10;

/// Encoded element as exchanged during capability negotiation
pub type CodecInfo = [u8; CODEC_INFO_SIZE];

fn sample_rate_to_wire(rate: SampleRate) -> u8 {
    match rate {
        SampleRate::Hz44100 => SAMPLING_FREQ_44100,
        SampleRate::Hz48000 => SAMPLING_FREQ_48000,
        SampleRate::Hz88200 => SAMPLING_FREQ_88200,
        SampleRate::Hz96000 => SAMPLING_FREQ_96000,
    }
}

fn sample_rates_to_wire(rates: SampleRates) -> u8 {
    rates.iter().fold(0, |acc, r| acc | sample_rate_to_wire(r))
}

fn sample_rates_from_wire(octet: u8) -> SampleRates {
    SampleRate::ALL
        .iter()
        .copied()
        .filter(|r| octet & sample_rate_to_wire(*r) != 0)
        .collect()
}

fn bit_depth_to_wire(depths: BitDepths) -> u8 {
    let mut bits = 0;
    if depths.contains(BitDepth::Bits24) {
        bits |= BIT_FMT_24;
    }
    if depths.contains(BitDepth::Bits16) {
        bits |= BIT_FMT_16;
    }
    bits
}

fn bit_depth_from_wire(octet: u8) -> Result<BitDepths, CieError> {
    match octet & BIT_FMT_MASK {
        BIT_FMT_24 => Ok(BitDepths::single(BitDepth::Bits24)),
        BIT_FMT_16 => Ok(BitDepths::single(BitDepth::Bits16)),
        BIT_FMT_MASK => Ok(BitDepths::all()),
        _ => Err(CieError::WrongCodec),
    }
}

/// Serialize `cie` into the 10-byte element.
///
/// Fails with `InvalidParams` when neither a sample rate nor a bit depth
/// is selected.
pub fn encode(cie: &Cie) -> Result<CodecInfo, CieError> {
    let mut out = [0u8; CODEC_INFO_SIZE];
    out[0] = CODEC_LEN;
    out[1] = MEDIA_TYPE_AUDIO << 4;
    out[2] = MEDIA_CT_NON_A2DP;
    out[3..7].copy_from_slice(&cie.vendor_id.to_le_bytes());
    out[7..9].copy_from_slice(&cie.codec_id.to_le_bytes());

    let para = sample_rates_to_wire(cie.sample_rate) | bit_depth_to_wire(cie.bits_per_sample);
    if para == 0 {
        return Err(CieError::InvalidParams);
    }
    out[9] = para;

    debug!(info = ?out, "built LHDC codec info");
    Ok(out)
}

/// Parse an element.
///
/// With `is_capability` the sample-rate mask may carry several bits;
/// otherwise it must carry exactly one.
pub fn decode(bytes: &[u8], is_capability: bool) -> Result<Cie, CieError> {
    if bytes.is_empty() {
        return Err(CieError::InvalidParams);
    }
    if bytes[0] != CODEC_LEN {
        return Err(CieError::WrongCodec);
    }
    if bytes.len() < CODEC_INFO_SIZE {
        return Err(CieError::InvalidParams);
    }

    let media_type = bytes[1] >> 4;
    let codec_type = bytes[2];
    if media_type != MEDIA_TYPE_AUDIO || codec_type != MEDIA_CT_NON_A2DP {
        return Err(CieError::WrongCodec);
    }

    let vendor_id = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
    let codec_id = u16::from_le_bytes([bytes[7], bytes[8]]);
    if vendor_id != LHDC_VENDOR_ID || codec_id != LHDC_CODEC_ID {
        return Err(CieError::WrongCodec);
    }

    let cie = Cie {
        vendor_id,
        codec_id,
        sample_rate: sample_rates_from_wire(bytes[9]),
        bits_per_sample: bit_depth_from_wire(bytes[9])?,
        channel_mode: ChannelModes::single(ChannelMode::Stereo),
    };

    if is_capability {
        return Ok(cie);
    }
    if cie.sample_rate.count() != 1 {
        return Err(CieError::BadSampleRate);
    }
    if cie.channel_mode.count() != 1 {
        return Err(CieError::BadChannelMode);
    }
    Ok(cie)
}

/// Codec name for logs and dumps
pub fn codec_name() -> &'static str {
    "LHDC"
}

/// Liberal validity check: accepts configurations and capabilities
pub fn is_source_codec_valid(bytes: &[u8]) -> bool {
    decode(bytes, false).is_ok() || decode(bytes, true).is_ok()
}

/// Liberal validity check for a peer sink's codec information
pub fn is_peer_sink_codec_valid(bytes: &[u8]) -> bool {
    is_source_codec_valid(bytes)
}

/// Check `bytes` against the capability `cap`.
pub fn codec_info_matches_capability(cap: &Cie, bytes: &[u8], is_capability: bool) -> Result<(), CieError> {
    let cfg = decode(bytes, is_capability)?;

    debug!(peer = ?cfg.sample_rate, capability = ?cap.sample_rate, "sample rate");
    debug!(peer = ?cfg.bits_per_sample, capability = ?cap.bits_per_sample, "bit depth");

    if cfg.sample_rate.intersect(cap.sample_rate).is_empty() {
        return Err(CieError::NotSupportedSampleRate);
    }
    if cfg.bits_per_sample.intersect(cap.bits_per_sample).is_empty() {
        return Err(CieError::NotSupportedBitDepth);
    }
    Ok(())
}

/// Both elements describe LHDC
pub fn codec_type_equals(a: &[u8], b: &[u8]) -> bool {
    decode(a, true).is_ok() && decode(b, true).is_ok()
}

/// Both elements describe LHDC with the same sample rate and bit depth
pub fn codec_equals(a: &[u8], b: &[u8]) -> bool {
    match (decode(a, true), decode(b, true)) {
        (Ok(a), Ok(b)) => a.sample_rate == b.sample_rate && a.bits_per_sample == b.bits_per_sample,
        _ => false,
    }
}

/// Sample rate in Hz of a configuration element
pub fn track_sample_rate(bytes: &[u8]) -> Option<u32> {
    let cie = decode(bytes, false).ok()?;
    cie.sample_rate.as_single().map(SampleRate::hz)
}

/// Bits per sample of a configuration element
pub fn track_bits_per_sample(bytes: &[u8]) -> Option<u8> {
    let cie = decode(bytes, false).ok()?;
    cie.bits_per_sample.as_single().map(BitDepth::bits)
}

/// Channel count of a configuration element
pub fn track_channel_count(bytes: &[u8]) -> Option<u16> {
    let cie = decode(bytes, false).ok()?;
    cie.channel_mode.as_single().map(ChannelMode::channel_count)
}

/// Encoder channel mode code of a configuration element
pub fn channel_mode_code(bytes: &[u8]) -> Option<u8> {
    let cie = decode(bytes, false).ok()?;
    match cie.channel_mode.as_single()? {
        ChannelMode::Stereo => Some(ChannelMode::Stereo.bit()),
        _ => None,
    }
}

/// Log the decoded contents of an element
pub fn dump_codec_info(bytes: &[u8]) {
    let cie = match decode(bytes, true) {
        Ok(cie) => cie,
        Err(e) => {
            debug!("cannot decode LHDC codec info: {}", e);
            return;
        }
    };

    debug!("samp_freq: 0x{:x}", sample_rates_to_wire(cie.sample_rate));
    for rate in cie.sample_rate.iter() {
        debug!("samp_freq: ({})", rate.hz());
    }
    debug!("bits_per_sample: {:?}", cie.bits_per_sample);
    debug!("ch_mode: {:?}", cie.channel_mode);
}
