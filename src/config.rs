//! Source configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a
//! valid configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::cie::{self, CodecInfo};
use crate::codec::types::{BitDepth, BitDepths, ChannelMode, ChannelModes, Cie, CodecConfig, SampleRate, SampleRates};
use crate::constants::DEFAULT_PEER_MTU;
use crate::error::{Error, Result};
use crate::session::PeerParams;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub peer_mtu: u16,
    /// SCMS-T content protection
    pub content_protection: bool,
    /// Transmit queue length reported to adaptive bitrate
    pub tx_queue_length: usize,
    /// Demo run length in seconds; zero runs until interrupted
    pub run_seconds: u64,
    /// Demo tone frequency in Hz
    pub tone_hz: f32,
    pub peer: PeerCapabilityConfig,
    pub user: UserPreferences,
    /// Session audio preference
    pub audio: Option<UserPreferences>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            peer_mtu: DEFAULT_PEER_MTU,
            content_protection: false,
            tx_queue_length: 0,
            run_seconds: 5,
            tone_hz: 440.0,
            peer: PeerCapabilityConfig::default(),
            user: UserPreferences::default(),
            audio: None,
        }
    }
}

/// Capability the simulated peer advertises
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeerCapabilityConfig {
    pub sample_rates: Vec<u32>,
    pub bits_per_sample: Vec<u8>,
}

impl Default for PeerCapabilityConfig {
    fn default() -> Self {
        Self {
            sample_rates: vec![44_100, 48_000, 96_000],
            bits_per_sample: vec![16, 24],
        }
    }
}

impl PeerCapabilityConfig {
    pub fn to_cie(&self) -> Result<Cie> {
        let rates = self
            .sample_rates
            .iter()
            .map(|&hz| parse_rate(hz))
            .collect::<Result<SampleRates>>()?;
        let depths = self
            .bits_per_sample
            .iter()
            .map(|&bits| parse_depth(bits))
            .collect::<Result<BitDepths>>()?;
        Ok(Cie::lhdc(rates, depths, ChannelModes::single(ChannelMode::Stereo)))
    }

    /// Capability element as the peer would send it
    pub fn to_codec_info(&self) -> Result<CodecInfo> {
        Ok(cie::encode(&self.to_cie()?)?)
    }
}

/// Externally supplied preferences; unset fields leave the choice to negotiation
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UserPreferences {
    pub sample_rate: Option<u32>,
    pub bits_per_sample: Option<u8>,
    pub channel_mode: Option<String>,
    /// Vendor extensions: quality mode, latency mode, two reserved
    pub codec_specific: [i64; 4],
}

impl UserPreferences {
    pub fn to_codec_config(&self) -> Result<CodecConfig> {
        let sample_rate = match self.sample_rate {
            Some(hz) => SampleRates::single(parse_rate(hz)?),
            None => SampleRates::empty(),
        };
        let bits_per_sample = match self.bits_per_sample {
            Some(bits) => BitDepths::single(parse_depth(bits)?),
            None => BitDepths::empty(),
        };
        let channel_mode = match self.channel_mode.as_deref() {
            Some(name) => ChannelModes::single(parse_channel_mode(name)?),
            None => ChannelModes::empty(),
        };
        Ok(CodecConfig {
            sample_rate,
            bits_per_sample,
            channel_mode,
            codec_specific: self.codec_specific,
        })
    }
}

fn parse_rate(hz: u32) -> Result<SampleRate> {
    SampleRate::try_from(hz).map_err(|_| Error::Config(format!("unsupported sample rate {hz}")))
}

fn parse_depth(bits: u8) -> Result<BitDepth> {
    BitDepth::try_from(bits).map_err(|_| Error::Config(format!("unsupported bits per sample {bits}")))
}

fn parse_channel_mode(name: &str) -> Result<ChannelMode> {
    match name.to_ascii_lowercase().as_str() {
        "mono" => Ok(ChannelMode::Mono),
        "dual" => Ok(ChannelMode::Dual),
        "stereo" => Ok(ChannelMode::Stereo),
        other => Err(Error::Config(format!("unknown channel mode {other:?}"))),
    }
}

impl SourceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "lhdc", "lhdc-source").map(|dirs| dirs.config_dir().join("source.toml"))
    }

    pub fn peer_params(&self) -> PeerParams {
        PeerParams {
            peer_mtu: self.peer_mtu,
            ..PeerParams::default()
        }
    }

    pub fn user_config(&self) -> Result<CodecConfig> {
        self.user.to_codec_config()
    }

    pub fn audio_config(&self) -> Result<CodecConfig> {
        self.audio
            .as_ref()
            .map_or(Ok(CodecConfig::default()), UserPreferences::to_codec_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SourceConfig::from_toml_str("").unwrap();
        assert_eq!(config.peer_mtu, DEFAULT_PEER_MTU);
        assert!(!config.content_protection);
        assert!(config.audio.is_none());
        assert_eq!(config.user_config().unwrap(), CodecConfig::default());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            peer_mtu = 1005
            content_protection = true
            tx_queue_length = 3

            [peer]
            sample_rates = [44100, 48000]
            bits_per_sample = [16]

            [user]
            sample_rate = 44100
            channel_mode = "Stereo"
            codec_specific = [3, 2, 0, 0]

            [audio]
            bits_per_sample = 16
        "#;
        let config = SourceConfig::from_toml_str(text).unwrap();
        assert_eq!(config.peer_params().peer_mtu, 1005);

        let user = config.user_config().unwrap();
        assert_eq!(user.sample_rate(), Some(SampleRate::Hz44100));
        assert_eq!(user.channel_mode(), Some(ChannelMode::Stereo));
        assert!(user.bits_per_sample.is_empty());
        assert_eq!(user.codec_specific, [3, 2, 0, 0]);

        let audio = config.audio_config().unwrap();
        assert_eq!(audio.bit_depth(), Some(BitDepth::Bits16));

        let peer = cie::decode(&config.peer.to_codec_info().unwrap(), true).unwrap();
        assert!(peer.sample_rate.contains(SampleRate::Hz48000));
        assert!(!peer.sample_rate.contains(SampleRate::Hz96000));
    }

    #[test]
    fn test_unsupported_values_are_config_errors() {
        let config = SourceConfig::from_toml_str("[user]\nsample_rate = 22050\n").unwrap();
        assert!(matches!(config.user_config(), Err(Error::Config(_))));

        let config = SourceConfig::from_toml_str("[user]\nchannel_mode = \"quad\"\n").unwrap();
        assert!(matches!(config.user_config(), Err(Error::Config(_))));

        let config = SourceConfig::from_toml_str("[peer]\nbits_per_sample = [32]\n").unwrap();
        assert!(matches!(config.peer.to_cie(), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(SourceConfig::from_toml_str("peer_mtu = \"x\""), Err(Error::Toml(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SourceConfig::load("/nonexistent/lhdc/source.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
