//! LHDC capability negotiation
//!
//! Resolves one concrete configuration from the local capability, the
//! peer's capability (or configuration) and layered preferences. Each
//! parameter runs through the same cascade:
//!
//! ```text
//! user preference ──(must be in local ∩ peer)──► selected / fail
//!        │ unset
//!        ▼
//! session audio preference ∩ (local ∩ peer)
//!        │ miss
//!        ▼
//! default config ∩ (local ∩ peer)
//!        │ miss
//!        ▼
//! best of (local ∩ peer) by priority
//! ```
//!
//! Resolution runs on a working copy of the negotiation state which is
//! committed only when every parameter resolved and every mirror encoded.

use std::cell::RefCell;

use parking_lot::ReentrantMutex;
use tracing::{debug, error};

use crate::codec::cie::{self, CodecInfo, CODEC_INFO_SIZE};
use crate::codec::types::{default_config, local_capability, BitDepth, Cie, CodecConfig, Flag, Mask};
use crate::error::{CieError, NegotiationError};

/// AVDTP content protection descriptor for SCMS-T: LOSC, then the 16-bit id (LE)
pub const CP_SCMS_T_INFO: [u8; 3] = [0x02, 0x02, 0x00];

/// Outcome of the cascade for one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection<T: Flag> {
    /// Selected value
    value: T,
    /// Common capability summary
    capability: Mask<T>,
    /// Selectable capability summary
    selectable: Mask<T>,
}

/// Run the preference cascade for one parameter.
///
/// Returns `None` when nothing can be selected, including the case of a
/// user preference absent from the intersection.
fn select<T: Flag>(
    local: Mask<T>,
    peer: Mask<T>,
    user: Mask<T>,
    audio: Mask<T>,
    default: Mask<T>,
) -> Option<Selection<T>> {
    let common = local.intersect(peer);

    if let Some(preferred) = user.as_single() {
        if !common.contains(preferred) {
            debug!(?preferred, ?common, "user preference not supported by peer");
            return None;
        }
        return Some(Selection {
            value: preferred,
            capability: Mask::single(preferred),
            selectable: common,
        });
    }

    let value = audio
        .as_single()
        .filter(|v| common.contains(*v))
        .or_else(|| default.intersect(peer).intersect(common).best())
        .or_else(|| common.best())?;

    Some(Selection {
        value,
        capability: common,
        selectable: common,
    })
}

/// Session-visible negotiation state.
///
/// A copy is taken before every negotiation attempt; the live state is
/// replaced only on success, so a failed attempt leaves it untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSnapshot {
    pub config: CodecConfig,
    pub capability: CodecConfig,
    pub selectable_capability: CodecConfig,
    pub user_config: CodecConfig,
    pub audio_config: CodecConfig,
    pub ota_config: CodecInfo,
    pub ota_peer_capability: CodecInfo,
    pub ota_peer_config: CodecInfo,
}

impl NegotiationSnapshot {
    fn new() -> Self {
        Self {
            config: CodecConfig::default(),
            capability: CodecConfig::default(),
            selectable_capability: CodecConfig::default(),
            user_config: CodecConfig::default(),
            audio_config: CodecConfig::default(),
            ota_config: [0; CODEC_INFO_SIZE],
            ota_peer_capability: [0; CODEC_INFO_SIZE],
            ota_peer_config: [0; CODEC_INFO_SIZE],
        }
    }
}

/// LHDC codec configuration and negotiator.
///
/// The entry points take `&self`; state lives behind a re-entrant lock so
/// a configuration request arriving on the streaming thread while another
/// negotiation call is on the stack does not deadlock.
pub struct LhdcCodec {
    local: Cie,
    default: Cie,
    content_protection: bool,
    state: ReentrantMutex<RefCell<NegotiationSnapshot>>,
}

impl LhdcCodec {
    /// Codec with the built-in local capability and default config
    pub fn new() -> Self {
        Self::with_capability(local_capability(), default_config())
    }

    /// Codec with explicit local capability and default config
    pub fn with_capability(local: Cie, default: Cie) -> Self {
        Self {
            local,
            default,
            content_protection: false,
            state: ReentrantMutex::new(RefCell::new(NegotiationSnapshot::new())),
        }
    }

    /// Enable SCMS-T content protection
    pub fn with_content_protection(mut self, enabled: bool) -> Self {
        self.content_protection = enabled;
        self
    }

    pub fn name(&self) -> &'static str {
        cie::codec_name()
    }

    pub fn content_protection(&self) -> bool {
        self.content_protection
    }

    pub fn local_capability(&self) -> &Cie {
        &self.local
    }

    /// Local capability element and, with SCMS-T, the content protection descriptor
    pub fn init_codec_config(&self) -> Result<(CodecInfo, Option<[u8; 3]>), CieError> {
        let info = cie::encode(&self.local)?;
        let protect = self.content_protection.then_some(CP_SCMS_T_INFO);
        Ok((info, protect))
    }

    /// Negotiate against the peer's codec information.
    ///
    /// `is_capability` says whether `peer` is the peer's capability or a
    /// configuration it proposed. On success the committed configuration
    /// and its encoded element are returned; on failure no state changes.
    pub fn set_codec_config(
        &self,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<(CodecConfig, CodecInfo), NegotiationError> {
        let guard = self.state.lock();
        let working = guard.borrow().clone();

        let committed = self.resolve(working, peer, is_capability)?;
        let result = (committed.config, committed.ota_config);
        *guard.borrow_mut() = committed;
        Ok(result)
    }

    /// Replace the user and session audio preferences, then renegotiate.
    ///
    /// Preferences are restored together with the rest of the state if the
    /// renegotiation fails.
    pub fn set_user_config(
        &self,
        user: CodecConfig,
        audio: CodecConfig,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<(CodecConfig, CodecInfo), NegotiationError> {
        let guard = self.state.lock();
        let saved = guard.borrow().clone();
        {
            let mut state = guard.borrow_mut();
            state.user_config = user;
            state.audio_config = audio;
        }

        match self.set_codec_config(peer, is_capability) {
            Ok(result) => Ok(result),
            Err(e) => {
                *guard.borrow_mut() = saved;
                Err(e)
            }
        }
    }

    fn resolve(
        &self,
        mut state: NegotiationSnapshot,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<NegotiationSnapshot, NegotiationError> {
        let sink = cie::decode(peer, is_capability).map_err(|e| {
            error!("can't parse peer's sink capabilities: {}", e);
            NegotiationError::from(e)
        })?;

        let mut result = Cie::empty();

        let rate = select(
            self.local.sample_rate,
            sink.sample_rate,
            state.user_config.sample_rate,
            state.audio_config.sample_rate,
            self.default.sample_rate,
        )
        .ok_or_else(|| {
            error!(
                "cannot match sample frequency: source caps = {:?} sink info = {:?}",
                self.local.sample_rate, sink.sample_rate
            );
            NegotiationError::NoSampleRate
        })?;
        result.sample_rate = Mask::single(rate.value);
        state.config.sample_rate = result.sample_rate;
        state.capability.sample_rate = rate.capability;
        state.selectable_capability.sample_rate = rate.selectable;

        let depth = select(
            self.local.bits_per_sample,
            sink.bits_per_sample,
            state.user_config.bits_per_sample,
            state.audio_config.bits_per_sample,
            self.default.bits_per_sample,
        )
        .ok_or_else(|| {
            error!(
                "cannot match bits per sample: source caps = {:?} sink info = {:?}",
                self.local.bits_per_sample, sink.bits_per_sample
            );
            NegotiationError::NoBitDepth
        })?;
        result.bits_per_sample = Mask::single(depth.value);
        state.config.bits_per_sample = result.bits_per_sample;
        state.capability.bits_per_sample = depth.capability;
        state.selectable_capability.bits_per_sample = depth.selectable;

        let mode = select(
            self.local.channel_mode,
            sink.channel_mode,
            state.user_config.channel_mode,
            state.audio_config.channel_mode,
            self.default.channel_mode,
        )
        .ok_or_else(|| {
            error!(
                "cannot match channel mode: source caps = {:?} sink info = {:?}",
                self.local.channel_mode, sink.channel_mode
            );
            NegotiationError::NoChannelMode
        })?;
        result.channel_mode = Mask::single(mode.value);
        state.config.channel_mode = result.channel_mode;
        state.capability.channel_mode = mode.capability;
        state.selectable_capability.channel_mode = mode.selectable;

        debug!(
            sample_rate = ?rate.value,
            bits_per_sample = ?depth.value,
            channel_mode = ?mode.value,
            "resolved LHDC configuration"
        );

        let user = state.user_config;
        for (slot, value) in state.config.codec_specific.iter_mut().zip(user.codec_specific) {
            if value != 0 {
                *slot = value;
            }
        }

        let peer_info = cie::encode(&sink)?;
        if is_capability {
            state.ota_peer_capability = peer_info;
        } else {
            state.ota_peer_config = peer_info;
        }
        state.ota_config = cie::encode(&result)?;

        Ok(state)
    }

    fn read<R>(&self, f: impl FnOnce(&NegotiationSnapshot) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Full copy of the session-visible negotiation state
    pub fn snapshot(&self) -> NegotiationSnapshot {
        self.read(|s| s.clone())
    }

    pub fn config(&self) -> CodecConfig {
        self.read(|s| s.config)
    }

    pub fn capability(&self) -> CodecConfig {
        self.read(|s| s.capability)
    }

    pub fn selectable_capability(&self) -> CodecConfig {
        self.read(|s| s.selectable_capability)
    }

    pub fn user_config(&self) -> CodecConfig {
        self.read(|s| s.user_config)
    }

    pub fn audio_config(&self) -> CodecConfig {
        self.read(|s| s.audio_config)
    }

    pub fn ota_config(&self) -> CodecInfo {
        self.read(|s| s.ota_config)
    }

    pub fn ota_peer_capability(&self) -> CodecInfo {
        self.read(|s| s.ota_peer_capability)
    }

    pub fn ota_peer_config(&self) -> CodecInfo {
        self.read(|s| s.ota_peer_config)
    }

    /// Negotiated bit depth.
    ///
    /// Peers learn the bit depth out of band, so this is the value the
    /// encoder must be fed with.
    pub fn bits_per_sample(&self) -> Option<BitDepth> {
        self.read(|s| s.config.bit_depth())
    }
}

impl Default for LhdcCodec {
    fn default() -> Self {
        Self::new()
    }
}
