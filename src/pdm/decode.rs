use crate::channel::ChannelState;
use crate::convolve::convolve_bits;
use crate::profile::{ConfigError, FilterConfig, FilterProfile};

/// Output samples are clamped to this magnitude, a little inside the full
/// 16-bit range. Fixed design constant of the filter.
pub const SAMPLE_LIMIT: i16 = 32700;

/// PDM to PCM decoder.
///
/// Owns one [`FilterProfile`] and serves any number of channels; each
/// channel's mutable state lives in a [`ChannelState`] the caller owns and
/// passes back in on every decode call. One decode call produces one output
/// sample per `out` element and consumes `decimation / 8` input bytes per
/// sample per channel.
///
/// Typical use from a DMA-completion handler:
///
/// ```
/// use pdm_dsp::decode::PdmDecoder;
/// use pdm_dsp::profile::FilterConfig;
///
/// let decoder = PdmDecoder::new(&FilterConfig {
///     sample_rate: 16000,
///     decimation: 64,
///     channels: 1,
///     max_volume: 64,
///     gain: 16,
///     hp_cutoff_hz: 40.0,
///     lp_cutoff_hz: 8000.0,
/// }).unwrap();
/// let mut state = decoder.open_channel();
/// let pdm = [0x55u8; 256];
/// let mut pcm = [0i16; 32];
/// decoder.decode_channel(&pdm, 0, &mut state, 64, &mut pcm);
/// ```
pub struct PdmDecoder {
    profile: FilterProfile,
}

impl PdmDecoder {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            profile: FilterProfile::build(config)?,
        })
    }

    pub fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    /// Fresh zeroed state carrying the profile's post-filter coefficients.
    pub fn open_channel(&self) -> ChannelState {
        ChannelState::new(self.profile.hp_alpha(), self.profile.lp_alpha())
    }

    /// Replace the profile with one built from a new configuration.
    ///
    /// Open channel states are NOT reset: they keep their accumulators and
    /// the coefficients they were opened with, so decoding continues from
    /// the old trajectory and a reconfiguration mid-stream is audible as a
    /// click. Callers that care must [`ChannelState::reset`] (or reopen)
    /// each channel themselves, serialized against in-flight decode calls.
    pub fn rebuild(&mut self, config: &FilterConfig) -> Result<(), ConfigError> {
        self.profile = FilterProfile::build(config)?;
        Ok(())
    }

    /// Decode one channel out of an interleaved PDM buffer into contiguous
    /// PCM samples.
    ///
    /// `volume` is the per-call multiplier, expected to stay at or below
    /// the configured `max_volume`. Buffer geometry is checked here, before
    /// the sample loop; the loop itself has no error paths.
    pub fn decode_channel(
        &self,
        pdm: &[u8],
        channel: usize,
        state: &mut ChannelState,
        volume: u16,
        out: &mut [i16],
    ) {
        assert!(channel < self.profile.channels());
        assert!(pdm.len() >= out.len() * self.profile.bytes_per_frame());
        self.run(pdm, channel, state, volume, out.iter_mut());
    }

    /// Decode every channel, writing channel-interleaved PCM frames.
    ///
    /// `out.len()` must be a multiple of the channel count and `states`
    /// must hold one state per channel, in channel order.
    pub fn decode_interleaved(
        &self,
        pdm: &[u8],
        states: &mut [ChannelState],
        volume: u16,
        out: &mut [i16],
    ) {
        let nch = self.profile.channels();
        assert_eq!(states.len(), nch);
        assert_eq!(out.len() % nch, 0);
        assert!(pdm.len() >= (out.len() / nch) * self.profile.bytes_per_frame());
        for (ch, state) in states.iter_mut().enumerate() {
            self.run(pdm, ch, state, volume, out[ch..].iter_mut().step_by(nch));
        }
    }

    fn run<'a>(
        &self,
        pdm: &[u8],
        channel: usize,
        state: &mut ChannelState,
        volume: u16,
        out: impl Iterator<Item = &'a mut i16>,
    ) {
        let profile = &self.profile;
        let stride = profile.channels();
        let step = profile.bytes_per_frame();
        let mut offset = channel;
        for slot in out {
            let window = &pdm[offset..];
            let z0 = convolve_bits(profile.stage(0), window, stride);
            let z1 = convolve_bits(profile.stage(1), window, stride);
            let z2 = convolve_bits(profile.stage(2), window, stride);
            let z = state.assemble(z0, z1, z2, profile.sub_const());
            let filtered = state.post_filter(z);
            *slot = scale(filtered, volume, profile.div_const());
            offset += step;
        }
    }
}

/// Scale a post-filter output by the call volume and clamp it into 16-bit
/// range.
pub fn scale(old_z: i64, volume: u16, div_const: i64) -> i16 {
    let z = round_div(old_z * volume as i64, div_const);
    saturate(z, -(SAMPLE_LIMIT as i64), SAMPLE_LIMIT as i64) as i16
}

/// Integer division rounding to nearest, halves away from zero.
fn round_div(num: i64, den: i64) -> i64 {
    if num > 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}

fn saturate(x: i64, lo: i64, hi: i64) -> i64 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}
