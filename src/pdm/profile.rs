use core::fmt;

use heapless::Vec;
use libm::roundf;
use log::debug;

/// Number of cascaded sinc stages. The decimator approximates a 3rd-order
/// CIC response, so this is fixed.
pub const SINC_STAGES: usize = 3;

/// Largest supported decimation factor. Stage coefficient tables are sized
/// for this at compile time.
pub const MAX_DECIMATION: usize = 128;

/// Largest supported number of byte-interleaved channels.
pub const MAX_CHANNELS: usize = 2;

/// Filter configuration, supplied once when a decoder is built.
///
/// `sample_rate` is the PCM output rate; the PDM bit rate is
/// `sample_rate * decimation`. A cutoff frequency of 0.0 disables the
/// corresponding post-filter stage by value: a disabled high-pass pins its
/// output at zero, and a disabled low-pass freezes the channel output at
/// whatever value it last held. With both disabled a channel produces
/// silence forever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    /// PCM output sample rate in Hz
    pub sample_rate: u32,
    /// PDM bits consumed per PCM sample produced. Must be a nonzero
    /// multiple of 8, at most [`MAX_DECIMATION`]. 64 and 128 are the
    /// factors in real-world use.
    pub decimation: usize,
    /// Number of byte-interleaved channels in the PDM stream (1 or 2)
    pub channels: usize,
    /// Largest volume value callers will pass to decode
    pub max_volume: u16,
    /// Fixed filter gain folded into the output divider
    pub gain: u16,
    /// DC-blocking high-pass cutoff in Hz, 0.0 to disable
    pub hp_cutoff_hz: f32,
    /// Smoothing low-pass cutoff in Hz, 0.0 to disable
    pub lp_cutoff_hz: f32,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decimation == 0
            || self.decimation % 8 != 0
            || self.decimation > MAX_DECIMATION
        {
            return Err(ConfigError::InvalidDecimation(self.decimation));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannels(self.channels));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.gain == 0 {
            return Err(ConfigError::ZeroGain);
        }
        if self.max_volume == 0 {
            return Err(ConfigError::ZeroMaxVolume);
        }
        Ok(())
    }
}

/// Rejected filter configuration. Construction is the only place errors are
/// surfaced; the decode path itself has no failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidDecimation(usize),
    InvalidChannels(usize),
    ZeroSampleRate,
    ZeroGain,
    ZeroMaxVolume,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidDecimation(d) => write!(
                f,
                "decimation factor {} is not a nonzero multiple of 8 at most {}",
                d, MAX_DECIMATION
            ),
            ConfigError::InvalidChannels(n) => {
                write!(f, "channel count {} is not in 1..={}", n, MAX_CHANNELS)
            }
            ConfigError::ZeroSampleRate => write!(f, "sample rate must be nonzero"),
            ConfigError::ZeroGain => write!(f, "filter gain must be nonzero"),
            ConfigError::ZeroMaxVolume => write!(f, "max volume must be nonzero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Immutable filter state derived from a [`FilterConfig`].
///
/// Built once, then shared read-only by every channel a decoder serves.
/// Rebuilding a profile while a decode call is in flight is a data race the
/// caller must prevent by serialization; the decoder never locks.
#[derive(Debug, Clone)]
pub struct FilterProfile {
    decimation: usize,
    channels: usize,
    coef: [Vec<u32, MAX_DECIMATION>; SINC_STAGES],
    sub_const: i64,
    div_const: i64,
    hp_alpha: u32,
    lp_alpha: u32,
}

impl FilterProfile {
    /// Compute stage coefficients and normalization constants for a
    /// configuration.
    ///
    /// The coefficient tables are built by convolving a length-D all-ones
    /// pulse with itself twice, giving a length 3D-2 approximation of a
    /// sinc^3 kernel. The kernel is laid into a length 3D table at offset 1
    /// and sliced into three length-D stage windows; the first and last
    /// entries of the table are therefore zero. The tables depend only on
    /// the decimation factor, never on volume or gain.
    ///
    /// `sub_const` is half the kernel mass and re-centers the 0/1 bit
    /// encoding around zero. `div_const` rescales the output into 16-bit
    /// range and is floored at 1.
    pub fn build(config: &FilterConfig) -> Result<FilterProfile, ConfigError> {
        config.validate()?;
        let d = config.decimation;

        let mut pulse = [0u32; MAX_DECIMATION];
        for tap in pulse[..d].iter_mut() {
            *tap = 1;
        }
        let mut triangle = [0u32; 2 * MAX_DECIMATION - 1];
        convolve(&pulse[..d], &pulse[..d], &mut triangle[..2 * d - 1]);
        let mut kernel = [0u32; 3 * MAX_DECIMATION];
        // kernel[0] and kernel[3d - 1] stay zero
        let sum = convolve(&triangle[..2 * d - 1], &pulse[..d], &mut kernel[1..3 * d - 1]);

        let sub_const = (sum / 2) as i64;
        let mut div_const = sub_const * config.max_volume as i64 / 32768 / config.gain as i64;
        if div_const < 1 {
            div_const = 1;
        }

        let mut coef: [Vec<u32, MAX_DECIMATION>; SINC_STAGES] =
            [Vec::new(), Vec::new(), Vec::new()];
        for (s, stage) in coef.iter_mut().enumerate() {
            // d <= MAX_DECIMATION, checked by validate()
            *stage = Vec::from_slice(&kernel[s * d..(s + 1) * d]).unwrap();
        }

        let fs = config.sample_rate as f32;
        let pi = core::f32::consts::PI;
        let lp_alpha = if config.lp_cutoff_hz > 0.0 {
            roundf(config.lp_cutoff_hz * 256.0 / (config.lp_cutoff_hz + fs / (2.0 * pi))) as u32
        } else {
            0
        };
        let hp_alpha = if config.hp_cutoff_hz > 0.0 {
            roundf(fs * 256.0 / (2.0 * pi * config.hp_cutoff_hz + fs)) as u32
        } else {
            0
        };

        debug!(
            "pdm profile: decimation {} channels {} sub_const {} div_const {} hp_alpha {} lp_alpha {}",
            d, config.channels, sub_const, div_const, hp_alpha, lp_alpha
        );

        Ok(FilterProfile {
            decimation: d,
            channels: config.channels,
            coef,
            sub_const,
            div_const,
            hp_alpha,
            lp_alpha,
        })
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sub_const(&self) -> i64 {
        self.sub_const
    }

    /// Output divider, always at least 1
    pub fn div_const(&self) -> i64 {
        self.div_const
    }

    /// High-pass coefficient in Q8, 0 when the stage is disabled
    pub fn hp_alpha(&self) -> u32 {
        self.hp_alpha
    }

    /// Low-pass coefficient in Q8, 0 when the stage is disabled
    pub fn lp_alpha(&self) -> u32 {
        self.lp_alpha
    }

    /// Coefficient table for one sinc stage, length [`decimation`](Self::decimation)
    pub fn stage(&self, s: usize) -> &[u32] {
        &self.coef[s]
    }

    /// Bytes of interleaved PDM input consumed per output frame
    pub fn bytes_per_frame(&self) -> usize {
        self.decimation / 8 * self.channels
    }
}

/// Direct convolution of `signal` with `kernel` into `out`, which must hold
/// `signal.len() + kernel.len() - 1` entries. Returns the sum of the output.
fn convolve(signal: &[u32], kernel: &[u32], out: &mut [u32]) -> u64 {
    let out_len = signal.len() + kernel.len() - 1;
    let mut sum = 0u64;
    for n in 0..out_len {
        let kmin = if n >= kernel.len() - 1 {
            n - (kernel.len() - 1)
        } else {
            0
        };
        let kmax = if n < signal.len() - 1 { n } else { signal.len() - 1 };
        let mut acc = 0u32;
        for k in kmin..=kmax {
            acc += signal[k] * kernel[n - k];
        }
        out[n] = acc;
        sum += acc as u64;
    }
    sum
}
