/// Per-channel decoder state, mutated once per output sample.
///
/// Holds the two pipeline accumulators that carry partial convolution
/// results between ticks and the three post-filter memories, plus the
/// channel's copies of the Q8 post-filter coefficients. A state belongs to
/// exactly one channel; it is never shared across channels or threads.
///
/// State is never reset implicitly. In particular, rebuilding a
/// [`FilterProfile`](crate::profile::FilterProfile) leaves every open
/// channel's state untouched, which can produce an audible discontinuity on
/// reconfiguration; call [`reset`](Self::reset) explicitly when that
/// matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pipe0: i64,
    pipe1: i64,
    old_in: i64,
    old_out: i64,
    old_z: i64,
    hp_alpha: i64,
    lp_alpha: i64,
}

impl ChannelState {
    pub fn new(hp_alpha: u32, lp_alpha: u32) -> Self {
        Self {
            pipe0: 0,
            pipe1: 0,
            old_in: 0,
            old_out: 0,
            old_z: 0,
            hp_alpha: hp_alpha as i64,
            lp_alpha: lp_alpha as i64,
        }
    }

    /// Zero the accumulators and filter memories, keeping the coefficients.
    pub fn reset(&mut self) {
        self.pipe0 = 0;
        self.pipe1 = 0;
        self.old_in = 0;
        self.old_out = 0;
        self.old_z = 0;
    }

    /// Advance the convolution pipeline by one tick and return the centered
    /// sample for this tick.
    ///
    /// Consecutive ticks' windows overlap, so the full three-stage cascade
    /// is reconstructed incrementally: this tick's sample combines the
    /// stage-0 result from two ticks ago, the stage-1 result from last tick
    /// and the stage-2 result from now. The pipeline needs two ticks of
    /// fill before its output matches the full-kernel convolution.
    pub fn assemble(&mut self, z0: i64, z1: i64, z2: i64, sub_const: i64) -> i64 {
        let z = self.pipe1 + z2 - sub_const;
        self.pipe1 = self.pipe0 + z1;
        self.pipe0 = z0;
        z
    }

    /// Run the single-pole high-pass/low-pass pair over one sample.
    ///
    /// Q8 fixed point with i64 intermediates and arithmetic right shifts.
    /// An alpha of 0 disables its stage by value, not by branch: a disabled
    /// high-pass contributes zero permanently, and a disabled low-pass
    /// leaves `old_z` frozen at whatever it last held.
    pub fn post_filter(&mut self, z: i64) -> i64 {
        self.old_out = (self.hp_alpha * (self.old_out + z - self.old_in)) >> 8;
        self.old_in = z;
        self.old_z = ((256 - self.lp_alpha) * self.old_z + self.lp_alpha * self.old_out) >> 8;
        self.old_z
    }

    pub fn output(&self) -> i64 {
        self.old_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolve::convolve_bits;
    use crate::profile::{FilterConfig, FilterProfile, SINC_STAGES};
    use rand::{Rng, SeedableRng};

    fn profile() -> FilterProfile {
        FilterProfile::build(&FilterConfig {
            sample_rate: 16000,
            decimation: 64,
            channels: 1,
            max_volume: 64,
            gain: 16,
            hp_cutoff_hz: 40.0,
            lp_cutoff_hz: 8000.0,
        })
        .unwrap()
    }

    /// Direct, non-pipelined recomputation: the full 3D-tap kernel applied
    /// to the 3D bits ending at the current tick's window.
    fn full_kernel(profile: &FilterProfile, pdm: &[u8], tick: usize) -> i64 {
        let bytes_per_tick = profile.decimation() / 8;
        let start = (tick - 2) * bytes_per_tick;
        let mut sum = 0i64;
        for s in 0..SINC_STAGES {
            sum += convolve_bits(profile.stage(s), &pdm[start + s * bytes_per_tick..], 1);
        }
        sum - profile.sub_const()
    }

    #[test]
    fn pipeline_matches_full_kernel_convolution() {
        let profile = profile();
        let bytes_per_tick = profile.decimation() / 8;
        let ticks = 40;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xf11);
        let mut pdm = vec![0u8; ticks * bytes_per_tick];
        rng.fill(&mut pdm[..]);

        let mut state = ChannelState::new(0, 0);
        for tick in 0..ticks {
            let window = &pdm[tick * bytes_per_tick..];
            let z0 = convolve_bits(profile.stage(0), window, 1);
            let z1 = convolve_bits(profile.stage(1), window, 1);
            let z2 = convolve_bits(profile.stage(2), window, 1);
            let z = state.assemble(z0, z1, z2, profile.sub_const());
            if tick >= 2 {
                assert_eq!(z, full_kernel(&profile, &pdm, tick), "tick {}", tick);
            }
        }
    }

    #[test]
    fn disabled_filters_freeze_output_at_zero() {
        let mut state = ChannelState::new(0, 0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            let z = rng.gen_range(-200000i64..200000);
            assert_eq!(state.post_filter(z), 0);
        }
        assert_eq!(state.output(), 0);
    }

    #[test]
    fn unity_alphas_pass_dc_through() {
        // alpha 256 turns the high-pass into a pass-through and the
        // low-pass into a unit delay of it
        let mut state = ChannelState::new(256, 256);
        for _ in 0..8 {
            state.post_filter(131072);
        }
        assert_eq!(state.output(), 131072);
        let mut negative = ChannelState::new(256, 256);
        for _ in 0..8 {
            negative.post_filter(-131072);
        }
        assert_eq!(negative.output(), -131072);
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut state = ChannelState::new(252, 256);
        let mut last = i64::MAX;
        for _ in 0..64 {
            state.post_filter(131072);
        }
        for _ in 0..2000 {
            let out = state.post_filter(131072).abs();
            assert!(out <= last);
            last = out;
        }
        assert_eq!(state.output(), 0);
    }

    #[test]
    fn reset_zeroes_state_but_keeps_alphas() {
        let mut state = ChannelState::new(252, 194);
        state.assemble(10, 20, 30, 5);
        state.post_filter(123456);
        assert_ne!(state, ChannelState::new(252, 194));
        state.reset();
        assert_eq!(state, ChannelState::new(252, 194));
    }
}
