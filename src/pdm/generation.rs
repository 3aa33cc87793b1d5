//! Synthetic PDM sources for tests, benchmarks and simulation.

/// First-order sigma-delta modulator turning float samples in [-1.0, 1.0]
/// into a PDM bit stream whose bit density tracks the signal amplitude.
pub struct PdmModulator {
    accum: f32,
}

impl PdmModulator {
    pub fn new() -> Self {
        Self { accum: 0.0 }
    }

    pub fn next_bit(&mut self, sample: f32) -> bool {
        self.accum += sample;
        if self.accum >= 0.0 {
            self.accum -= 1.0;
            true
        } else {
            self.accum += 1.0;
            false
        }
    }

    /// Modulate a whole signal into packed bytes, MSB first.
    ///
    /// Panics if the signal length is not a multiple of 8.
    pub fn modulate(&mut self, signal: &[f32]) -> Vec<u8> {
        if signal.len() % 8 != 0 {
            panic!("Signal length must be a multiple of 8 to pack into bytes");
        }
        let mut out = Vec::with_capacity(signal.len() / 8);
        for chunk in signal.chunks(8) {
            let mut byte = 0u8;
            for (j, &sample) in chunk.iter().enumerate() {
                if self.next_bit(sample) {
                    byte |= 0x80 >> j;
                }
            }
            out.push(byte);
        }
        out
    }
}

impl Default for PdmModulator {
    fn default() -> Self {
        Self::new()
    }
}

/// A constant-density stream: all ones for `bit` true, all zeros otherwise.
pub fn constant_stream(bit: bool, bytes: usize) -> Vec<u8> {
    vec![if bit { 0xff } else { 0x00 }; bytes]
}

/// Interleave per-channel byte streams byte-wise, the layout the decoder
/// expects for multi-channel input. All channels must be the same length.
pub fn interleave(channels: &[Vec<u8>]) -> Vec<u8> {
    if channels.is_empty() {
        panic!("Cannot interleave 0 channels");
    }
    let len = channels[0].len();
    for ch in channels {
        if ch.len() != len {
            panic!("All channels must have the same length");
        }
    }
    let mut out = Vec::with_capacity(len * channels.len());
    for i in 0..len {
        for ch in channels {
            out.push(ch[i]);
        }
    }
    out
}
