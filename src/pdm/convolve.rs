/// Apply one stage's coefficient table to a window of raw PDM bits.
///
/// Walks `coef.len() / 8` bytes of `window`, each stepped by `stride` (the
/// byte distance between consecutive bytes of the same channel in an
/// interleaved stream), and accumulates the coefficient for every bit that
/// is set. Bits are taken MSB first within each byte. Because the input is
/// binary this is bit-select-and-accumulate rather than multiplication.
pub fn convolve_bits(coef: &[u32], window: &[u8], stride: usize) -> i64 {
    debug_assert!(coef.len() % 8 == 0);
    let mut sum = 0u32;
    for i in 0..coef.len() / 8 {
        let byte = window[i * stride];
        let taps = &coef[i * 8..i * 8 + 8];
        for (j, tap) in taps.iter().enumerate() {
            if byte & (0x80 >> j) != 0 {
                sum += tap;
            }
        }
    }
    sum as i64
}
