//! Gray demapping of demodulated symbol values.
//!
//! The transmitter sends the binary symbol whose Gray code equals the
//! interleaved bit pattern, so the receiver recovers the pattern with
//! `v = s ^ (s >> 1)`. Stateless, one symbol at a time.

/// Binary value -> Gray code. This is the receive-side demap.
pub fn to_gray(s: u16) -> u16 {
    s ^ (s >> 1)
}

/// Gray code -> binary value. The encoder uses this to pick the symbol to
/// transmit; `to_gray(from_gray(v)) == v` for all v.
pub fn from_gray(g: u16) -> u16 {
    let mut b = g;
    let mut shift = 1;
    while shift < 16 {
        b ^= b >> shift;
        shift <<= 1;
    }
    b
}

/// Expand the low `sf` bits of a value into a bit group, MSB first.
pub fn bits_msb_first(v: u16, sf: u32) -> Vec<u8> {
    (0..sf).map(|j| ((v >> (sf - 1 - j)) & 1) as u8).collect()
}

/// Hard Gray demap: symbol bin -> SF Gray-decoded bits, MSB first.
pub fn demap_hard(bin: u16, sf: u32) -> Vec<u8> {
    bits_msb_first(to_gray(bin), sf)
}

/// Soft Gray demap: per-bin magnitude spectrum -> SF per-bit metrics,
/// MSB first. Max-log: for each bit position, the metric is the difference
/// between the strongest bin whose Gray-decoded value has that bit set and
/// the strongest bin where it is clear. Positive metric means bit = 1.
pub fn demap_soft(magnitudes: &[f32], sf: u32) -> Vec<f32> {
    debug_assert_eq!(magnitudes.len(), 1 << sf);
    let mut best_one = vec![f32::NEG_INFINITY; sf as usize];
    let mut best_zero = vec![f32::NEG_INFINITY; sf as usize];
    for (bin, &mag) in magnitudes.iter().enumerate() {
        let v = to_gray(bin as u16);
        for j in 0..sf as usize {
            let bit = (v >> (sf as usize - 1 - j)) & 1;
            if bit == 1 {
                if mag > best_one[j] {
                    best_one[j] = mag;
                }
            } else if mag > best_zero[j] {
                best_zero[j] = mag;
            }
        }
    }
    (0..sf as usize).map(|j| best_one[j] - best_zero[j]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_roundtrip_sf7_through_sf12() {
        for sf in 7..=12u32 {
            for v in 0..(1u32 << sf) as u16 {
                assert_eq!(from_gray(to_gray(v)), v);
                assert_eq!(to_gray(from_gray(v)), v);
            }
        }
    }

    #[test]
    fn adjacent_symbols_differ_by_one_bit() {
        for s in 0..127u16 {
            let diff = to_gray(s) ^ to_gray(s + 1);
            assert_eq!(diff.count_ones(), 1);
        }
    }

    #[test]
    fn hard_demap_bit_order() {
        // bin 5 -> gray 7 -> 0000111 at SF7, MSB first
        assert_eq!(demap_hard(5, 7), vec![0, 0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn soft_demap_matches_hard_on_clean_spectrum() {
        let sf = 7u32;
        for bin in [0u16, 1, 42, 127] {
            let mut mags = vec![0.1f32; 1 << sf];
            mags[bin as usize] = 10.0;
            let llrs = demap_soft(&mags, sf);
            let hard = demap_hard(bin, sf);
            for (llr, bit) in llrs.iter().zip(hard.iter()) {
                assert_eq!((*llr > 0.0) as u8, *bit);
            }
        }
    }
}
