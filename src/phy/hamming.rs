//! Hamming FEC over 4-bit nibbles, one codeword per (4 + CR) bits.
//!
//! CR=4 is Hamming(8,4) with single-error correction and double-error
//! detection, CR=3 is Hamming(7,4) with single-error correction, CR=2 and
//! CR=1 are parity-only (detection, no correction). Codewords are
//! systematic: data bits d3..d0 first (d3 = MSB of the nibble), parity
//! bits after.

/// Per-codeword decode outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecStatus {
    /// No error detected.
    Clean,
    /// A single-bit error was corrected.
    Corrected,
    /// An error was detected but could not be corrected.
    Detected,
}

fn data_bits(nibble: u8) -> [u8; 4] {
    [
        (nibble >> 3) & 1,
        (nibble >> 2) & 1,
        (nibble >> 1) & 1,
        nibble & 1,
    ]
}

fn nibble_from_bits(d: &[u8]) -> u8 {
    (d[0] << 3) | (d[1] << 2) | (d[2] << 1) | d[3]
}

/// Encode one nibble at the given coding rate. Returns 4 + cr bits.
pub fn encode(nibble: u8, cr: u8) -> Vec<u8> {
    debug_assert!((1..=4).contains(&cr));
    let [d3, d2, d1, d0] = data_bits(nibble);
    let mut cw = vec![d3, d2, d1, d0];
    match cr {
        1 => cw.push(d3 ^ d2 ^ d1 ^ d0),
        2 => {
            cw.push(d3 ^ d2 ^ d1);
            cw.push(d2 ^ d1 ^ d0);
        }
        _ => {
            cw.push(d3 ^ d2 ^ d1);
            cw.push(d3 ^ d2 ^ d0);
            cw.push(d3 ^ d1 ^ d0);
            if cr == 4 {
                let overall = cw.iter().fold(0, |acc, &b| acc ^ b);
                cw.push(overall);
            }
        }
    }
    cw
}

/// Syndrome-to-position table for the (7,4) part: s = (s0<<2)|(s1<<1)|s2.
fn syndrome_position(s: u8) -> usize {
    match s {
        0b111 => 0, // d3
        0b110 => 1, // d2
        0b101 => 2, // d1
        0b011 => 3, // d0
        0b100 => 4, // p0
        0b010 => 5, // p1
        _ => 6,     // p2 (0b001)
    }
}

fn syndrome_7_4(cw: &[u8]) -> u8 {
    let s0 = cw[4] ^ cw[0] ^ cw[1] ^ cw[2];
    let s1 = cw[5] ^ cw[0] ^ cw[1] ^ cw[3];
    let s2 = cw[6] ^ cw[0] ^ cw[2] ^ cw[3];
    (s0 << 2) | (s1 << 1) | s2
}

/// Hard-decision decode of one codeword at the given coding rate.
pub fn decode_hard(cw: &[u8], cr: u8) -> (u8, FecStatus) {
    debug_assert_eq!(cw.len(), 4 + cr as usize);
    match cr {
        1 => {
            let parity = cw.iter().fold(0, |acc, &b| acc ^ b);
            let status = if parity == 0 {
                FecStatus::Clean
            } else {
                FecStatus::Detected
            };
            (nibble_from_bits(cw), status)
        }
        2 => {
            let s0 = cw[4] ^ cw[0] ^ cw[1] ^ cw[2];
            let s1 = cw[5] ^ cw[1] ^ cw[2] ^ cw[3];
            let status = if s0 | s1 == 0 {
                FecStatus::Clean
            } else {
                FecStatus::Detected
            };
            (nibble_from_bits(cw), status)
        }
        3 => {
            let s = syndrome_7_4(cw);
            if s == 0 {
                (nibble_from_bits(cw), FecStatus::Clean)
            } else {
                let mut fixed = cw.to_vec();
                let pos = syndrome_position(s);
                fixed[pos] ^= 1;
                (nibble_from_bits(&fixed), FecStatus::Corrected)
            }
        }
        _ => {
            let s = syndrome_7_4(cw);
            let overall = cw.iter().fold(0, |acc, &b| acc ^ b);
            match (s, overall) {
                (0, 0) => (nibble_from_bits(cw), FecStatus::Clean),
                (0, _) => {
                    // error in the overall parity bit, data intact
                    (nibble_from_bits(cw), FecStatus::Corrected)
                }
                (_, 1) => {
                    let mut fixed = cw.to_vec();
                    let pos = syndrome_position(s);
                    fixed[pos] ^= 1;
                    (nibble_from_bits(&fixed), FecStatus::Corrected)
                }
                _ => {
                    // non-zero syndrome with even overall parity: two errors
                    (nibble_from_bits(cw), FecStatus::Detected)
                }
            }
        }
    }
}

/// Soft-decision maximum-likelihood decode: correlate the per-bit metrics
/// against all sixteen candidate codewords and take the best. Positive
/// metric means the bit is more likely a 1.
pub fn decode_soft(metrics: &[f32], cr: u8) -> (u8, FecStatus) {
    debug_assert_eq!(metrics.len(), 4 + cr as usize);
    let mut best_nibble = 0u8;
    let mut best_score = f32::NEG_INFINITY;
    for nibble in 0..16u8 {
        let cw = encode(nibble, cr);
        let score: f32 = cw
            .iter()
            .zip(metrics.iter())
            .map(|(&bit, &m)| if bit == 1 { m } else { -m })
            .sum();
        if score > best_score {
            best_score = score;
            best_nibble = nibble;
        }
    }
    let hard: Vec<u8> = metrics.iter().map(|&m| (m > 0.0) as u8).collect();
    let status = if hard == encode(best_nibble, cr) {
        FecStatus::Clean
    } else {
        FecStatus::Corrected
    };
    (best_nibble, status)
}
