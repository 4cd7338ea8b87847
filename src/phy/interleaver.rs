//! Diagonal deinterleaving.
//!
//! The transmitter spreads a block of SF codewords of (4 + CR) bits each
//! across (4 + CR) symbols of SF bits, writing along diagonals:
//! `inter[col][row] = cw[(col - row - 1) mod SF][col]`. The deinterleaver
//! buffers one block's worth of bit groups and applies the inverse
//! permutation. Generic over the bit metric so the soft path reuses it.

fn diag_row(col: usize, row: usize, sf: usize) -> usize {
    (col + 2 * sf - row - 1) % sf
}

/// Interleave one block of `sf` codewords into (4 + cr) symbol bit groups.
/// Encoder-side counterpart of [`Deinterleaver`], also used by tests.
pub fn interleave(codewords: &[Vec<u8>], sf: usize, cr: u8) -> Vec<Vec<u8>> {
    let cols = 4 + cr as usize;
    debug_assert_eq!(codewords.len(), sf);
    let mut groups = vec![vec![0u8; sf]; cols];
    for (col, group) in groups.iter_mut().enumerate() {
        for (row, bit) in group.iter_mut().enumerate() {
            *bit = codewords[diag_row(col, row, sf)][col];
        }
    }
    groups
}

/// Streaming deinterleaver. Accumulates (4 + CR) bit groups, then emits the
/// SF codewords of the block. The coding rate is latched per block: the
/// header block always runs at CR=4, payload blocks at the live frame CR.
#[derive(Debug)]
pub struct Deinterleaver<T> {
    sf: usize,
    cr: u8,
    groups: Vec<Vec<T>>,
}

impl<T: Copy + Default> Deinterleaver<T> {
    pub fn new(sf: usize, cr: u8) -> Self {
        Self {
            sf,
            cr,
            groups: Vec::new(),
        }
    }

    /// Change the coding rate for the next block. Only meaningful on a
    /// block boundary; mid-block the current rate is kept.
    pub fn set_cr(&mut self, cr: u8) {
        debug_assert!(self.groups.is_empty(), "CR change mid-block");
        self.cr = cr;
    }

    /// Discard any partial block (frame abort).
    pub fn reset(&mut self) {
        self.groups.clear();
    }

    /// Feed one bit group of SF metrics. Returns the SF deinterleaved
    /// codewords once a whole block has arrived.
    pub fn push(&mut self, group: Vec<T>) -> Option<Vec<Vec<T>>> {
        debug_assert_eq!(group.len(), self.sf);
        self.groups.push(group);
        let cols = 4 + self.cr as usize;
        if self.groups.len() < cols {
            return None;
        }
        let mut codewords = vec![vec![T::default(); cols]; self.sf];
        for (col, group) in self.groups.iter().enumerate() {
            for (row, &bit) in group.iter().enumerate() {
                codewords[diag_row(col, row, self.sf)][col] = bit;
            }
        }
        self.groups.clear();
        Some(codewords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleave_inverts_interleave() {
        for sf in [7usize, 9, 12] {
            for cr in 1..=4u8 {
                let codewords: Vec<Vec<u8>> = (0..sf)
                    .map(|row| {
                        (0..4 + cr as usize)
                            .map(|col| ((row * 31 + col * 7) % 2) as u8)
                            .collect()
                    })
                    .collect();
                let groups = interleave(&codewords, sf, cr);
                assert_eq!(groups.len(), 4 + cr as usize);

                let mut deinter = Deinterleaver::<u8>::new(sf, cr);
                let mut out = None;
                for group in groups {
                    assert!(out.is_none(), "block emitted early");
                    out = deinter.push(group);
                }
                assert_eq!(out.expect("block complete"), codewords);
            }
        }
    }

    #[test]
    fn reset_discards_partial_block() {
        let mut deinter = Deinterleaver::<u8>::new(7, 4);
        assert!(deinter.push(vec![1; 7]).is_none());
        deinter.reset();
        deinter.set_cr(1);
        // fresh CR1 block needs exactly five groups
        for _ in 0..4 {
            assert!(deinter.push(vec![0; 7]).is_none());
        }
        assert!(deinter.push(vec![0; 7]).is_some());
    }

    #[test]
    fn diagonal_actually_moves_bits_across_rows() {
        let sf = 7;
        let mut codewords = vec![vec![0u8; 8]; sf];
        codewords[0] = vec![1; 8];
        let groups = interleave(&codewords, sf, 4);
        // the marked codeword's bits land in a different row of every group
        let rows: Vec<usize> = groups
            .iter()
            .map(|g| g.iter().position(|&b| b == 1).unwrap())
            .collect();
        let mut sorted = rows.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert!(sorted.len() > 1);
    }
}
