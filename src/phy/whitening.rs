//! Payload dewhitening.
//!
//! The transmitter XORs every payload byte with an 8-bit LFSR sequence
//! (initial state 0xFF, feedback taps 1/3/4/5, MSB out). The receiver
//! regenerates the same sequence, restarting at payload byte 0 of each
//! frame. Trailing CRC bytes are sent unwhitened and must be passed
//! through untouched.

const INITIAL_STATE: u8 = 0xFF;
const FEEDBACK_MASK: u8 = 0b0011_1010;

/// Whitening sequence generator. XOR is its own inverse, so the same type
/// serves the encoder and the dewhitener.
#[derive(Debug, Clone)]
pub struct Whitening {
    state: u8,
}

impl Default for Whitening {
    fn default() -> Self {
        Self::new()
    }
}

impl Whitening {
    pub fn new() -> Self {
        Self {
            state: INITIAL_STATE,
        }
    }

    /// Restart the sequence. Called at the start of every frame.
    pub fn reset(&mut self) {
        self.state = INITIAL_STATE;
    }

    fn step(&mut self) -> u8 {
        let feedback = (self.state & FEEDBACK_MASK).count_ones() as u8 & 1;
        let out = (self.state >> 7) & 1;
        self.state = (self.state << 1) | feedback;
        out
    }

    /// Next whitening byte, MSB first.
    pub fn next_byte(&mut self) -> u8 {
        let mut byte = 0u8;
        for i in 0..8 {
            byte |= self.step() << (7 - i);
        }
        byte
    }

    /// XOR the sequence over `data` in place.
    pub fn process(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn involutive() {
        let original: Vec<u8> = (0..64).map(|i| (i * 37) as u8).collect();
        let mut data = original.clone();

        let mut w = Whitening::new();
        w.process(&mut data);
        assert_ne!(data, original);

        w.reset();
        w.process(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn sequence_restarts_per_frame() {
        let mut w = Whitening::new();
        let first: Vec<u8> = (0..8).map(|_| w.next_byte()).collect();
        w.reset();
        let second: Vec<u8> = (0..8).map(|_| w.next_byte()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn breaks_up_constant_input() {
        let mut data = [0u8; 16];
        Whitening::new().process(&mut data);
        assert!(data.iter().any(|&b| b != 0));
    }
}
