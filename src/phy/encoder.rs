//! Reference frame encoder. Mirrors every receive stage in the transmit
//! direction: whitening, CRC trailer, Hamming encoding, diagonal
//! interleaving, Gray mapping and chirp modulation. The receiver does not
//! need it; loopback tests and signal generation do.

use num_complex::Complex32;

use super::chirp::{downchirp, upchirp};
use super::whitening::Whitening;
use super::{crc, gray, hamming, header, interleaver};
use crate::config::RxConfig;

pub struct FrameEncoder {
    sf: u32,
    os: usize,
    cr: u8,
    implicit: bool,
    has_crc: bool,
    sync_syms: [u16; 2],
    preamble_len: usize,
}

impl FrameEncoder {
    pub fn new(cfg: &RxConfig, preamble_len: usize) -> Self {
        Self {
            sf: cfg.sf,
            os: cfg.os_factor(),
            cr: cfg.cr,
            implicit: cfg.implicit_header,
            has_crc: cfg.has_crc,
            sync_syms: cfg.sync_symbols(),
            preamble_len,
        }
    }

    /// Nibble stream of one frame: optional header, whitened payload,
    /// unwhitened CRC trailer. High nibble of each byte first.
    pub fn frame_nibbles(&self, payload: &[u8]) -> Vec<u8> {
        let mut nibbles = Vec::new();
        if !self.implicit {
            nibbles.extend(header::encode(payload.len(), self.cr, self.has_crc));
        }
        let mut whitening = Whitening::new();
        for &byte in payload {
            let w = byte ^ whitening.next_byte();
            nibbles.push(w >> 4);
            nibbles.push(w & 0x0F);
        }
        if self.has_crc {
            for byte in crc::trailer(payload) {
                nibbles.push(byte >> 4);
                nibbles.push(byte & 0x0F);
            }
        }
        nibbles
    }

    /// Turn a nibble stream into data symbols, block by block. The first
    /// block of an explicit-header frame always runs at CR=4.
    pub fn symbols_from_nibbles(&self, nibbles: &[u8]) -> Vec<u16> {
        let sf = self.sf as usize;
        let mut symbols = Vec::new();
        for (index, block) in nibbles.chunks(sf).enumerate() {
            let cr = if !self.implicit && index == 0 { 4 } else { self.cr };
            let mut codewords: Vec<Vec<u8>> = block
                .iter()
                .map(|&n| hamming::encode(n, cr))
                .collect();
            codewords.resize(sf, hamming::encode(0, cr));
            for group in interleaver::interleave(&codewords, sf, cr) {
                let value = group
                    .iter()
                    .fold(0u16, |acc, &bit| (acc << 1) | bit as u16);
                symbols.push(gray::from_gray(value));
            }
        }
        symbols
    }

    /// Modulate a complete frame: preamble up-chirps, two sync word
    /// symbols, the 2.25-symbol SFD and the data chirps.
    pub fn modulate(&self, symbols: &[u16]) -> Vec<Complex32> {
        let spsym = (1usize << self.sf) * self.os;
        let mut samples = Vec::with_capacity((self.preamble_len + 5 + symbols.len()) * spsym);
        for _ in 0..self.preamble_len {
            samples.extend(upchirp(self.sf, self.os, 0));
        }
        samples.extend(upchirp(self.sf, self.os, self.sync_syms[0]));
        samples.extend(upchirp(self.sf, self.os, self.sync_syms[1]));
        let down = downchirp(self.sf, self.os);
        samples.extend(&down);
        samples.extend(&down);
        samples.extend(&down[..spsym / 4]);
        for &s in symbols {
            samples.extend(upchirp(self.sf, self.os, s));
        }
        samples
    }

    /// Full sample stream for one payload.
    pub fn encode(&self, payload: &[u8]) -> Vec<Complex32> {
        let symbols = self.symbols_from_nibbles(&self.frame_nibbles(payload));
        self.modulate(&symbols)
    }
}
