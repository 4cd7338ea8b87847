//! Explicit header parsing and the feedback edge back to the frame
//! synchronizer.
//!
//! The header occupies the first five nibbles of the first decoded block:
//! payload length (two nibbles), a flags nibble `(cr << 1) | has_crc`, and
//! a five-bit checksum over the twelve data bits. A valid header overwrites
//! the live frame parameters; an invalid one aborts the frame. Both
//! verdicts travel upstream through a single-slot [`Mailbox`] so the
//! ordering constraint ("applied before the synchronizer decides the next
//! block boundary") stays explicit instead of hiding in shared state.

use tracing::{debug, warn};

/// Live parameter set of the frame currently being decoded. Defaults come
/// from the session configuration; in explicit header mode the header
/// decoder overwrites coding rate, payload length and CRC presence exactly
/// once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    pub cr: u8,
    pub payload_len: usize,
    pub has_crc: bool,
}

impl FrameParams {
    /// Total nibbles a frame with these parameters carries after the
    /// header: payload plus the optional 16-bit CRC.
    pub fn nibbles_needed(&self) -> usize {
        2 * self.payload_len + if self.has_crc { 4 } else { 0 }
    }

    /// Total data symbols of an explicit-header frame: the CR=4 header
    /// block plus payload blocks at the frame coding rate. The header
    /// block itself already carries `sf - 5` payload nibbles.
    pub fn symbols_explicit(&self, sf: usize) -> usize {
        let rest = self.nibbles_needed().saturating_sub(sf - 5);
        8 + rest.div_ceil(sf) * (4 + self.cr as usize)
    }

    /// Total data symbols of an implicit-header frame: every block runs at
    /// the configured coding rate.
    pub fn symbols_implicit(&self, sf: usize) -> usize {
        self.nibbles_needed().div_ceil(sf) * (4 + self.cr as usize)
    }
}

/// Five-bit header checksum over the twelve length/flag bits. Every
/// single-bit corruption of the data bits flips at least one check bit.
pub fn checksum(n0: u8, n1: u8, n2: u8) -> u8 {
    let bit = |n: u8, b: u8| (n >> b) & 1;
    let c4 = bit(n0, 3) ^ bit(n0, 2) ^ bit(n0, 1) ^ bit(n0, 0);
    let c3 = bit(n0, 3) ^ bit(n1, 3) ^ bit(n1, 2) ^ bit(n1, 1) ^ bit(n2, 0);
    let c2 = bit(n0, 2) ^ bit(n1, 3) ^ bit(n1, 0) ^ bit(n2, 3) ^ bit(n2, 1);
    let c1 = bit(n0, 1) ^ bit(n1, 2) ^ bit(n1, 0) ^ bit(n2, 2) ^ bit(n2, 1) ^ bit(n2, 0);
    let c0 = bit(n0, 0) ^ bit(n1, 1) ^ bit(n2, 3) ^ bit(n2, 2) ^ bit(n2, 1) ^ bit(n2, 0);
    (c4 << 4) | (c3 << 3) | (c2 << 2) | (c1 << 1) | c0
}

/// Build the five header nibbles for a frame. Encoder-side counterpart of
/// [`HeaderDecoder::decode`].
pub fn encode(payload_len: usize, cr: u8, has_crc: bool) -> [u8; 5] {
    debug_assert!(payload_len <= 255);
    let n0 = (payload_len >> 4) as u8;
    let n1 = (payload_len & 0x0F) as u8;
    let n2 = (cr << 1) | has_crc as u8;
    let chk = checksum(n0, n1, n2);
    [n0, n1, n2, (chk >> 4) & 1, chk & 0x0F]
}

/// Message sent from the header decoder upstream to the frame
/// synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameInfo {
    /// Header valid: adopt these parameters for the rest of the frame.
    Params(FrameParams),
    /// Header invalid: abort the frame, return to search.
    Abort,
}

/// Single-slot mailbox carrying the header verdict against the data-flow
/// direction. Single writer, single reader, drained once per frame.
#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Option<T>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn post(&mut self, value: T) {
        debug_assert!(self.slot.is_none(), "mailbox overwritten before take");
        self.slot = Some(value);
    }

    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// Parses the first decoded block of an explicit-header frame.
#[derive(Debug)]
pub struct HeaderDecoder;

impl HeaderDecoder {
    /// Validate the received header nibbles and produce the feedback
    /// message for the synchronizer.
    pub fn decode(nibbles: &[u8]) -> FrameInfo {
        debug_assert!(nibbles.len() >= 5);
        let payload_len = ((nibbles[0] as usize) << 4) | nibbles[1] as usize;
        let cr = nibbles[2] >> 1;
        let has_crc = nibbles[2] & 1 == 1;
        let received = ((nibbles[3] & 1) << 4) | (nibbles[4] & 0x0F);
        let expected = checksum(nibbles[0], nibbles[1], nibbles[2]);

        if received != expected {
            warn!(
                "header checksum mismatch (got {received:#04x}, want {expected:#04x}), dropping frame"
            );
            return FrameInfo::Abort;
        }
        if cr > 4 || payload_len == 0 {
            warn!("header parsed but invalid (len={payload_len}, cr={cr}), dropping frame");
            return FrameInfo::Abort;
        }
        debug!("header ok: len={payload_len} cr={cr} crc={has_crc}");
        FrameInfo::Params(FrameParams {
            cr,
            payload_len,
            has_crc,
        })
    }
}
