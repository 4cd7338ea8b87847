//! The assembled receive chain.
//!
//! [`Receiver`] owns the frame synchronizer and the bit path and drives
//! them off a growing sample buffer: samples are appended, the
//! synchronizer consumes from the front, and the buffer is compacted once
//! the read offset grows large. The hard/soft decision mode is picked
//! once at construction; everything downstream of the FFT is generic over
//! [`Decision`].

use std::marker::PhantomData;

use num_complex::Complex32;
use tracing::{debug, info, warn};

use super::chirp::{ChirpDemodulator, ChirpRef};
use super::frame_sync::{FrameSynchronizer, SyncEvent};
use super::header::{FrameInfo, FrameParams, HeaderDecoder, Mailbox};
use super::interleaver::Deinterleaver;
use super::whitening::Whitening;
use super::{crc, Decision, FecStatus, HardDecision, SoftDecision};
use crate::config::RxConfig;

/// CRC-16 verdict attached to every decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    Pass,
    Fail,
    /// The frame carried no CRC trailer.
    Unverified,
}

/// One decoded frame record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub bytes: Vec<u8>,
    pub crc_ok: CrcStatus,
}

/// Receive-side counters, reported at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RxStats {
    pub frames_detected: u64,
    pub frames_decoded: u64,
    pub header_drops: u64,
    pub crc_pass: u64,
    pub crc_fail: u64,
    pub fec_corrected: u64,
    pub fec_detected: u64,
}

pub struct Chain<D: Decision> {
    cfg: RxConfig,
    sync: FrameSynchronizer,
    // os=1: windows arriving from the synchronizer are already decimated
    // and frequency corrected
    demod: ChirpDemodulator,
    deinter: Deinterleaver<D::Metric>,
    mailbox: Mailbox<FrameInfo>,
    params: FrameParams,
    header_pending: bool,
    frame_nibbles: Vec<u8>,
    buffer: Vec<Complex32>,
    offset: usize,
    stats: RxStats,
    _decision: PhantomData<D>,
}

impl<D: Decision> Chain<D> {
    fn new(cfg: &RxConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            sync: FrameSynchronizer::new(cfg),
            demod: ChirpDemodulator::new(cfg.sf, 1),
            deinter: Deinterleaver::new(cfg.sf as usize, cfg.cr),
            mailbox: Mailbox::new(),
            params: FrameParams {
                cr: cfg.cr,
                payload_len: cfg.payload_len,
                has_crc: cfg.has_crc,
            },
            header_pending: false,
            frame_nibbles: Vec::new(),
            buffer: Vec::new(),
            offset: 0,
            stats: RxStats::default(),
            _decision: PhantomData,
        }
    }

    fn process(&mut self, samples: &[Complex32], out: &mut Vec<DecodedMessage>) {
        self.buffer.extend_from_slice(samples);
        while let Some((consumed, event)) = self.sync.step(&self.buffer[self.offset..]) {
            self.offset += consumed;
            match event {
                SyncEvent::None => {}
                SyncEvent::FrameStart => self.start_frame(),
                SyncEvent::Symbol { window, last } => self.on_symbol(&window, last, out),
            }
        }
        // compact once the consumed prefix dominates the buffer
        if self.offset > self.buffer.len() / 2 {
            self.buffer.drain(..self.offset);
            self.offset = 0;
        }
    }

    fn start_frame(&mut self) {
        self.stats.frames_detected += 1;
        self.params = FrameParams {
            cr: self.cfg.cr,
            payload_len: self.cfg.payload_len,
            has_crc: self.cfg.has_crc,
        };
        self.header_pending = !self.cfg.implicit_header;
        self.deinter.reset();
        self.deinter
            .set_cr(if self.header_pending { 4 } else { self.cfg.cr });
        self.frame_nibbles.clear();
        self.mailbox.clear();
        debug!("frame start");
    }

    fn on_symbol(&mut self, window: &[Complex32], last: bool, out: &mut Vec<DecodedMessage>) {
        let spectrum = self.demod.spectrum(window, ChirpRef::Down);
        let symbol = D::symbol_from_spectrum(&spectrum);
        let metrics = D::gray_demap(&symbol, self.cfg.sf);
        if let Some(codewords) = self.deinter.push(metrics) {
            self.on_block(&codewords, out);
        }
        // the frame always ends on a block boundary, so the last symbol
        // has just flushed the final block
        if last {
            self.finalize_frame(out);
        }
    }

    fn on_block(&mut self, codewords: &[Vec<D::Metric>], out: &mut Vec<DecodedMessage>) {
        let cr = if self.header_pending { 4 } else { self.params.cr };
        let mut nibbles = Vec::with_capacity(codewords.len());
        let mut uncorrectable = false;
        for cw in codewords {
            let (nibble, status) = D::decode_codeword(cw, cr);
            match status {
                FecStatus::Clean => {}
                FecStatus::Corrected => self.stats.fec_corrected += 1,
                FecStatus::Detected => {
                    self.stats.fec_detected += 1;
                    uncorrectable = true;
                }
            }
            nibbles.push(nibble);
        }

        if self.header_pending {
            self.header_pending = false;
            let verdict = if uncorrectable {
                warn!("uncorrectable error inside header block, dropping frame");
                FrameInfo::Abort
            } else {
                HeaderDecoder::decode(&nibbles[..5])
            };
            self.mailbox.post(verdict);
            self.drain_mailbox(&nibbles[5..], out);
        } else {
            self.frame_nibbles.extend_from_slice(&nibbles);
        }
    }

    /// Apply the header verdict to the synchronizer before it gates the
    /// next symbol.
    fn drain_mailbox(&mut self, rest_of_block: &[u8], out: &mut Vec<DecodedMessage>) {
        match self.mailbox.take() {
            Some(FrameInfo::Params(params)) => {
                self.params = params;
                self.deinter.set_cr(params.cr);
                self.frame_nibbles.extend_from_slice(rest_of_block);
                if self.sync.apply_frame_info(params) {
                    // whole frame fit into the header block
                    self.finalize_frame(out);
                }
            }
            Some(FrameInfo::Abort) => {
                self.stats.header_drops += 1;
                self.sync.abort_frame();
                self.deinter.reset();
                self.frame_nibbles.clear();
            }
            None => unreachable!("header block decoded without verdict"),
        }
    }

    fn finalize_frame(&mut self, out: &mut Vec<DecodedMessage>) {
        let needed = self.params.nibbles_needed();
        if self.frame_nibbles.len() < needed {
            warn!(
                "frame ended short of {} nibbles ({} received), dropping",
                needed,
                self.frame_nibbles.len()
            );
            self.frame_nibbles.clear();
            return;
        }

        let mut whitening = Whitening::new();
        let byte_at = |i: usize| (self.frame_nibbles[2 * i] << 4) | self.frame_nibbles[2 * i + 1];
        let bytes: Vec<u8> = (0..self.params.payload_len)
            .map(|i| byte_at(i) ^ whitening.next_byte())
            .collect();

        let crc_ok = if self.params.has_crc {
            let trailer = [
                byte_at(self.params.payload_len),
                byte_at(self.params.payload_len + 1),
            ];
            if crc::verify(&bytes, trailer) {
                self.stats.crc_pass += 1;
                CrcStatus::Pass
            } else {
                self.stats.crc_fail += 1;
                CrcStatus::Fail
            }
        } else {
            CrcStatus::Unverified
        };

        self.stats.frames_decoded += 1;
        info!(
            "frame decoded: {} bytes, crc {:?}",
            bytes.len(),
            crc_ok
        );
        self.frame_nibbles.clear();
        out.push(DecodedMessage { bytes, crc_ok });
    }
}

/// The complete receiver. Hard or soft decision is fixed at construction
/// from the configuration.
pub enum Receiver {
    Hard(Box<Chain<HardDecision>>),
    Soft(Box<Chain<SoftDecision>>),
}

impl Receiver {
    pub fn new(cfg: &RxConfig) -> Self {
        if cfg.soft_decoding {
            Receiver::Soft(Box::new(Chain::new(cfg)))
        } else {
            Receiver::Hard(Box::new(Chain::new(cfg)))
        }
    }

    /// Feed a slab of baseband samples; returns the frames completed by it.
    pub fn process_samples(&mut self, samples: &[Complex32]) -> Vec<DecodedMessage> {
        let mut out = Vec::new();
        match self {
            Receiver::Hard(chain) => chain.process(samples, &mut out),
            Receiver::Soft(chain) => chain.process(samples, &mut out),
        }
        out
    }

    pub fn stats(&self) -> RxStats {
        match self {
            Receiver::Hard(chain) => chain.stats,
            Receiver::Soft(chain) => chain.stats,
        }
    }
}
