//! Frame synchronization: preamble detection, sync word check, SFD timing
//! alignment and symbol gating.
//!
//! The synchronizer walks the raw oversampled stream one symbol window at
//! a time. While searching it looks for a run of near-identical up-chirp
//! values (the preamble), estimates the coarse timing offset from the run
//! and the fractional frequency offset from the phase drift of consecutive
//! preamble FFT peaks. The SFD down-chirp then splits the residual offset
//! into an integer CFO that is fed into the demodulator as a phase
//! pre-rotation plus a timing shift. In frame, it emits aligned, corrected
//! symbol windows until the expected symbol count — which for explicit
//! headers is only known once the header decoder reports back.

use num_complex::Complex32;
use std::f32::consts::TAU;
use tracing::{debug, trace, warn};

use super::chirp::{ChirpDemodulator, ChirpRef};
use super::header::FrameParams;
use crate::config::RxConfig;

/// Synchronizer state. `SfdAlign` consumes the whole 2.25-symbol SFD in
/// one step, so it never observes a partial down-chirp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Searching,
    PreambleLocked,
    SyncWordCheck,
    SfdAlign,
    InFrame,
}

/// Output of one synchronizer step.
#[derive(Debug)]
pub enum SyncEvent {
    /// State housekeeping only; nothing for downstream.
    None,
    /// Preamble, sync word and SFD all matched; data symbols follow.
    FrameStart,
    /// One aligned, frequency-corrected, decimated symbol window.
    /// `last` marks the final symbol of the frame.
    Symbol { window: Vec<Complex32>, last: bool },
}

fn circ_dist(a: u16, b: u16, n: usize) -> usize {
    let d = (a as isize - b as isize).rem_euclid(n as isize) as usize;
    d.min(n - d)
}

fn most_frequent(values: &[u16]) -> u16 {
    let mut best = values[0];
    let mut best_count = 0;
    for &candidate in values {
        let count = values.iter().filter(|&&v| v == candidate).count();
        if count > best_count {
            best_count = count;
            best = candidate;
        }
    }
    best
}

pub struct FrameSynchronizer {
    sf: u32,
    bins: usize,
    os: usize,
    spsym: usize,
    sync_syms: [u16; 2],
    min_preamble: usize,
    implicit: bool,
    implicit_symbols: usize,
    demod: ChirpDemodulator,

    state: SyncState,
    run_bins: Vec<u16>,
    run_peaks: Vec<Complex32>,
    last_bin: Option<u16>,
    cfo_frac: f32,
    expected_symbols: Option<usize>,
    symbols_out: usize,
}

impl FrameSynchronizer {
    pub fn new(cfg: &RxConfig) -> Self {
        let implicit_params = FrameParams {
            cr: cfg.cr,
            payload_len: cfg.payload_len,
            has_crc: cfg.has_crc,
        };
        Self {
            sf: cfg.sf,
            bins: cfg.bins(),
            os: cfg.os_factor(),
            spsym: cfg.samples_per_symbol(),
            sync_syms: cfg.sync_symbols(),
            min_preamble: cfg.min_preamble_syms,
            implicit: cfg.implicit_header,
            implicit_symbols: implicit_params.symbols_implicit(cfg.sf as usize),
            demod: ChirpDemodulator::new(cfg.sf, cfg.os_factor()),
            state: SyncState::Searching,
            run_bins: Vec::new(),
            run_peaks: Vec::new(),
            last_bin: None,
            cfo_frac: 0.0,
            expected_symbols: None,
            symbols_out: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Feedback edge from the header decoder: adopt the decoded frame
    /// parameters. Returns true when the frame is already complete (the
    /// whole payload fit into the header block).
    pub fn apply_frame_info(&mut self, params: FrameParams) -> bool {
        let total = params.symbols_explicit(self.sf as usize);
        trace!("frame parameters adopted: {} data symbols expected", total);
        self.expected_symbols = Some(total);
        if self.symbols_out >= total {
            self.reset_to_search();
            return true;
        }
        false
    }

    /// Abort the current frame (header checksum failure or uncorrectable
    /// header FEC) and return to search.
    pub fn abort_frame(&mut self) {
        debug!("frame aborted, returning to search");
        self.reset_to_search();
    }

    fn reset_to_search(&mut self) {
        self.state = SyncState::Searching;
        self.run_bins.clear();
        self.run_peaks.clear();
        self.last_bin = None;
        self.cfo_frac = 0.0;
        self.expected_symbols = None;
        self.symbols_out = 0;
        self.demod.clear_correction();
    }

    fn required_samples(&self) -> usize {
        match self.state {
            // one window plus worst-case timing alignment
            SyncState::Searching => 2 * self.spsym,
            // 2.25 SFD symbols plus the integer-CFO timing shift
            SyncState::SfdAlign => 3 * self.spsym,
            _ => self.spsym,
        }
    }

    /// Fractional CFO from the phase drift of consecutive preamble peaks,
    /// in bins.
    fn estimate_cfo_frac(&self, k_hat: u16) -> f32 {
        let mut acc = Complex32::new(0.0, 0.0);
        for i in 1..self.run_bins.len() {
            if self.run_bins[i] == k_hat && self.run_bins[i - 1] == k_hat {
                acc += self.run_peaks[i] * self.run_peaks[i - 1].conj();
            }
        }
        if acc.norm() <= f32::EPSILON {
            return 0.0;
        }
        acc.arg() / TAU
    }

    /// Process the head of the sample buffer. Returns the number of
    /// samples consumed and the resulting event, or `None` when more
    /// samples are needed.
    pub fn step(&mut self, samples: &[Complex32]) -> Option<(usize, SyncEvent)> {
        if samples.len() < self.required_samples() {
            return None;
        }
        match self.state {
            SyncState::Searching => Some(self.step_searching(samples)),
            SyncState::PreambleLocked => Some(self.step_preamble_locked(samples)),
            SyncState::SyncWordCheck => Some(self.step_sync_word(samples)),
            SyncState::SfdAlign => Some(self.step_sfd(samples)),
            SyncState::InFrame => Some(self.step_in_frame(samples)),
        }
    }

    fn step_searching(&mut self, samples: &[Complex32]) -> (usize, SyncEvent) {
        let window = &samples[..self.spsym];
        let Some((bin, peak)) = self.demod.demod_raw(window, ChirpRef::Down) else {
            // no signal energy, cannot be a preamble
            self.run_bins.clear();
            self.run_peaks.clear();
            self.last_bin = None;
            return (self.spsym, SyncEvent::None);
        };

        let continues = self
            .last_bin
            .is_some_and(|last| circ_dist(bin, last, self.bins) <= 1);
        if !continues {
            self.run_bins.clear();
            self.run_peaks.clear();
        }
        self.run_bins.push(bin);
        self.run_peaks.push(peak);
        self.last_bin = Some(bin);

        if self.run_bins.len() < self.min_preamble {
            return (self.spsym, SyncEvent::None);
        }

        // preamble run long enough: lock, align to the symbol grid
        let k_hat = most_frequent(&self.run_bins);
        self.cfo_frac = self.estimate_cfo_frac(k_hat);
        let align = ((self.bins - k_hat as usize) % self.bins) * self.os;
        debug!(
            "preamble locked after {} symbols (k_hat={}, cfo_frac={:.4})",
            self.run_bins.len(),
            k_hat,
            self.cfo_frac
        );
        self.run_bins.clear();
        self.run_peaks.clear();
        self.last_bin = None;
        self.state = SyncState::PreambleLocked;
        (self.spsym + align, SyncEvent::None)
    }

    fn step_preamble_locked(&mut self, samples: &[Complex32]) -> (usize, SyncEvent) {
        match self.demod.demod_raw(&samples[..self.spsym], ChirpRef::Down) {
            Some((bin, _)) if circ_dist(bin, 0, self.bins) <= 1 => {
                // residual preamble upchirp, keep waiting for the sync word
                (self.spsym, SyncEvent::None)
            }
            Some((bin, _)) if circ_dist(bin, self.sync_syms[0], self.bins) <= 2 => {
                self.state = SyncState::SyncWordCheck;
                (self.spsym, SyncEvent::None)
            }
            other => {
                trace!("sync word mismatch after lock ({other:?}), back to search");
                self.reset_to_search();
                (self.spsym, SyncEvent::None)
            }
        }
    }

    fn step_sync_word(&mut self, samples: &[Complex32]) -> (usize, SyncEvent) {
        match self.demod.demod_raw(&samples[..self.spsym], ChirpRef::Down) {
            Some((bin, _)) if circ_dist(bin, self.sync_syms[1], self.bins) <= 2 => {
                self.state = SyncState::SfdAlign;
                (self.spsym, SyncEvent::None)
            }
            other => {
                trace!("second sync symbol mismatch ({other:?}), back to search");
                self.reset_to_search();
                (self.spsym, SyncEvent::None)
            }
        }
    }

    fn step_sfd(&mut self, samples: &[Complex32]) -> (usize, SyncEvent) {
        let Some((down_val, _)) = self.demod.demod_raw(&samples[..self.spsym], ChirpRef::Up)
        else {
            self.reset_to_search();
            return (self.spsym, SyncEvent::None);
        };

        // The down-chirp sees timing and frequency error with opposite
        // signs, so half the measured bin offset is integer CFO. Offsets
        // beyond a quarter symbol are unrecoverable here.
        let d = down_val as isize;
        let cfo_int = if d < self.bins as isize / 2 {
            d / 2
        } else {
            (d - self.bins as isize) / 2
        };
        self.demod.set_correction(cfo_int, self.cfo_frac);

        // consume the remaining 1.25 SFD symbols, shifted by the CFO
        let consume =
            self.spsym as isize + (self.spsym * 5 / 4) as isize + cfo_int * self.os as isize;
        debug!("SFD aligned (down_val={down_val}, cfo_int={cfo_int})");
        self.state = SyncState::InFrame;
        self.symbols_out = 0;
        self.expected_symbols = if self.implicit {
            Some(self.implicit_symbols)
        } else {
            None
        };
        (consume.max(0) as usize, SyncEvent::FrameStart)
    }

    fn step_in_frame(&mut self, samples: &[Complex32]) -> (usize, SyncEvent) {
        if self.expected_symbols.is_none() && self.symbols_out >= 8 {
            // the header verdict must have arrived before the 9th symbol
            warn!("no frame parameters after header block, aborting frame");
            self.reset_to_search();
            return (self.spsym, SyncEvent::None);
        }

        let window = self.demod.corrected_window(&samples[..self.spsym]);
        self.symbols_out += 1;
        let last = self.expected_symbols == Some(self.symbols_out);
        if last {
            self.reset_to_search();
        }
        (self.spsym, SyncEvent::Symbol { window, last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::chirp::{downchirp, upchirp};

    fn test_config() -> RxConfig {
        RxConfig {
            sf: 7,
            bandwidth: 125_000,
            sample_rate: 500_000,
            implicit_header: true,
            payload_len: 4,
            has_crc: false,
            cr: 1,
            ..RxConfig::default()
        }
    }

    /// preamble + sync word + SFD + `data` symbols, with `lead` zeros.
    fn build_stream(cfg: &RxConfig, lead: usize, data: &[u16]) -> Vec<Complex32> {
        let os = cfg.os_factor();
        let mut stream = vec![Complex32::new(0.0, 0.0); lead];
        for _ in 0..8 {
            stream.extend(upchirp(cfg.sf, os, 0));
        }
        let [s1, s2] = cfg.sync_symbols();
        stream.extend(upchirp(cfg.sf, os, s1));
        stream.extend(upchirp(cfg.sf, os, s2));
        let down = downchirp(cfg.sf, os);
        stream.extend(&down);
        stream.extend(&down);
        stream.extend(&down[..cfg.samples_per_symbol() / 4]);
        for &s in data {
            stream.extend(upchirp(cfg.sf, os, s));
        }
        stream.extend(vec![Complex32::new(0.0, 0.0); cfg.samples_per_symbol() * 3]);
        stream
    }

    fn run(sync: &mut FrameSynchronizer, stream: &[Complex32]) -> Vec<(Vec<Complex32>, bool)> {
        let mut offset = 0;
        let mut symbols = Vec::new();
        while let Some((consumed, event)) = sync.step(&stream[offset..]) {
            offset += consumed;
            if let SyncEvent::Symbol { window, last } = event {
                symbols.push((window, last));
            }
        }
        symbols
    }

    fn demod_hard(cfg: &RxConfig, window: &[Complex32]) -> u16 {
        use crate::phy::chirp::argmax;
        let demod = ChirpDemodulator::new(cfg.sf, 1);
        let mags = demod.magnitudes(window, ChirpRef::Down);
        argmax(&mags) as u16
    }

    #[test]
    fn locks_and_emits_expected_symbol_count() {
        let cfg = test_config();
        // implicit, 4 bytes, no CRC -> 8 nibbles -> 2 CR1 blocks -> 10 symbols
        let data: Vec<u16> = (0..10).map(|i| (i * 11) as u16 % 128).collect();
        let stream = build_stream(&cfg, 0, &data);
        let mut sync = FrameSynchronizer::new(&cfg);
        let symbols = run(&mut sync, &stream);
        assert_eq!(symbols.len(), 10);
        assert!(symbols.last().unwrap().1, "last symbol flagged");
        assert_eq!(sync.state(), SyncState::Searching);
        for (i, (window, _)) in symbols.iter().enumerate() {
            assert_eq!(demod_hard(&cfg, window), data[i], "symbol {i}");
        }
    }

    #[test]
    fn locks_with_misaligned_stream() {
        let cfg = test_config();
        let data: Vec<u16> = (0..10).map(|i| (i * 7 + 3) as u16 % 128).collect();
        // a lead that is not a multiple of the symbol length
        let lead = cfg.samples_per_symbol() / 3 + cfg.os_factor() * 5;
        let lead = lead - lead % cfg.os_factor();
        let stream = build_stream(&cfg, lead, &data);
        let mut sync = FrameSynchronizer::new(&cfg);
        let symbols = run(&mut sync, &stream);
        assert_eq!(symbols.len(), 10);
        for (i, (window, _)) in symbols.iter().enumerate() {
            assert_eq!(demod_hard(&cfg, window), data[i], "symbol {i}");
        }
    }

    #[test]
    fn short_preamble_does_not_lock() {
        let cfg = test_config();
        let os = cfg.os_factor();
        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend(upchirp(cfg.sf, os, 0));
        }
        stream.extend(vec![Complex32::new(0.0, 0.0); cfg.samples_per_symbol() * 8]);
        let mut sync = FrameSynchronizer::new(&cfg);
        let symbols = run(&mut sync, &stream);
        assert!(symbols.is_empty());
        assert_eq!(sync.state(), SyncState::Searching);
    }

    #[test]
    fn wrong_sync_word_returns_to_search() {
        let cfg = test_config();
        let wrong = RxConfig {
            sync_word: 0x34,
            ..cfg.clone()
        };
        let stream = build_stream(&wrong, 0, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let mut sync = FrameSynchronizer::new(&cfg);
        let symbols = run(&mut sync, &stream);
        assert!(symbols.is_empty());
        assert_eq!(sync.state(), SyncState::Searching);
    }
}
