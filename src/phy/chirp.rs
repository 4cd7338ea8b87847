//! Reference chirp generation and FFT demodulation.
//!
//! A LoRa symbol is a cyclically shifted up-chirp. Demodulation multiplies
//! the (decimated) sample window with the conjugate reference chirp and
//! takes the FFT; the bin index of maximum magnitude is the symbol value.
//! Phase accumulation is done in f64: at SF12 with a high oversampling
//! factor the squared time index exceeds f32 precision.

use std::f64::consts::TAU;
use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// Shifted up-chirp at the given oversampling factor, `bins * os` samples.
/// Symbol 0 is the base up-chirp used for the preamble.
pub fn upchirp(sf: u32, os: usize, symbol: u16) -> Vec<Complex32> {
    let n = (1usize << sf) as f64;
    let shift = symbol as f64;
    (0..(1usize << sf) * os)
        .map(|k| {
            let t = k as f64 / os as f64;
            let cycles = t * t / (2.0 * n) + t * (shift / n - 0.5);
            let phase = (TAU * cycles.rem_euclid(1.0)) as f32;
            Complex32::from_polar(1.0, phase)
        })
        .collect()
}

/// Base down-chirp, the conjugate of the base up-chirp.
pub fn downchirp(sf: u32, os: usize) -> Vec<Complex32> {
    upchirp(sf, os, 0).iter().map(|c| c.conj()).collect()
}

pub fn argmax(mags: &[f32]) -> usize {
    let mut best = 0;
    for (i, &m) in mags.iter().enumerate() {
        if m > mags[best] {
            best = i;
        }
    }
    best
}

/// Which reference the window is dechirped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChirpRef {
    /// Down-chirp reference: demodulates up-chirp (data/preamble) symbols.
    Down,
    /// Up-chirp reference: demodulates the SFD down-chirps.
    Up,
}

/// FFT demodulator for one symbol window. Holds the decimated reference
/// chirps, the FFT plan and the per-frame frequency correction handed down
/// by the frame synchronizer.
pub struct ChirpDemodulator {
    bins: usize,
    os: usize,
    down_ref: Vec<Complex32>,
    up_ref: Vec<Complex32>,
    fft: Arc<dyn Fft<f32>>,
    correction: Option<Vec<Complex32>>,
}

impl ChirpDemodulator {
    pub fn new(sf: u32, os: usize) -> Self {
        let bins = 1usize << sf;
        let down_ref = downchirp(sf, 1);
        let up_ref = upchirp(sf, 1, 0);
        let fft = FftPlanner::new().plan_fft_forward(bins);
        Self {
            bins,
            os,
            down_ref,
            up_ref,
            fft,
            correction: None,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Install the frequency correction for the current frame: integer CFO
    /// bins plus a fractional part, applied as a phase rotation on every
    /// subsequent window.
    pub fn set_correction(&mut self, cfo_int: isize, cfo_frac: f32) {
        let total = cfo_int as f32 + cfo_frac;
        if total == 0.0 {
            self.correction = None;
            return;
        }
        let rate = -TAU as f32 * total / self.bins as f32;
        self.correction = Some(
            (0..self.bins)
                .map(|n| Complex32::from_polar(1.0, rate * n as f32))
                .collect(),
        );
    }

    pub fn clear_correction(&mut self) {
        self.correction = None;
    }

    /// Decimate a raw window to one sample per chip and apply the frame
    /// frequency correction.
    pub fn corrected_window(&self, raw: &[Complex32]) -> Vec<Complex32> {
        debug_assert!(raw.len() >= self.bins * self.os);
        let mut window: Vec<Complex32> =
            raw.iter().step_by(self.os).take(self.bins).copied().collect();
        if let Some(corr) = &self.correction {
            for (w, c) in window.iter_mut().zip(corr.iter()) {
                *w *= *c;
            }
        }
        window
    }

    /// Dechirp an already decimated window and return the FFT output.
    pub fn spectrum(&self, window: &[Complex32], reference: ChirpRef) -> Vec<Complex32> {
        debug_assert_eq!(window.len(), self.bins);
        let chirp = match reference {
            ChirpRef::Down => &self.down_ref,
            ChirpRef::Up => &self.up_ref,
        };
        let mut buf: Vec<Complex32> = window
            .iter()
            .zip(chirp.iter())
            .map(|(&w, &c)| w * c)
            .collect();
        self.fft.process(&mut buf);
        buf
    }

    /// Magnitude spectrum of a decimated window.
    pub fn magnitudes(&self, window: &[Complex32], reference: ChirpRef) -> Vec<f32> {
        self.spectrum(window, reference)
            .iter()
            .map(|c| c.norm())
            .collect()
    }

    /// Hard symbol value of a raw (oversampled) window, with the complex
    /// FFT peak for phase tracking. `None` when the window carries no
    /// signal energy, which cannot be a symbol.
    pub fn demod_raw(&self, raw: &[Complex32], reference: ChirpRef) -> Option<(u16, Complex32)> {
        let window = self.corrected_window(raw);
        let spectrum = self.spectrum(&window, reference);
        let mags: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
        let total: f32 = mags.iter().sum();
        if total <= f32::EPSILON {
            return None;
        }
        let bin = argmax(&mags);
        Some((bin as u16, spectrum[bin]))
    }
}
