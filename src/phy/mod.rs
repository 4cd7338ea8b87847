// LoRa PHY receive chain: frame synchronization, chirp demodulation, Gray
// demapping, deinterleaving, Hamming decoding, header parsing, dewhitening
// and CRC verification, plus the reference encoder used for loopback.

pub mod chirp;
pub mod crc;
pub mod encoder;
pub mod frame_sync;
pub mod gray;
pub mod hamming;
pub mod header;
pub mod interleaver;
pub mod pipeline;
pub mod whitening;

pub use hamming::FecStatus;

use num_complex::Complex32;

use chirp::argmax;

/// Hard/soft decision capability, selected once when the receiver is
/// built. Each stage of the bit path is generic over this trait instead of
/// branching at runtime.
pub trait Decision: 'static {
    /// Demodulator output for one symbol.
    type Symbol: Clone + std::fmt::Debug + Send;
    /// Per-bit metric flowing through Gray demap, deinterleaver and FEC.
    type Metric: Copy + Default + std::fmt::Debug + Send;

    /// Reduce the dechirped FFT spectrum to a symbol.
    fn symbol_from_spectrum(spectrum: &[Complex32]) -> Self::Symbol;

    /// Gray-demap a symbol into SF bit metrics, MSB first.
    fn gray_demap(symbol: &Self::Symbol, sf: u32) -> Vec<Self::Metric>;

    /// Decode one (4 + cr)-bit codeword into a nibble.
    fn decode_codeword(cw: &[Self::Metric], cr: u8) -> (u8, FecStatus);
}

/// Hard decisions: one bin index per symbol, bits are 0/1.
pub struct HardDecision;

impl Decision for HardDecision {
    type Symbol = u16;
    type Metric = u8;

    fn symbol_from_spectrum(spectrum: &[Complex32]) -> u16 {
        let mags: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
        argmax(&mags) as u16
    }

    fn gray_demap(symbol: &u16, sf: u32) -> Vec<u8> {
        gray::demap_hard(*symbol, sf)
    }

    fn decode_codeword(cw: &[u8], cr: u8) -> (u8, FecStatus) {
        hamming::decode_hard(cw, cr)
    }
}

/// Soft decisions: the full magnitude spectrum per symbol, log-likelihood
/// metrics per bit, maximum-likelihood FEC decoding.
pub struct SoftDecision;

impl Decision for SoftDecision {
    type Symbol = Vec<f32>;
    type Metric = f32;

    fn symbol_from_spectrum(spectrum: &[Complex32]) -> Vec<f32> {
        spectrum.iter().map(|c| c.norm()).collect()
    }

    fn gray_demap(symbol: &Vec<f32>, sf: u32) -> Vec<f32> {
        gray::demap_soft(symbol, sf)
    }

    fn decode_codeword(cw: &[f32], cr: u8) -> (u8, FecStatus) {
        hamming::decode_soft(cw, cr)
    }
}
