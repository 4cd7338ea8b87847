//! Receiver configuration and startup validation.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Full parameter set of one receive session. Everything here is fixed for
/// the lifetime of the pipeline; per-frame parameters discovered from the
/// header live in `phy::header::FrameParams` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RxConfig {
    /// Spreading factor, 7..=12.
    pub sf: u32,
    /// Channel bandwidth in Hz.
    pub bandwidth: u32,
    /// Baseband sample rate in Hz. Must be an integer multiple of the
    /// bandwidth; the ratio is the oversampling factor.
    pub sample_rate: u32,
    /// Payload coding rate 1..=4 (4/5 .. 4/8). In explicit header mode this
    /// is only the default until the header overrides it.
    pub cr: u8,
    /// Implicit header mode: no header block is transmitted, payload
    /// length / CR / CRC presence are fixed by this configuration.
    pub implicit_header: bool,
    /// CRC presence, used when `implicit_header` is set.
    pub has_crc: bool,
    /// Payload length in bytes, used when `implicit_header` is set.
    pub payload_len: usize,
    /// Sync word byte. Expands to two sync symbols on the air; both
    /// nibbles must be non-zero.
    pub sync_word: u8,
    /// Soft-decision decoding of the FEC.
    pub soft_decoding: bool,
    /// Minimum run of near-identical preamble upchirps required to declare
    /// a preamble lock.
    pub min_preamble_syms: usize,
}

impl Default for RxConfig {
    /// Defaults matching the flowgraph this receiver replaces: SF7,
    /// 125 kHz, 2 MS/s, CR 4/5, explicit header, private sync word.
    fn default() -> Self {
        Self {
            sf: 7,
            bandwidth: 125_000,
            sample_rate: 2_000_000,
            cr: 1,
            implicit_header: false,
            has_crc: false,
            payload_len: 255,
            sync_word: 0x12,
            soft_decoding: false,
            min_preamble_syms: 6,
        }
    }
}

impl RxConfig {
    /// Validate the configuration. This is the only fatal error path of the
    /// receiver; everything after a successful `validate` is recoverable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(7..=12).contains(&self.sf) {
            return Err(ConfigError::SpreadingFactor(self.sf));
        }
        if !(1..=4).contains(&self.cr) {
            return Err(ConfigError::CodingRate(self.cr));
        }
        if self.bandwidth == 0 {
            return Err(ConfigError::ZeroBandwidth);
        }
        if self.sample_rate == 0 || self.sample_rate % self.bandwidth != 0 {
            return Err(ConfigError::NonIntegerOversampling {
                sample_rate: self.sample_rate,
                bandwidth: self.bandwidth,
            });
        }
        if self.implicit_header && !(1..=255).contains(&self.payload_len) {
            return Err(ConfigError::ImplicitPayloadLen(self.payload_len));
        }
        if self.min_preamble_syms < 4 {
            return Err(ConfigError::PreambleLen(self.min_preamble_syms));
        }
        // a zero nibble expands to sync symbol 0, indistinguishable from
        // a residual preamble upchirp
        if self.sync_word >> 4 == 0 || self.sync_word & 0x0F == 0 {
            return Err(ConfigError::SyncWord(self.sync_word));
        }
        Ok(())
    }

    /// Number of FFT bins per symbol, 2^SF.
    pub fn bins(&self) -> usize {
        1 << self.sf
    }

    /// Oversampling factor sample_rate / bandwidth.
    pub fn os_factor(&self) -> usize {
        (self.sample_rate / self.bandwidth) as usize
    }

    /// Raw samples per symbol at the configured sample rate.
    pub fn samples_per_symbol(&self) -> usize {
        self.bins() * self.os_factor()
    }

    /// The two sync symbol values derived from the sync word byte. Each
    /// nibble maps to an expected preamble bin, shifted up by three bits.
    pub fn sync_symbols(&self) -> [u16; 2] {
        [
            ((self.sync_word >> 4) as u16) << 3,
            ((self.sync_word & 0x0F) as u16) << 3,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = RxConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bins(), 128);
        assert_eq!(cfg.os_factor(), 16);
        assert_eq!(cfg.samples_per_symbol(), 2048);
    }

    #[test]
    fn rejects_fractional_oversampling() {
        let cfg = RxConfig {
            sample_rate: 1_900_000,
            ..RxConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonIntegerOversampling { .. })
        ));
    }

    #[test]
    fn rejects_bad_sf_and_cr() {
        let cfg = RxConfig {
            sf: 13,
            ..RxConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::SpreadingFactor(13))));
        let cfg = RxConfig {
            cr: 0,
            ..RxConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::CodingRate(0))));
    }

    #[test]
    fn sync_word_expansion() {
        let cfg = RxConfig::default();
        assert_eq!(cfg.sync_symbols(), [0x08, 0x10]);
    }

    #[test]
    fn rejects_zero_nibble_sync_words() {
        for sync_word in [0x0Fu8, 0xF0, 0x00] {
            let cfg = RxConfig {
                sync_word,
                ..RxConfig::default()
            };
            assert!(
                matches!(cfg.validate(), Err(ConfigError::SyncWord(w)) if w == sync_word),
                "{sync_word:#04x} accepted"
            );
        }
    }
}
