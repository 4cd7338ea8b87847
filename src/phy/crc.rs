//! Payload CRC-16 verification.
//!
//! CCITT polynomial 0x1021, init 0x0000, computed over all but the last two
//! payload bytes and then XORed with those two bytes. The transmitter
//! appends the result low byte first, after whitening (the CRC bytes
//! themselves are not whitened).

const CRC16_POLYNOMIAL: u16 = 0x1021;

fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC over a payload, folding in the last two data bytes.
pub fn payload_crc(payload: &[u8]) -> u16 {
    let len = payload.len();
    if len < 2 {
        return crc16(payload);
    }
    crc16(&payload[..len - 2]) ^ (payload[len - 1] as u16) ^ ((payload[len - 2] as u16) << 8)
}

/// Check a payload against its two trailing CRC bytes (low byte first).
pub fn verify(payload: &[u8], crc_bytes: [u8; 2]) -> bool {
    let received = (crc_bytes[0] as u16) | ((crc_bytes[1] as u16) << 8);
    payload_crc(payload) == received
}

/// Encode the CRC trailer for a payload.
pub fn trailer(payload: &[u8]) -> [u8; 2] {
    let crc = payload_crc(payload);
    [(crc & 0xFF) as u8, (crc >> 8) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailer_verifies() {
        let payload = b"PING";
        let t = trailer(payload);
        assert!(verify(payload, t));
    }

    #[test]
    fn detects_single_bit_flip() {
        let payload = b"hello world";
        let t = trailer(payload);
        for i in 0..payload.len() {
            for bit in 0..8 {
                let mut corrupted = payload.to_vec();
                corrupted[i] ^= 1 << bit;
                assert!(!verify(&corrupted, t), "missed flip at byte {i} bit {bit}");
            }
        }
    }

    #[test]
    fn detects_crc_byte_flip() {
        let payload = b"PING";
        let t = trailer(payload);
        assert!(!verify(payload, [t[0] ^ 0x01, t[1]]));
        assert!(!verify(payload, [t[0], t[1] ^ 0x80]));
    }

    #[test]
    fn short_payloads() {
        for payload in [&b""[..], &b"A"[..]] {
            let t = trailer(payload);
            assert!(verify(payload, t));
        }
    }
}
