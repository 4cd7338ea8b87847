//! Decoded message sinks.

use crossbeam_channel::Sender;
use tracing::warn;

use crate::phy::pipeline::{CrcStatus, DecodedMessage};

pub trait MessageSink {
    fn deliver(&mut self, msg: &DecodedMessage);
}

/// Prints each frame to stdout: hex dump, a lossy UTF-8 rendering and the
/// CRC verdict.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl MessageSink for TerminalSink {
    fn deliver(&mut self, msg: &DecodedMessage) {
        let hex: Vec<String> = msg.bytes.iter().map(|b| format!("{b:02x}")).collect();
        let text = String::from_utf8_lossy(&msg.bytes);
        let verdict = match msg.crc_ok {
            CrcStatus::Pass => "crc ok",
            CrcStatus::Fail => "CRC FAILED",
            CrcStatus::Unverified => "no crc",
        };
        println!("[{}] {} | {:?}", verdict, hex.join(" "), text);
    }
}

/// Forwards frames over a channel to another thread.
pub struct ChannelSink {
    tx: Sender<DecodedMessage>,
}

impl ChannelSink {
    pub fn new(tx: Sender<DecodedMessage>) -> Self {
        Self { tx }
    }
}

impl MessageSink for ChannelSink {
    fn deliver(&mut self, msg: &DecodedMessage) {
        if self.tx.send(msg.clone()).is_err() {
            warn!("message receiver hung up, dropping frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn channel_sink_forwards() {
        let (tx, rx) = unbounded();
        let mut sink = ChannelSink::new(tx);
        let msg = DecodedMessage {
            bytes: vec![0x50, 0x49],
            crc_ok: CrcStatus::Pass,
        };
        sink.deliver(&msg);
        assert_eq!(rx.try_recv().unwrap(), msg);
    }
}
