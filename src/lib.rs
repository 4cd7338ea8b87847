// LoRa PHY receiver: frame synchronization, chirp demodulation and FEC
// decoding of a continuous complex baseband sample stream.

pub mod config;
pub mod error;
pub mod phy;
pub mod sink;
pub mod source;
pub mod utils;

pub use config::RxConfig;
pub use error::ConfigError;
pub use phy::pipeline::{CrcStatus, DecodedMessage, Receiver, RxStats};
