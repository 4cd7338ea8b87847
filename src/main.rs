use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use num_complex::Complex32;
use tracing::{error, info};

use chirpdec::sink::{MessageSink, TerminalSink};
use chirpdec::source::{Cf32FileSource, SampleSource, StdinSource};
use chirpdec::utils::logging::init_logging;
use chirpdec::{Receiver, RxConfig};

/// Samples handed from the reader thread to the decoder per slab.
const SLAB_SAMPLES: usize = 1 << 16;

#[derive(Parser, Debug)]
#[command(
    name = "chirpdec",
    about = "LoRa PHY receiver for cf32 baseband captures"
)]
struct Args {
    /// cf32 capture file (interleaved LE I/Q floats); reads stdin when omitted
    input: Option<PathBuf>,

    /// JSON configuration file; overrides all the tuning flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Spreading factor, 7..=12
    #[arg(long, default_value_t = 7)]
    sf: u32,

    /// Channel bandwidth in Hz
    #[arg(long, default_value_t = 125_000)]
    bandwidth: u32,

    /// Baseband sample rate in Hz, an integer multiple of the bandwidth
    #[arg(long, default_value_t = 2_000_000)]
    sample_rate: u32,

    /// Coding rate 1..=4 (4/5 .. 4/8)
    #[arg(long, default_value_t = 1)]
    cr: u8,

    /// Implicit header mode (payload length, CR and CRC fixed by flags)
    #[arg(long)]
    implicit_header: bool,

    /// Expect a CRC trailer (implicit header mode)
    #[arg(long)]
    crc: bool,

    /// Payload length in bytes (implicit header mode)
    #[arg(long, default_value_t = 255)]
    payload_len: usize,

    /// Sync word byte, e.g. 18 for the private network word 0x12
    #[arg(long, default_value_t = 0x12)]
    sync_word: u8,

    /// Soft-decision FEC decoding
    #[arg(long)]
    soft: bool,
}

fn build_config(args: &Args) -> Result<RxConfig, Box<dyn Error>> {
    if let Some(path) = &args.config {
        let file = std::fs::File::open(path)?;
        return Ok(serde_json::from_reader(file)?);
    }
    Ok(RxConfig {
        sf: args.sf,
        bandwidth: args.bandwidth,
        sample_rate: args.sample_rate,
        cr: args.cr,
        implicit_header: args.implicit_header,
        has_crc: args.crc,
        payload_len: args.payload_len,
        sync_word: args.sync_word,
        soft_decoding: args.soft,
        ..RxConfig::default()
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args = Args::parse();
    let cfg = build_config(&args)?;
    cfg.validate()?;
    info!(
        "starting receiver: sf={} bw={} fs={} os={} {} header, {} decisions",
        cfg.sf,
        cfg.bandwidth,
        cfg.sample_rate,
        cfg.os_factor(),
        if cfg.implicit_header { "implicit" } else { "explicit" },
        if cfg.soft_decoding { "soft" } else { "hard" },
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }

    let mut source: Box<dyn SampleSource + Send> = match &args.input {
        Some(path) => Box::new(Cf32FileSource::open(path)?),
        None => Box::new(StdinSource::new()),
    };

    let (tx, rx) = bounded::<Vec<Complex32>>(16);
    let reader = thread::spawn(move || loop {
        let mut slab = vec![Complex32::default(); SLAB_SAMPLES];
        match source.read(&mut slab) {
            Ok(0) => break,
            Ok(n) => {
                slab.truncate(n);
                if tx.send(slab).is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("sample source failed: {e}");
                break;
            }
        }
    });

    let mut receiver = Receiver::new(&cfg);
    let mut sink = TerminalSink;
    loop {
        if stop.load(Ordering::SeqCst) {
            info!("interrupted, draining");
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(slab) => {
                for msg in receiver.process_samples(&slab) {
                    sink.deliver(&msg);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    drop(rx);
    let _ = reader.join();

    let stats = receiver.stats();
    info!(
        "done: {} frames detected, {} decoded ({} crc ok, {} crc failed), {} header drops, fec {}corr/{}det",
        stats.frames_detected,
        stats.frames_decoded,
        stats.crc_pass,
        stats.crc_fail,
        stats.header_drops,
        stats.fec_corrected,
        stats.fec_detected,
    );
    Ok(())
}
