//! Baseband sample sources.
//!
//! The receiver consumes complex float samples (cf32, interleaved I/Q,
//! little endian) from a file or from stdin, the formats the usual SDR
//! capture tools produce. Radio hardware never appears here; a capture is
//! piped in instead.

use std::fs::File;
use std::io::{self, BufReader, Read, Stdin};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex32;

use crate::error::SourceError;

/// A pull source of baseband samples. `read` fills as much of `buf` as it
/// can and returns the number of samples written; 0 means end of stream.
pub trait SampleSource {
    fn read(&mut self, buf: &mut [Complex32]) -> Result<usize, SourceError>;
}

fn read_cf32<R: Read>(reader: &mut R, buf: &mut [Complex32]) -> Result<usize, SourceError> {
    for (count, slot) in buf.iter_mut().enumerate() {
        let re = match reader.read_f32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(count),
            Err(e) => return Err(e.into()),
        };
        // a lone trailing float is a truncated capture, not a sample
        let im = match reader.read_f32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(count),
            Err(e) => return Err(e.into()),
        };
        *slot = Complex32::new(re, im);
    }
    Ok(buf.len())
}

/// cf32 capture file, as written by GNU Radio file sinks.
pub struct Cf32FileSource {
    reader: BufReader<File>,
}

impl Cf32FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }
}

impl SampleSource for Cf32FileSource {
    fn read(&mut self, buf: &mut [Complex32]) -> Result<usize, SourceError> {
        read_cf32(&mut self.reader, buf)
    }
}

/// cf32 stream on stdin, for piping straight out of an SDR tool.
pub struct StdinSource {
    reader: BufReader<Stdin>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(io::stdin()),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for StdinSource {
    fn read(&mut self, buf: &mut [Complex32]) -> Result<usize, SourceError> {
        read_cf32(&mut self.reader, buf)
    }
}
