//! Run-length bit packing of one distance histogram.
//!
//! ```text
//! [ runs: W1 ] ( [ start: W2 ][ length: W2' ][ value: W3 ] * length ) * runs
//! ```
//!
//! A run is a maximal stretch of non-zero bins. Widths come from the bin
//! count and the largest bin value, never from the data.

use super::bits::{bits_needed, BitReader, BitWriter};
use crate::model::BINS_HISTOGRAM;
use crate::{Error, Result};

/// Largest value a bin can hold.
pub const MAX_BIN_VALUE: usize = u8::MAX as usize;

/// Alternating occupied/empty bins give at most `ceil(BINS / 2)` runs.
pub const MAX_RUNS: usize = BINS_HISTOGRAM.div_ceil(2);

/// W1: width of the run count.
pub const BITS_RUN_COUNT: u32 = bits_needed(MAX_RUNS);
/// W2: width of a run start position.
pub const BITS_POSITION: u32 = bits_needed(BINS_HISTOGRAM - 1);
/// Width of a run length; a run may cover every bin.
pub const BITS_RUN_LENGTH: u32 = bits_needed(BINS_HISTOGRAM);
/// W3: width of one bin value.
pub const BITS_BIN_VALUE: u32 = bits_needed(MAX_BIN_VALUE);

/// `(start, length)` of every run of non-zero bins.
pub fn occupied_runs(hist: &[u8]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut k = 0;
    while k < hist.len() {
        if hist[k] == 0 {
            k += 1;
            continue;
        }
        let start = k;
        while k < hist.len() && hist[k] != 0 {
            k += 1;
        }
        runs.push((start, k - start));
    }
    runs
}

/// Append one histogram to the bit stream.
pub fn write_histogram(writer: &mut BitWriter, hist: &[u8]) {
    debug_assert_eq!(hist.len(), BINS_HISTOGRAM);
    let runs = occupied_runs(hist);
    writer.write(runs.len() as u32, BITS_RUN_COUNT);
    for (start, len) in runs {
        writer.write(start as u32, BITS_POSITION);
        writer.write(len as u32, BITS_RUN_LENGTH);
        for &value in &hist[start..start + len] {
            writer.write(u32::from(value), BITS_BIN_VALUE);
        }
    }
}

/// Read one histogram; finished once its encoded run count is satisfied.
pub fn read_histogram(reader: &mut BitReader<'_>) -> Result<[u8; BINS_HISTOGRAM]> {
    let truncated = || Error::Decode("histogram bit stream truncated".into());

    let mut hist = [0u8; BINS_HISTOGRAM];
    let runs = reader.read(BITS_RUN_COUNT).ok_or_else(truncated)? as usize;
    if runs > MAX_RUNS {
        return Err(Error::Decode(format!("{runs} runs exceed the maximum of {MAX_RUNS}")));
    }

    let mut next_free = 0;
    for _ in 0..runs {
        let start = reader.read(BITS_POSITION).ok_or_else(truncated)? as usize;
        let len = reader.read(BITS_RUN_LENGTH).ok_or_else(truncated)? as usize;
        if len == 0 || start < next_free || start + len > BINS_HISTOGRAM {
            return Err(Error::Decode(format!(
                "run [{start}, {}) is out of order or outside {BINS_HISTOGRAM} bins",
                start + len
            )));
        }
        for bin in &mut hist[start..start + len] {
            // BITS_BIN_VALUE == 8
            *bin = reader.read(BITS_BIN_VALUE).ok_or_else(truncated)? as u8;
        }
        next_free = start + len;
    }
    Ok(hist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_bin_count() {
        assert_eq!(MAX_RUNS, 40);
        assert_eq!(BITS_RUN_COUNT, 6);
        assert_eq!(BITS_POSITION, 7);
        assert_eq!(BITS_RUN_LENGTH, 7);
        assert_eq!(BITS_BIN_VALUE, 8);
    }

    #[test]
    fn runs_are_maximal() {
        let mut h = [0u8; BINS_HISTOGRAM];
        h[0] = 1;
        h[1] = 2;
        h[5] = 3;
        h[BINS_HISTOGRAM - 1] = 4;
        assert_eq!(occupied_runs(&h), vec![(0, 2), (5, 1), (BINS_HISTOGRAM - 1, 1)]);
    }

    #[test]
    fn empty_histogram_costs_only_the_run_count() {
        let mut w = BitWriter::new();
        write_histogram(&mut w, &[0u8; BINS_HISTOGRAM]);
        assert_eq!(w.len(), BITS_RUN_COUNT as usize);
    }

    #[test]
    fn alternating_and_full_histograms_survive() {
        let mut alternating = [0u8; BINS_HISTOGRAM];
        for k in (0..BINS_HISTOGRAM).step_by(2) {
            alternating[k] = 255;
        }
        let full = [9u8; BINS_HISTOGRAM];

        let mut w = BitWriter::new();
        write_histogram(&mut w, &alternating);
        write_histogram(&mut w, &full);
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        assert_eq!(read_histogram(&mut r).unwrap(), alternating);
        assert_eq!(read_histogram(&mut r).unwrap(), full);
        assert!(r.only_padding_left());
    }

    #[test]
    fn overlapping_runs_are_rejected() {
        let mut w = BitWriter::new();
        w.write(2, BITS_RUN_COUNT);
        w.write(10, BITS_POSITION);
        w.write(3, BITS_RUN_LENGTH);
        for _ in 0..3 {
            w.write(1, BITS_BIN_VALUE);
        }
        w.write(11, BITS_POSITION);
        w.write(1, BITS_RUN_LENGTH);
        w.write(1, BITS_BIN_VALUE);
        let bytes = w.into_bytes();
        assert!(read_histogram(&mut BitReader::new(&bytes)).is_err());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut w = BitWriter::new();
        w.write(1, BITS_RUN_COUNT);
        w.write(0, BITS_POSITION);
        let bytes = w.into_bytes();
        assert!(matches!(read_histogram(&mut BitReader::new(&bytes)), Err(Error::Decode(_))));
    }
}
