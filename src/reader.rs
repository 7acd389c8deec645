//! Streamed reading of delimited text with automatic delimiter detection.
//!
//! A [`DelimitedReader`] wraps any rewindable byte stream. Construction
//! sniffs the field separator from the first 20 lines, then rewinds; the
//! reader afterwards hands out the header row and numbered data rows, and
//! can reposition itself to the start of the data section.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use anyhow::{Context, Result, bail};
use itertools::{Itertools, MinMaxResult};

pub const DELIMITER_CANDIDATES: &[u8] = &[b',', b';', b'\t', b' ', b'|'];
const DETECTION_SAMPLE_LINES: usize = 20;

/// Occurrence statistics for one candidate delimiter across sampled lines.
#[derive(Debug, Clone, Copy)]
struct CandidateScore {
    delimiter: u8,
    min_per_line: usize,
    max_per_line: usize,
}

impl CandidateScore {
    /// Every sampled line carries the same non-zero number of occurrences.
    fn is_uniform(&self) -> bool {
        self.min_per_line == self.max_per_line && self.max_per_line > 0
    }
}

/// Picks the most plausible delimiter for the sampled lines.
///
/// Uniform per-line counts beat raw frequency; among uniform candidates the
/// higher count wins. When nothing is uniform, candidates present on every
/// line are preferred, then the highest observed count. Comma is the
/// fallback when no candidate appears at all.
pub fn detect_delimiter(lines: &[String]) -> u8 {
    let scores: Vec<CandidateScore> = DELIMITER_CANDIDATES
        .iter()
        .map(|&delimiter| {
            let per_line = lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count());
            let (min_per_line, max_per_line) = match per_line.minmax() {
                MinMaxResult::NoElements => (0, 0),
                MinMaxResult::OneElement(n) => (n, n),
                MinMaxResult::MinMax(min, max) => (min, max),
            };
            CandidateScore {
                delimiter,
                min_per_line,
                max_per_line,
            }
        })
        .collect();

    let best = scores.iter().max_by_key(|score| {
        (
            score.is_uniform(),
            score.min_per_line > 0,
            score.max_per_line,
        )
    });

    match best {
        Some(score) if score.max_per_line > 0 => score.delimiter,
        _ => b',',
    }
}

/// Row-oriented reader over a rewindable delimited stream.
pub struct DelimitedReader<R: Read + Seek> {
    reader: Option<csv::Reader<R>>,
    delimiter: u8,
    header_consumed: bool,
    data_rows_read: u64,
}

impl<R: Read + Seek> DelimitedReader<R> {
    /// Detects the delimiter over the first lines of `stream`, rewinds, and
    /// positions the reader at row 1.
    pub fn new(mut stream: R) -> Result<Self> {
        let mut sample = Vec::with_capacity(DETECTION_SAMPLE_LINES);
        {
            let buffered = BufReader::new(&mut stream);
            for line in buffered.lines().take(DETECTION_SAMPLE_LINES) {
                sample.push(line.context("failed to read sample line")?);
            }
        }
        let delimiter = detect_delimiter(&sample);
        stream
            .seek(SeekFrom::Start(0))
            .context("failed to rewind stream after delimiter detection")?;
        Ok(Self {
            reader: Some(Self::build_reader(stream, delimiter)),
            delimiter,
            header_consumed: false,
            data_rows_read: 0,
        })
    }

    fn build_reader(stream: R, delimiter: u8) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .double_quote(true)
            .flexible(false)
            .from_reader(stream)
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    fn reader_mut(&mut self) -> &mut csv::Reader<R> {
        self.reader
            .as_mut()
            .expect("reader is only vacated transiently during reset")
    }

    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        let mut record = csv::StringRecord::new();
        let more = self
            .reader_mut()
            .read_record(&mut record)
            .context("failed to read delimited record")?;
        if !more {
            return Ok(None);
        }
        Ok(Some(record.iter().map(|field| field.to_string()).collect()))
    }

    /// Reads the header row. Fails once the reader has advanced past it.
    pub fn read_header_row(&mut self) -> Result<Vec<String>> {
        if self.header_consumed || self.data_rows_read > 0 {
            bail!("header row was already consumed");
        }
        let header = self
            .next_record()?
            .context("input contains no header row")?;
        self.header_consumed = true;
        Ok(header)
    }

    /// Advances one record, returning its fields and 1-based row number.
    /// `None` marks end of input without error.
    pub fn read_row(&mut self) -> Result<Option<(Vec<String>, u64)>> {
        match self.next_record()? {
            Some(fields) => {
                self.data_rows_read += 1;
                Ok(Some((fields, self.data_rows_read)))
            }
            None => Ok(None),
        }
    }

    /// Seeks back to the start of the stream; optionally re-consumes the
    /// header so the next `read_row` yields the first data row.
    pub fn reset_read_position(&mut self, skip_header: bool) -> Result<()> {
        let reader = self
            .reader
            .take()
            .expect("reader is only vacated transiently during reset");
        let mut stream = reader.into_inner();
        stream
            .seek(SeekFrom::Start(0))
            .context("failed to rewind stream")?;
        self.reader = Some(Self::build_reader(stream, self.delimiter));
        self.header_consumed = false;
        self.data_rows_read = 0;
        if skip_header {
            self.read_header_row()
                .context("failed to skip header while repositioning")?;
        }
        Ok(())
    }
}
