use std::collections::VecDeque;
use std::sync::Arc;

use log::{trace, warn};

use crate::structs::start_code::{START_CODE_PREFIX, StartCode};
use crate::utils::errors::ExtractError;

/// Splits a continuous elementary stream into start-code delimited units.
///
/// A unit runs from a start code prefix `00 00 01` to the next prefix. The
/// last unit of a stream has no following prefix and is only released once
/// [`finish`](Extractor::finish) has been called.
///
/// # Example
///
/// ```rust,no_run
/// use esyntax::process::EXAMPLE_DATA;
/// use esyntax::process::extract::Extractor;
///
/// let mut extractor = Extractor::default();
/// extractor.push_bytes(EXAMPLE_DATA);
/// extractor.finish();
///
/// for unit in extractor {
///     let unit = unit.unwrap();
///     println!("{} at {:#X}: {} bytes", unit.kind(), unit.offset, unit.as_ref().len());
/// }
/// ```
#[derive(Debug, Default)]
pub struct Extractor {
    buffer: VecDeque<u8>,
    /// Stream offset of the first buffered byte.
    offset: u64,
    /// Bytes past the current start code already searched for the next one.
    scanned: usize,
    finished: bool,
    units_extracted: usize,
    bytes_skipped: u64,
}

impl Extractor {
    /// Adds raw stream data to the internal buffer.
    ///
    /// Units become available from the iterator as soon as the start code of
    /// the following unit has been pushed.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Marks the end of the stream so the last buffered unit is released.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn units_extracted(&self) -> usize {
        self.units_extracted
    }

    pub fn bytes_skipped(&self) -> u64 {
        self.bytes_skipped
    }

    fn find_prefix(&mut self, from: usize) -> Option<usize> {
        let data = self.buffer.make_contiguous();

        data.get(from..)?
            .windows(START_CODE_PREFIX.len())
            .position(|w| w == START_CODE_PREFIX)
            .map(|p| p + from)
    }

    /// Drops `len` bytes before a start code. Zero bytes are stream stuffing
    /// and dropped silently, anything else is reported as skipped.
    fn discard(&mut self, len: usize) -> Option<ExtractError> {
        if !self.buffer.range(..len).all(|b| *b == 0) {
            return Some(self.skip(len));
        }

        trace!("{len} zero bytes at {:#X}", self.offset);
        self.buffer.drain(..len);
        self.offset += len as u64;
        self.scanned = 0;
        None
    }

    fn skip(&mut self, len: usize) -> ExtractError {
        let error = ExtractError::SkippedBytes {
            offset: self.offset,
            len,
        };

        self.buffer.drain(..len);
        self.offset += len as u64;
        self.bytes_skipped += len as u64;
        self.scanned = 0;

        warn!("{error}");
        error
    }
}

impl Iterator for Extractor {
    type Item = Result<Unit, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let len = match self.find_prefix(0) {
                Some(0) => break,
                Some(start) => start,
                None => {
                    // a partial prefix may still be completed by the next push
                    let keep = if self.finished { 0 } else { 2 };
                    self.buffer.len().saturating_sub(keep)
                }
            };

            if len == 0 {
                return None;
            }
            if let Some(error) = self.discard(len) {
                return Some(Err(error));
            }
        }

        if self.buffer.len() < 4 {
            if !self.finished || self.buffer.is_empty() {
                return None;
            }
            return self.discard(self.buffer.len()).map(Err);
        }

        let end = match self.find_prefix(self.scanned.max(4)) {
            Some(end) => end,
            None if self.finished => self.buffer.len(),
            None => {
                self.scanned = self.buffer.len().saturating_sub(2).max(4);
                return None;
            }
        };

        let start_code = self.buffer[3];
        let offset = self.offset;
        let data = self.buffer.drain(..end).skip(4).collect::<Arc<[u8]>>();

        self.offset += end as u64;
        self.scanned = 0;
        self.units_extracted += 1;

        Some(Ok(Unit {
            start_code,
            offset,
            data,
        }))
    }
}

/// One start-code delimited unit.
///
/// `data` is the payload after the four start code bytes, up to but not
/// including the next start code prefix. Zero bytes stuffed before the next
/// start code are part of the payload.
#[derive(Debug, Clone)]
pub struct Unit {
    pub start_code: u8,
    /// Stream offset of the start code prefix.
    pub offset: u64,
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for Unit {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Unit {
    pub fn kind(&self) -> StartCode {
        StartCode::from(self.start_code)
    }

    /// Unit size in the stream, start code included.
    pub fn stream_len(&self) -> usize {
        self.data.len() + 4
    }
}

#[test]
fn extract_example_stream() -> anyhow::Result<()> {
    use crate::process::{EXAMPLE_DATA, EXAMPLE_UNITS};

    let mut extractor = Extractor::default();
    extractor.push_bytes(EXAMPLE_DATA);

    // the sequence end has no following start code yet
    let units = (&mut extractor).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(units.len(), EXAMPLE_UNITS - 1);

    extractor.finish();
    let last = extractor.next().unwrap()?;
    assert_eq!(last.kind(), StartCode::SequenceEnd);
    assert!(last.as_ref().is_empty());
    assert!(extractor.next().is_none());

    assert_eq!(units[0].kind(), StartCode::SequenceHeader);
    assert_eq!(units[0].offset, 0);
    assert_eq!(units[0].as_ref().len(), 8);
    assert_eq!(units[1].offset, 12);
    assert_eq!(units[5].kind(), StartCode::Slice(1));

    let total = units.iter().map(Unit::stream_len).sum::<usize>() + last.stream_len();
    assert_eq!(total, EXAMPLE_DATA.len());
    assert_eq!(extractor.units_extracted(), EXAMPLE_UNITS);
    Ok(())
}

#[test]
fn byte_by_byte_push() -> anyhow::Result<()> {
    use crate::process::{EXAMPLE_DATA, EXAMPLE_UNITS};

    let mut extractor = Extractor::default();
    let mut units = Vec::new();

    for byte in EXAMPLE_DATA {
        extractor.push_bytes(&[*byte]);
        for unit in &mut extractor {
            units.push(unit?);
        }
    }
    extractor.finish();
    for unit in &mut extractor {
        units.push(unit?);
    }

    assert_eq!(units.len(), EXAMPLE_UNITS);
    assert_eq!(units[3].kind(), StartCode::Picture);
    assert_eq!(units[3].as_ref(), &[0x00, 0x0F, 0xFF, 0xF8]);
    assert_eq!(extractor.bytes_skipped(), 0);
    Ok(())
}

#[test]
fn leading_garbage_is_skipped() {
    use crate::process::EXAMPLE_DATA;

    let mut data = vec![0xFF, 0x12, 0x00];
    data.extend_from_slice(EXAMPLE_DATA);

    let mut extractor = Extractor::default();
    extractor.push_bytes(&data);
    extractor.finish();

    let mut skipped = Vec::new();
    let mut units = 0;
    for result in extractor {
        match result {
            Ok(_) => units += 1,
            Err(ExtractError::SkippedBytes { offset, len }) => skipped.push((offset, len)),
        }
    }

    assert_eq!(skipped, [(0, 3)]);
    assert_eq!(units, 7);
}

#[test]
fn zero_stuffing_stays_in_payload() -> anyhow::Result<()> {
    let mut extractor = Extractor::default();
    extractor.push_bytes(&[0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x40, 0x00, 0x00]);
    extractor.push_bytes(&[0x00, 0x00, 0x01, 0xB7, 0x00, 0x00]);
    extractor.finish();

    let units = extractor.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].as_ref().len(), 6);
    assert_eq!(units[1].offset, 10);
    assert_eq!(units[1].as_ref(), &[0x00, 0x00]);
    Ok(())
}

#[test]
fn leading_zero_bytes_are_not_skipped() -> anyhow::Result<()> {
    use crate::process::{EXAMPLE_DATA, EXAMPLE_UNITS};

    let mut data = vec![0x00, 0x00];
    data.extend_from_slice(EXAMPLE_DATA);
    data.push(0x00);

    let mut extractor = Extractor::default();
    extractor.push_bytes(&data[..1]);
    assert!(extractor.next().is_none());
    extractor.push_bytes(&data[1..]);
    extractor.finish();

    let units = (&mut extractor).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(units.len(), EXAMPLE_UNITS);
    assert_eq!(units[0].offset, 2);
    assert_eq!(units[1].offset, 14);
    assert_eq!(extractor.bytes_skipped(), 0);
    Ok(())
}
