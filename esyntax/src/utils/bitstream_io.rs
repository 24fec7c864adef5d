//! Bit-level I/O for syntax parsing.
//!
//! [`SyntaxReader`] reads MSB-first fields from a byte extent and records
//! every read in a [`SyntaxLog`]. [`SyntaxWriter`] is the inverse used to
//! serialize parsed structures.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, UnsignedInteger};

use crate::utils::errors::ReadError;
use crate::utils::syntax_log::{EntryKind, FieldValue, LogEntry, Meanings, SyntaxLog, describe};

const MAX_FIELD_BITS: u32 = 32;
const MAX_EXP_GOLOMB_PREFIX: u32 = 31;
const HEX_PREVIEW_BYTES: usize = 8;

#[derive(Debug)]
pub struct SyntaxReader<'a> {
    data: &'a [u8],
    bs: BitReader<io::Cursor<&'a [u8]>, BigEndian>,
    pos: u64,
    len: u64,
    origin: u64,
    log: SyntaxLog,
}

impl<'a> SyntaxReader<'a> {
    /// Reader over the whole of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_bit_len(data, (data.len() as u64) << 3)
    }

    /// Reader over the first `len_bits` bits of `data`.
    pub fn with_bit_len(data: &'a [u8], len_bits: u64) -> Self {
        Self {
            data,
            bs: BitReader::new(io::Cursor::new(data)),
            pos: 0,
            len: len_bits.min((data.len() as u64) << 3),
            origin: 0,
            log: SyntaxLog::default(),
        }
    }

    pub fn read_bits<U>(&mut self, name: &str, n: u32) -> Result<U, ReadError>
    where
        U: UnsignedInteger + Into<u64>,
    {
        self.check_width(name, n)?;
        if n > U::BITS_SIZE {
            return Err(ReadError::InvalidBitCount {
                field: name.to_string(),
                bits: n,
            });
        }
        self.check_available(name, n as u64)?;

        let start = self.pos;
        let value: U = self.bs.read_unsigned_var(n)?;
        self.pos += n as u64;

        let raw: u64 = value.into();
        self.record(name, start, FieldValue::Unsigned(raw), raw, None, EntryKind::Field);

        Ok(value)
    }

    pub fn read_flag(&mut self, name: &str) -> Result<bool, ReadError> {
        self.check_available(name, 1)?;

        let start = self.pos;
        let flag = self.bs.read_bit()?;
        self.pos += 1;

        self.record(name, start, FieldValue::Flag(flag), flag as u64, None, EntryKind::Field);

        Ok(flag)
    }

    /// Reads `n` bits and labels the value from `meanings`.
    ///
    /// Values missing from the map are labelled `reserved`, never rejected.
    pub fn read_bits_with_meaning<U>(
        &mut self,
        name: &str,
        n: u32,
        meanings: &Meanings,
    ) -> Result<U, ReadError>
    where
        U: UnsignedInteger + Into<u64>,
    {
        let value: U = self.read_bits(name, n)?;
        self.annotate(describe(meanings, value.into()));

        Ok(value)
    }

    /// Reads a one-bit marker. The value is returned so the caller can
    /// validate it.
    pub fn read_marker_bit(&mut self, name: &str) -> Result<bool, ReadError> {
        let flag = self.read_flag(name)?;
        self.annotate("marker");

        Ok(flag)
    }

    /// Unsigned Exp-Golomb code, `ue(v)`.
    pub fn read_ue(&mut self, name: &str) -> Result<u32, ReadError> {
        let start = self.pos;
        let (value, code) = self.exp_golomb(name)?;

        self.record(name, start, FieldValue::Unsigned(value), code, None, EntryKind::Field);

        Ok(value as u32)
    }

    /// Signed Exp-Golomb code, `se(v)`.
    pub fn read_se(&mut self, name: &str) -> Result<i32, ReadError> {
        let start = self.pos;
        let (k, code) = self.exp_golomb(name)?;

        let value = if k & 1 == 1 {
            k.div_ceil(2) as i64
        } else {
            -((k / 2) as i64)
        };

        self.record(name, start, FieldValue::Signed(value), code, None, EntryKind::Field);

        Ok(value as i32)
    }

    /// `nextbits()`: looks ahead without consuming or logging.
    pub fn peek_bits(&mut self, n: u32) -> Result<u32, ReadError> {
        self.check_width("nextbits", n)?;
        self.check_available("nextbits", n as u64)?;

        let value = self.bs.read_unsigned_var::<u32>(n)?;
        self.bs.seek_bits(SeekFrom::Current(-(n as i64)))?;

        Ok(value)
    }

    /// Advances to the next byte boundary, logging skipped bits as padding.
    ///
    /// Returns the number of bits skipped.
    pub fn byte_align(&mut self) -> Result<u64, ReadError> {
        let skip = (8 - (self.pos & 7)) & 7;
        if skip == 0 {
            return Ok(0);
        }

        self.check_available("byte_alignment", skip)?;

        let start = self.pos;
        let code = self.bs.read_unsigned_var::<u8>(skip as u32)?;
        self.pos += skip;

        self.record(
            "byte_alignment",
            start,
            FieldValue::Unsigned(code as u64),
            code as u64,
            None,
            EntryKind::Padding,
        );

        Ok(skip)
    }

    /// Consumes `bits` bits attributed as padding.
    pub fn skip_padding(&mut self, name: &str, bits: u64) -> Result<(), ReadError> {
        if bits == 0 {
            return Ok(());
        }

        self.check_available(name, bits)?;

        let start = self.pos;
        self.advance(bits)?;
        self.record(name, start, FieldValue::Payload(bits), 0, None, EntryKind::Padding);

        Ok(())
    }

    /// Reads a byte-aligned block of `n` bytes as a single entry.
    pub fn read_bytes(&mut self, name: &str, n: usize) -> Result<&'a [u8], ReadError> {
        self.check_aligned(name)?;
        self.check_available(name, (n as u64) << 3)?;

        let start = self.pos;
        let first = (start >> 3) as usize;
        let bytes = &self.data[first..first + n];

        self.advance((n as u64) << 3)?;
        self.record(
            name,
            start,
            FieldValue::Payload((n as u64) << 3),
            0,
            Some(hex_preview(bytes)),
            EntryKind::Field,
        );

        Ok(bytes)
    }

    /// Consumes everything left in the extent as one opaque entry.
    ///
    /// Returns the number of bits consumed; nothing is logged when the extent
    /// is already exhausted.
    pub fn read_payload(&mut self, name: &str) -> Result<u64, ReadError> {
        let bits = self.available();
        if bits == 0 {
            return Ok(0);
        }

        let start = self.pos;
        self.advance(bits)?;
        self.record(name, start, FieldValue::Payload(bits), 0, None, EntryKind::Field);

        Ok(bits)
    }

    /// Child reader over the next `num_bytes` bytes.
    ///
    /// The parent advances past the bytes and records a nested marker; the
    /// child keeps absolute bit offsets and is folded back with
    /// [`merge`](Self::merge).
    pub fn sub_reader(
        &mut self,
        name: &str,
        num_bytes: usize,
    ) -> Result<SyntaxReader<'a>, ReadError> {
        self.check_aligned(name)?;
        self.check_available(name, (num_bytes as u64) << 3)?;

        let start = self.pos;
        let first = (start >> 3) as usize;

        let mut child = SyntaxReader::new(&self.data[first..first + num_bytes]);
        child.origin = self.origin + start;

        self.advance((num_bytes as u64) << 3)?;
        self.record(
            name,
            start,
            FieldValue::Payload((num_bytes as u64) << 3),
            0,
            None,
            EntryKind::Nested,
        );

        Ok(child)
    }

    /// Appends the log of a child reader one level deeper.
    pub fn merge(&mut self, child: SyntaxReader<'_>) {
        self.log.extend_nested(child.into_log());
    }

    /// Sets the meaning of the most recent entry.
    pub fn annotate(&mut self, meaning: impl Into<String>) {
        if let Some(entry) = self.log.last_mut() {
            entry.meaning = Some(meaning.into());
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn available(&self) -> u64 {
        self.len - self.pos
    }

    /// The underlying buffer, including any bits past the extent.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len_bits(&self) -> u64 {
        self.len
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.pos & 7 == 0
    }

    pub fn log(&self) -> &SyntaxLog {
        &self.log
    }

    pub fn into_log(self) -> SyntaxLog {
        self.log
    }

    fn exp_golomb(&mut self, name: &str) -> Result<(u64, u64), ReadError> {
        let start = self.pos;
        let mut leading_zeros = 0;

        loop {
            self.check_available(name, 1)?;
            let bit = self.bs.read_bit()?;
            self.pos += 1;

            if bit {
                break;
            }

            leading_zeros += 1;
            if leading_zeros > MAX_EXP_GOLOMB_PREFIX {
                return Err(ReadError::ExpGolombOverflow {
                    field: name.to_string(),
                    bit_offset: self.origin + start,
                });
            }
        }

        let suffix = if leading_zeros > 0 {
            self.check_available(name, leading_zeros as u64)?;
            let suffix = self.bs.read_unsigned_var::<u64>(leading_zeros)?;
            self.pos += leading_zeros as u64;
            suffix
        } else {
            0
        };

        Ok(((1u64 << leading_zeros) - 1 + suffix, (1u64 << leading_zeros) | suffix))
    }

    fn advance(&mut self, bits: u64) -> Result<(), ReadError> {
        self.pos += bits;
        self.bs.seek_bits(SeekFrom::Start(self.pos))?;

        Ok(())
    }

    fn check_width(&self, name: &str, n: u32) -> Result<(), ReadError> {
        if n == 0 || n > MAX_FIELD_BITS {
            return Err(ReadError::InvalidBitCount {
                field: name.to_string(),
                bits: n,
            });
        }

        Ok(())
    }

    fn check_available(&self, name: &str, n: u64) -> Result<(), ReadError> {
        if n > self.available() {
            return Err(ReadError::OutOfBufferRange {
                field: name.to_string(),
                bit_offset: self.origin + self.pos,
                requested: n,
                available: self.available(),
            });
        }

        Ok(())
    }

    fn check_aligned(&self, name: &str) -> Result<(), ReadError> {
        if !self.is_byte_aligned() {
            return Err(ReadError::Unaligned {
                field: name.to_string(),
                bit_offset: self.origin + self.pos,
            });
        }

        Ok(())
    }

    fn record(
        &mut self,
        name: &str,
        start: u64,
        value: FieldValue,
        code: u64,
        meaning: Option<String>,
        kind: EntryKind,
    ) {
        self.log.push(LogEntry {
            name: name.to_string(),
            bit_offset: self.origin + start,
            bit_len: self.pos - start,
            value,
            code,
            meaning,
            kind,
            depth: 0,
        });
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    let mut preview = bytes
        .iter()
        .take(HEX_PREVIEW_BYTES)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");

    if bytes.len() > HEX_PREVIEW_BYTES {
        preview.push_str(" ..");
    }

    preview
}

/// MSB-first bit writer producing a byte vector.
pub struct SyntaxWriter {
    bw: BitWriter<Vec<u8>, BigEndian>,
    bits: u64,
}

impl SyntaxWriter {
    pub fn new() -> Self {
        Self {
            bw: BitWriter::new(Vec::new()),
            bits: 0,
        }
    }

    pub fn put_bits<U: UnsignedInteger>(&mut self, n: u32, value: U) -> io::Result<()> {
        self.bw.write_unsigned_var(n, value)?;
        self.bits += n as u64;

        Ok(())
    }

    pub fn put_flag(&mut self, flag: bool) -> io::Result<()> {
        self.bw.write_bit(flag)?;
        self.bits += 1;

        Ok(())
    }

    pub fn put_ue(&mut self, value: u32) -> io::Result<()> {
        self.put_exp_golomb(value as u64)
    }

    pub fn put_se(&mut self, value: i32) -> io::Result<()> {
        let value = value as i64;
        let k = if value > 0 {
            2 * value - 1
        } else {
            -2 * value
        };

        self.put_exp_golomb(k as u64)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bw.write_bytes(bytes)?;
        self.bits += (bytes.len() as u64) << 3;

        Ok(())
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn byte_align(&mut self) -> io::Result<()> {
        self.bw.byte_align()?;
        self.bits = (self.bits + 7) & !7;

        Ok(())
    }

    pub fn bit_len(&self) -> u64 {
        self.bits
    }

    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        self.byte_align()?;
        Ok(self.bw.into_writer())
    }

    fn put_exp_golomb(&mut self, k: u64) -> io::Result<()> {
        let code = k + 1;
        let code_len = u64::BITS - code.leading_zeros();

        if code_len > 1 {
            self.put_bits(code_len - 1, 0u64)?;
        }

        self.put_bits(code_len, code)
    }
}

impl Default for SyntaxWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn read_fixed_width_fields() -> anyhow::Result<()> {
    let mut reader = SyntaxReader::new(&[0b1011_0010, 0xC0]);

    assert_eq!(reader.read_bits::<u8>("a", 3)?, 0b101);
    assert!(reader.read_flag("b")?);
    assert_eq!(reader.read_bits::<u16>("c", 6)?, 0b0010_11);
    assert_eq!(reader.position(), 10);
    assert_eq!(reader.available(), 6);

    let log = reader.into_log();
    assert_eq!(log.len(), 3);
    assert!(log.is_contiguous());

    let c = log.find("c").unwrap();
    assert_eq!((c.bit_offset, c.bit_len), (4, 6));
    assert_eq!(c.code_string().as_deref(), Some("001011"));
    Ok(())
}

#[test]
fn meaning_labels_and_reserved() -> anyhow::Result<()> {
    const MAP: &Meanings = &[(1, "top field"), (2, "bottom field"), (3, "frame picture")];

    let mut reader = SyntaxReader::new(&[0b1100_0000]);
    let v: u8 = reader.read_bits_with_meaning("picture_structure", 2, MAP)?;
    let r: u8 = reader.read_bits_with_meaning("picture_structure", 2, MAP)?;
    assert_eq!((v, r), (3, 0));

    let entries = reader.log().entries();
    assert_eq!(entries[0].meaning.as_deref(), Some("frame picture"));
    assert_eq!(entries[1].meaning.as_deref(), Some("reserved"));
    Ok(())
}

#[test]
fn out_of_range_names_the_field() {
    let mut reader = SyntaxReader::new(&[0xFF]);
    assert!(reader.read_bits::<u8>("a", 4).is_ok());

    let err = reader.read_bits::<u8>("b", 5).unwrap_err();
    match err {
        ReadError::OutOfBufferRange {
            field,
            bit_offset,
            requested,
            available,
        } => {
            assert_eq!(field, "b");
            assert_eq!((bit_offset, requested, available), (4, 5, 4));
        }
        other => panic!("unexpected error {other:?}"),
    }

    // the failed read neither advances nor logs
    assert_eq!(reader.position(), 4);
    assert_eq!(reader.log().len(), 1);
}

#[test]
fn explicit_bit_length_bounds_reads() {
    let mut reader = SyntaxReader::with_bit_len(&[0xFF, 0xFF], 9);
    assert!(reader.read_bits::<u8>("a", 8).is_ok());
    assert!(reader.read_flag("b").is_ok());
    assert!(matches!(
        reader.read_flag("c"),
        Err(ReadError::OutOfBufferRange { .. })
    ));

    let reader = SyntaxReader::with_bit_len(&[0xFF], 64);
    assert_eq!(reader.len_bits(), 8);
}

#[test]
fn invalid_bit_count() {
    let mut reader = SyntaxReader::new(&[0; 8]);
    assert!(matches!(
        reader.read_bits::<u32>("zero", 0),
        Err(ReadError::InvalidBitCount { bits: 0, .. })
    ));
    assert!(matches!(
        reader.read_bits::<u64>("wide", 33),
        Err(ReadError::InvalidBitCount { bits: 33, .. })
    ));
    assert!(reader.read_bits::<u32>("full", 32).is_ok());
}

#[test]
fn exp_golomb_codes() -> anyhow::Result<()> {
    // 1 | 010 | 011 | 00100 | 0000 (padding)
    let mut reader = SyntaxReader::new(&[0xA6, 0x40]);
    assert_eq!(reader.read_ue("a")?, 0);
    assert_eq!(reader.read_ue("b")?, 1);
    assert_eq!(reader.read_ue("c")?, 2);
    assert_eq!(reader.read_ue("d")?, 3);

    let d = reader.log().find("d").unwrap();
    assert_eq!((d.bit_offset, d.bit_len), (7, 5));
    assert_eq!(d.code_string().as_deref(), Some("00100"));

    let mut writer = SyntaxWriter::new();
    for v in [0, -1, 1, -2, 2, 100, -100] {
        writer.put_se(v)?;
    }
    writer.put_ue(u16::MAX as u32)?;
    let data = writer.finish()?;

    let mut reader = SyntaxReader::new(&data);
    for v in [0, -1, 1, -2, 2, 100, -100] {
        assert_eq!(reader.read_se("v")?, v);
    }
    assert_eq!(reader.read_ue("max")?, u16::MAX as u32);
    assert!(reader.log().is_contiguous());
    Ok(())
}

#[test]
fn exp_golomb_overflow() {
    let mut reader = SyntaxReader::new(&[0; 8]);
    assert!(matches!(
        reader.read_ue("long"),
        Err(ReadError::ExpGolombOverflow { bit_offset: 0, .. })
    ));
}

#[test]
fn peek_does_not_consume() -> anyhow::Result<()> {
    let mut reader = SyntaxReader::new(&[0b1010_0000]);
    reader.read_flag("first")?;

    assert_eq!(reader.peek_bits(3)?, 0b010);
    assert_eq!(reader.position(), 1);
    assert_eq!(reader.log().len(), 1);

    assert_eq!(reader.read_bits::<u8>("next", 3)?, 0b010);
    Ok(())
}

#[test]
fn byte_align_attributes_padding() -> anyhow::Result<()> {
    let mut reader = SyntaxReader::new(&[0b1100_0001, 0xAB]);
    reader.read_bits::<u8>("head", 2)?;

    assert_eq!(reader.byte_align()?, 6);
    assert_eq!(reader.byte_align()?, 0);

    let bytes = reader.read_bytes("tail", 1)?;
    assert_eq!(bytes, &[0xAB]);

    let log = reader.into_log();
    assert_eq!(log.entries()[1].kind, EntryKind::Padding);
    assert_eq!(log.entries()[1].value, FieldValue::Unsigned(1));
    assert_eq!(log.attributed_bits(), 16);
    assert!(log.is_contiguous());
    Ok(())
}

#[test]
fn unaligned_byte_read() {
    let mut reader = SyntaxReader::new(&[0, 0]);
    reader.read_flag("bit").unwrap();
    assert!(matches!(
        reader.read_bytes("block", 1),
        Err(ReadError::Unaligned { bit_offset: 1, .. })
    ));
}

#[test]
fn sub_reader_keeps_absolute_offsets() -> anyhow::Result<()> {
    let data = [0x12, 0x34, 0x56, 0x78];
    let mut reader = SyntaxReader::new(&data);
    reader.read_bits::<u8>("head", 8)?;

    let mut child = reader.sub_reader("body", 2)?;
    assert_eq!(reader.position(), 24);

    assert_eq!(child.read_bits::<u16>("word", 12)?, 0x345);
    assert_eq!(child.read_bits::<u8>("nibble", 4)?, 0x6);
    assert_eq!(child.available(), 0);
    assert!(child.read_flag("past_end").is_err());

    reader.merge(child);
    reader.read_bits::<u8>("last", 8)?;

    let log = reader.into_log();
    let word = log.find("word").unwrap();
    assert_eq!((word.bit_offset, word.depth), (8, 1));
    assert_eq!(log.entries()[1].kind, EntryKind::Nested);
    assert!(log.is_contiguous());
    assert_eq!(log.attributed_bits(), 32);
    Ok(())
}

#[test]
fn width_exceeding_target_type() {
    let mut reader = SyntaxReader::new(&[0xFF; 4]);
    assert!(matches!(
        reader.read_bits::<u8>("narrow", 9),
        Err(ReadError::InvalidBitCount { bits: 9, .. })
    ));
    assert!(matches!(
        reader.read_bits::<u16>("narrow", 17),
        Err(ReadError::InvalidBitCount { bits: 17, .. })
    ));
    assert_eq!(reader.position(), 0);
    assert!(reader.log().is_empty());
    assert!(matches!(reader.read_bits::<u8>("byte", 8), Ok(0xFF)));
}
