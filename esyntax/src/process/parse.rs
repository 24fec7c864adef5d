use anyhow::{Context, Result};
use log::{Level, debug};

use crate::process::extract::Unit;
use crate::structs::extension::Extension;
use crate::structs::fields::{FieldList, FieldSet};
use crate::structs::group_of_pictures::GroupOfPicturesHeader;
use crate::structs::picture_coding_extension::{FRAME_PICTURE, PictureCodingExtension};
use crate::structs::picture_header::PictureHeader;
use crate::structs::sequence_extension::SequenceExtension;
use crate::structs::sequence_header::SequenceHeader;
use crate::structs::slice::Slice;
use crate::structs::start_code::StartCode;
use crate::structs::user_data::UserData;
use crate::structs::{Syntax, SyntaxStructure, report};
use crate::utils::bitstream_io::SyntaxReader;
use crate::utils::errors::SyntaxError;
use crate::utils::syntax_log::SyntaxLog;

/// Parses units into syntax structures.
///
/// Keeps the sequence and picture context that later structures depend on.
/// The context is reset by every sequence header, so independent parsers can
/// work on stream segments that each start with one.
///
/// # Example
///
/// ```rust,no_run
/// use esyntax::process::EXAMPLE_DATA;
/// use esyntax::process::extract::Extractor;
/// use esyntax::process::parse::Parser;
///
/// let mut extractor = Extractor::default();
/// let mut parser = Parser::default();
///
/// extractor.push_bytes(EXAMPLE_DATA);
/// extractor.finish();
///
/// for unit in extractor.flatten() {
///     let parsed = parser.parse(&unit)?;
///     for entry in parsed.log.entries() {
///         println!("{entry}");
///     }
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    state: ParserState,
}

impl Parser {
    /// Parses one unit extracted from a stream.
    ///
    /// Failures carry the unit offset as context; the underlying
    /// [`ReadError`](crate::utils::errors::ReadError) or
    /// [`SyntaxError`] is still reachable with `downcast_ref`.
    pub fn parse(&mut self, unit: &Unit) -> Result<ParsedUnit> {
        let mut parsed = self
            .parse_payload(unit.start_code, unit.as_ref())
            .with_context(|| format!("{} at offset {:#X}", unit.kind(), unit.offset))?;

        parsed.offset = unit.offset;
        Ok(parsed)
    }

    /// Parses the payload of a unit located by the caller.
    ///
    /// `payload` must hold exactly the bytes between the start code and the
    /// next start code prefix.
    pub fn parse_payload(&mut self, start_code: u8, payload: &[u8]) -> Result<ParsedUnit> {
        // a sequence header starts a new context even when it fails to parse
        if StartCode::from(start_code) == StartCode::SequenceHeader {
            self.state.sequence = None;
            self.state.picture = None;
        }

        // context changes are committed only for units that parse completely
        let mut state = self.state.clone();
        let mut reader = SyntaxReader::new(payload);
        let syntax = Self::parse_syntax(&mut state, start_code, &mut reader)?;
        finish_unit(&state, syntax.name(), &mut reader)?;
        self.state = state;

        Ok(ParsedUnit {
            offset: 0,
            start_code,
            syntax,
            log: reader.into_log(),
        })
    }

    fn parse_syntax(
        state: &mut ParserState,
        start_code: u8,
        reader: &mut SyntaxReader,
    ) -> Result<Syntax> {
        let syntax = match StartCode::from(start_code) {
            StartCode::SequenceHeader => {
                Syntax::SequenceHeader(SequenceHeader::parse(state, reader)?)
            }
            StartCode::Extension => Syntax::Extension(Extension::parse(state, reader)?),
            StartCode::GroupOfPictures => {
                Syntax::GroupOfPictures(GroupOfPicturesHeader::parse(state, reader)?)
            }
            StartCode::Picture => Syntax::Picture(PictureHeader::parse(state, reader)?),
            StartCode::UserData => Syntax::UserData(UserData::parse(state, reader)?),
            StartCode::Slice(_) => Syntax::Slice(Slice::parse(state, reader)?),
            StartCode::SequenceEnd => {
                debug!("Sequence end, context cleared");
                state.sequence = None;
                state.picture = None;
                Syntax::SequenceEnd
            }
            StartCode::SequenceError => Syntax::SequenceError,
            StartCode::Reserved(code) | StartCode::System(code) => Syntax::Opaque {
                start_code: code,
                payload_bits: reader.read_payload("payload")?,
            },
        };

        Ok(syntax)
    }

    /// Sets the failure level for validation findings.
    ///
    /// - `log::Level::Error`: Only fail on Error level findings (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: Level) {
        self.state.set_fail_level(level);
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }
}

/// Attributes the bits left after a structure: alignment, zero stuffing, and
/// anything else as trailing data.
fn finish_unit(
    state: &ParserState,
    structure: &'static str,
    reader: &mut SyntaxReader,
) -> Result<()> {
    if reader.available() == 0 {
        return Ok(());
    }

    reader.byte_align()?;

    let start = (reader.position() >> 3) as usize;
    let end = (reader.len_bits() >> 3) as usize;
    let rest = &reader.data()[start..end];

    if rest.iter().all(|b| *b == 0) {
        reader.skip_padding("zero_byte_stuffing", reader.available())?;
    } else {
        let bits = reader.read_payload("trailing_data")?;
        report(state, Level::Warn, SyntaxError::TrailingData { structure, bits })?;
    }

    Ok(())
}

/// One parsed unit: the structure and the log of its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    /// Stream offset of the start code prefix.
    pub offset: u64,
    pub start_code: u8,
    pub syntax: Syntax,
    pub log: SyntaxLog,
}

impl ParsedUnit {
    pub fn kind(&self) -> StartCode {
        StartCode::from(self.start_code)
    }

    pub fn fields(&self) -> FieldList {
        self.syntax.fields()
    }
}

/// Context carried from the sequence layer to later structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceContext {
    pub horizontal_size: u32,
    pub vertical_size: u32,
    /// Set once a sequence extension follows the sequence header.
    pub mpeg2: bool,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
}

impl Default for SequenceContext {
    fn default() -> Self {
        Self {
            horizontal_size: 0,
            vertical_size: 0,
            mpeg2: false,
            progressive_sequence: false,
            chroma_format: 1,
        }
    }
}

impl SequenceContext {
    pub fn from_header(header: &SequenceHeader) -> Self {
        Self {
            horizontal_size: header.horizontal_size_value as u32,
            vertical_size: header.vertical_size_value as u32,
            // MPEG-1 sequences are progressive
            progressive_sequence: true,
            ..Self::default()
        }
    }

    pub(crate) fn apply_extension(&mut self, ext: &SequenceExtension) {
        self.horizontal_size |= (ext.horizontal_size_extension as u32) << 12;
        self.vertical_size |= (ext.vertical_size_extension as u32) << 12;
        self.mpeg2 = true;
        self.progressive_sequence = ext.progressive_sequence;
        self.chroma_format = ext.chroma_format;
    }
}

/// Context of the current picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureContext {
    pub picture_coding_type: u8,
    pub picture_structure: u8,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
}

impl Default for PictureContext {
    fn default() -> Self {
        Self {
            picture_coding_type: 0,
            picture_structure: FRAME_PICTURE,
            top_field_first: false,
            repeat_first_field: false,
            progressive_frame: false,
        }
    }
}

impl PictureContext {
    pub fn from_header(header: &PictureHeader) -> Self {
        Self {
            picture_coding_type: header.picture_coding_type,
            ..Self::default()
        }
    }

    pub(crate) fn apply_coding_extension(&mut self, ext: &PictureCodingExtension) {
        self.picture_structure = ext.picture_structure;
        self.top_field_first = ext.top_field_first;
        self.repeat_first_field = ext.repeat_first_field;
        self.progressive_frame = ext.progressive_frame;
    }
}

#[derive(Debug, Clone)]
pub struct ParserState {
    pub fail_level: Level,
    pub sequence: Option<SequenceContext>,
    pub picture: Option<PictureContext>,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            fail_level: Level::Error,
            sequence: None,
            picture: None,
        }
    }
}

impl ParserState {
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }
}

#[cfg(test)]
use crate::process::extract::Extractor;
#[cfg(test)]
use crate::process::{EXAMPLE_DATA, EXAMPLE_UNITS};
#[cfg(test)]
use crate::utils::syntax_log::EntryKind;

#[cfg(test)]
fn parse_example(parser: &mut Parser) -> Result<Vec<ParsedUnit>> {
    let mut extractor = Extractor::default();
    extractor.push_bytes(EXAMPLE_DATA);
    extractor.finish();

    extractor
        .map(|unit| parser.parse(&unit?))
        .collect::<Result<Vec<_>>>()
}

#[test]
fn parse_example_stream() -> anyhow::Result<()> {
    let mut parser = Parser::default();
    let units = parse_example(&mut parser)?;
    assert_eq!(units.len(), EXAMPLE_UNITS);

    let names = units.iter().map(|u| u.syntax.name()).collect::<Vec<_>>();
    assert_eq!(
        names,
        [
            "sequence_header",
            "sequence_extension",
            "group_of_pictures_header",
            "picture_header",
            "picture_coding_extension",
            "slice",
            "sequence_end",
        ]
    );

    // every payload bit is attributed, alignment included
    for unit in &units {
        assert!(unit.log.is_contiguous(), "{} log has gaps", unit.syntax.name());
        let payload_bits = match unit.log.entries().last() {
            Some(last) => last.end(),
            None => 0,
        };
        assert_eq!(unit.log.attributed_bits(), payload_bits);
    }

    let gop = &units[2].log;
    let padding = gop.entries().last().unwrap();
    assert_eq!(padding.kind, EntryKind::Padding);
    assert_eq!((padding.bit_offset, padding.bit_len), (27, 5));

    let Syntax::Extension(Extension::PictureCoding(pce)) = &units[4].syntax else {
        panic!("unexpected syntax {:?}", units[4].syntax);
    };
    assert!(pce.is_progressive_frame());
    assert_eq!(units[4].offset, 38);

    // sequence end cleared the context
    assert!(parser.state().sequence.is_none());
    Ok(())
}

#[test]
fn context_flows_between_units() -> anyhow::Result<()> {
    let mut parser = Parser::default();
    let mut extractor = Extractor::default();
    extractor.push_bytes(EXAMPLE_DATA);

    // stop before the sequence end is released
    for unit in extractor {
        parser.parse(&unit?)?;
    }

    let sequence = parser.state().sequence.unwrap();
    assert!(sequence.mpeg2);
    assert!(!sequence.progressive_sequence);
    assert_eq!((sequence.horizontal_size, sequence.vertical_size), (720, 576));

    let picture = parser.state().picture.unwrap();
    assert_eq!(picture.picture_coding_type, 1);
    assert_eq!(picture.picture_structure, FRAME_PICTURE);
    assert!(picture.top_field_first && picture.progressive_frame);
    Ok(())
}

#[test]
fn trailing_data_is_attributed() -> anyhow::Result<()> {
    let mut parser = Parser::default();

    // GOP header with zero stuffing
    let parsed = parser.parse_payload(0xB8, &[0x00, 0x08, 0x00, 0x40, 0x00, 0x00])?;
    let last = parsed.log.entries().last().unwrap();
    assert_eq!(last.name, "zero_byte_stuffing");
    assert_eq!((last.bit_offset, last.bit_len), (32, 16));

    // GOP header followed by junk: logged, then fatal in strict mode
    let junk = [0x00, 0x08, 0x00, 0x40, 0xAB];
    let parsed = parser.parse_payload(0xB8, &junk)?;
    assert!(parsed.log.find("trailing_data").is_some());
    assert_eq!(parsed.log.attributed_bits(), 40);

    parser.set_fail_level(Level::Warn);
    let err = parser.parse_payload(0xB8, &junk).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyntaxError>(),
        Some(SyntaxError::TrailingData { bits: 8, .. })
    ));
    Ok(())
}

#[test]
fn truncated_unit_reports_offset() {
    let mut parser = Parser::default();
    let unit = Unit {
        start_code: 0xB5,
        offset: 0x40,
        data: vec![0x8F, 0xFF, 0xF7].into(),
    };

    let err = parser.parse(&unit).unwrap_err();
    assert!(err.to_string().contains("0x40"));
    assert!(err.downcast_ref::<crate::utils::errors::ReadError>().is_some());
}

#[test]
fn opaque_units() -> anyhow::Result<()> {
    let mut parser = Parser::default();

    let parsed = parser.parse_payload(0xE0, &[0x01, 0x02, 0x03])?;
    assert_eq!(
        parsed.syntax,
        Syntax::Opaque {
            start_code: 0xE0,
            payload_bits: 24,
        }
    );
    assert_eq!(parsed.kind(), StartCode::System(0xE0));
    assert!(parsed.fields().is_empty());
    Ok(())
}

#[test]
fn segments_parse_independently() -> anyhow::Result<()> {
    let mut whole = Parser::default();
    let expected = parse_example(&mut whole)?;

    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(|| parse_example(&mut Parser::default()));
        let b = scope.spawn(|| parse_example(&mut Parser::default()));
        (a.join(), b.join())
    });

    let a = a.map_err(|_| anyhow::anyhow!("worker panicked"))??;
    let b = b.map_err(|_| anyhow::anyhow!("worker panicked"))??;
    assert_eq!(a, expected);
    assert_eq!(b, expected);
    Ok(())
}

#[test]
fn failed_units_leave_context_untouched() -> anyhow::Result<()> {
    let mut parser = Parser::default();
    let mut extractor = Extractor::default();
    extractor.push_bytes(EXAMPLE_DATA);
    for unit in extractor {
        parser.parse(&unit?)?;
    }
    let before = parser.state().clone();
    assert_eq!(before.picture.map(|p| p.picture_coding_type), Some(1));

    // P picture header followed by junk, fatal in strict mode
    parser.set_fail_level(Level::Warn);
    let err = parser
        .parse_payload(0x00, &[0x00, 0x17, 0xFF, 0xFB, 0x80, 0xAB])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyntaxError>(),
        Some(SyntaxError::TrailingData { bits: 8, .. })
    ));
    assert_eq!(parser.state().picture, before.picture);
    assert_eq!(parser.state().sequence, before.sequence);

    // truncated sequence header leaves the context of a fresh parser
    assert!(parser.parse_payload(0xB3, &[0x2D, 0x02]).is_err());
    assert!(parser.state().sequence.is_none());
    assert!(parser.state().picture.is_none());
    Ok(())
}
