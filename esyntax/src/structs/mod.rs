//! Data structures representing video elementary stream syntax.
//!
//! One type per syntax structure, each implementing [`SyntaxStructure`]:
//! fields are pulled from a [`SyntaxReader`] in the order of the syntax
//! diagram and every read is logged under its syntax-diagram name.
//!
//! - **Sequence layer** ([`sequence_header`], [`sequence_extension`],
//!   [`sequence_display_extension`], [`quant_matrix_extension`],
//!   [`copyright_extension`])
//! - **Group of pictures** ([`group_of_pictures`])
//! - **Picture layer** ([`picture_header`], [`picture_coding_extension`],
//!   [`picture_display_extension`])
//! - **Slices** ([`slice`]) and **user data** ([`user_data`])
//!
//! [`Syntax`] is the closed set of structures, selected by start code.

use anyhow::{Result, anyhow};
use log::Level;

use crate::log_or_err;
use crate::process::parse::ParserState;
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::{ReadError, SyntaxError};

pub mod copyright_extension;
pub mod extension;
pub mod fields;
pub mod group_of_pictures;
pub mod picture_coding_extension;
pub mod picture_display_extension;
pub mod picture_header;
pub mod quant_matrix_extension;
pub mod sequence_display_extension;
pub mod sequence_extension;
pub mod sequence_header;
pub mod slice;
pub mod start_code;
pub mod user_data;

use extension::Extension;
use fields::{FieldList, FieldSet};
use group_of_pictures::GroupOfPicturesHeader;
use picture_header::PictureHeader;
use sequence_header::SequenceHeader;
use slice::Slice;
use user_data::UserData;

/// A syntax structure that can be parsed from, and written to, a bitstream.
///
/// `parse` starts at the first bit of the structure and either reads every
/// field in order or fails; a partially read structure is never returned.
pub trait SyntaxStructure: FieldSet + Sized {
    /// Syntax-diagram name of the structure.
    const NAME: &'static str;

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self>;

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()>;
}

/// Parsed content of one start-code delimited unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syntax {
    SequenceHeader(SequenceHeader),
    Extension(Extension),
    GroupOfPictures(GroupOfPicturesHeader),
    Picture(PictureHeader),
    UserData(UserData),
    Slice(Slice),
    SequenceEnd,
    SequenceError,
    /// Reserved or system start code; the payload is not interpreted.
    Opaque { start_code: u8, payload_bits: u64 },
}

impl Syntax {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SequenceHeader(_) => SequenceHeader::NAME,
            Self::Extension(ext) => ext.name(),
            Self::GroupOfPictures(_) => GroupOfPicturesHeader::NAME,
            Self::Picture(_) => PictureHeader::NAME,
            Self::UserData(_) => UserData::NAME,
            Self::Slice(_) => Slice::NAME,
            Self::SequenceEnd => "sequence_end",
            Self::SequenceError => "sequence_error",
            Self::Opaque { .. } => "opaque",
        }
    }

    /// Serializes the unit payload (everything after the start code).
    pub fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        match self {
            Self::SequenceHeader(s) => s.write(writer),
            Self::Extension(s) => s.write(writer),
            Self::GroupOfPictures(s) => s.write(writer),
            Self::Picture(s) => s.write(writer),
            Self::UserData(s) => s.write(writer),
            Self::Slice(s) => s.write(writer),
            Self::SequenceEnd | Self::SequenceError => Ok(()),
            Self::Opaque { .. } => Err(anyhow!("opaque units carry no structure to serialize")),
        }
    }
}

impl FieldSet for Syntax {
    fn collect_fields(&self, prefix: &str, out: &mut FieldList) {
        match self {
            Self::SequenceHeader(s) => s.collect_fields(prefix, out),
            Self::Extension(s) => s.collect_fields(prefix, out),
            Self::GroupOfPictures(s) => s.collect_fields(prefix, out),
            Self::Picture(s) => s.collect_fields(prefix, out),
            Self::UserData(s) => s.collect_fields(prefix, out),
            Self::Slice(s) => s.collect_fields(prefix, out),
            Self::SequenceEnd | Self::SequenceError | Self::Opaque { .. } => {}
        }
    }
}

/// Reports a validation finding at `level`, failing when the parser's fail
/// level makes it fatal.
pub(crate) fn report(state: &ParserState, level: Level, err: SyntaxError) -> Result<()> {
    log_or_err!(state, level, anyhow!(err));
    Ok(())
}

/// Reads a marker bit and reports it when it is not set.
pub(crate) fn read_marker(
    state: &ParserState,
    reader: &mut SyntaxReader,
    structure: &'static str,
) -> Result<()> {
    let bit_offset = reader.position();

    if !reader.read_marker_bit("marker_bit")? {
        report(
            state,
            Level::Warn,
            SyntaxError::MarkerBitNotSet {
                structure,
                field: "marker_bit",
                bit_offset,
            },
        )?;
    }

    Ok(())
}

/// Reports a value of zero for fields where zero is forbidden.
pub(crate) fn check_not_forbidden(
    state: &ParserState,
    structure: &'static str,
    field: &'static str,
    value: u32,
) -> Result<()> {
    if value == 0 {
        report(
            state,
            Level::Warn,
            SyntaxError::ForbiddenValue {
                structure,
                field,
                value,
            },
        )?;
    }

    Ok(())
}

/// Reads the 64 entries of a quantiser matrix, in bitstream (zigzag) order.
pub(crate) fn read_matrix(reader: &mut SyntaxReader, name: &str) -> Result<[u8; 64], ReadError> {
    let mut matrix = [0u8; 64];

    for (i, value) in matrix.iter_mut().enumerate() {
        *value = reader.read_bits(&format!("{name}[{i}]"), 8)?;
    }

    Ok(matrix)
}

pub(crate) fn write_matrix(writer: &mut SyntaxWriter, matrix: &[u8; 64]) -> Result<()> {
    for value in matrix {
        writer.put_bits(8, *value)?;
    }

    Ok(())
}

/// Meaning of an MPEG-2 `f_code` value.
pub(crate) fn f_code_meaning(value: u8) -> &'static str {
    match value {
        0 => crate::utils::syntax_log::FORBIDDEN,
        1..=9 => "motion vector range code",
        15 => "not used",
        _ => crate::utils::syntax_log::RESERVED,
    }
}

/// Parses a structure from the whole of `data` with a fresh parser state.
#[cfg(test)]
pub(crate) fn parse_standalone<T: SyntaxStructure>(
    data: &[u8],
) -> Result<(T, crate::utils::syntax_log::SyntaxLog)> {
    let mut state = ParserState::default();
    let mut reader = SyntaxReader::new(data);
    let parsed = T::parse(&mut state, &mut reader)?;

    Ok((parsed, reader.into_log()))
}

/// Writes then re-parses a structure, returning the re-parsed value and the
/// number of bits written.
#[cfg(test)]
pub(crate) fn roundtrip<T: SyntaxStructure>(value: &T) -> Result<(T, u64)> {
    let mut writer = SyntaxWriter::new();
    value.write(&mut writer)?;
    let bits = writer.bit_len();
    let data = writer.finish()?;

    let mut state = ParserState::default();
    let mut reader = SyntaxReader::with_bit_len(&data, bits);
    let parsed = T::parse(&mut state, &mut reader)?;

    anyhow::ensure!(reader.available() == 0, "{} left unread", reader.available());
    Ok((parsed, bits))
}

#[test]
fn meaning_maps_label_every_value() {
    use crate::utils::syntax_log::{Meanings, describe};

    let maps: &[(&str, &Meanings)] = &[
        ("aspect_ratio_information", sequence_header::ASPECT_RATIO_INFORMATION),
        ("frame_rate_code", sequence_header::FRAME_RATE_CODE),
        ("chroma_format", sequence_extension::CHROMA_FORMAT),
        ("profile", sequence_extension::PROFILES),
        ("level", sequence_extension::LEVELS),
        ("escaped profile_and_level", sequence_extension::ESCAPED_PROFILE_LEVELS),
        ("video_format", sequence_display_extension::VIDEO_FORMAT),
        ("colour_primaries", sequence_display_extension::COLOUR_PRIMARIES),
        (
            "transfer_characteristics",
            sequence_display_extension::TRANSFER_CHARACTERISTICS,
        ),
        ("matrix_coefficients", sequence_display_extension::MATRIX_COEFFICIENTS),
        ("intra_dc_precision", picture_coding_extension::INTRA_DC_PRECISION),
        ("picture_structure", picture_coding_extension::PICTURE_STRUCTURE),
        ("field_sequence", picture_coding_extension::FIELD_SEQUENCE),
        (
            "extension_start_code_identifier",
            extension::EXTENSION_START_CODE_IDENTIFIER,
        ),
        ("picture_coding_type", picture_header::PICTURE_CODING_TYPE),
        ("user_data_identifier", user_data::USER_DATA_IDENTIFIER),
        ("user_data_type_code", user_data::USER_DATA_TYPE_CODE),
        ("cc_type", user_data::CC_TYPE),
        ("active_format", user_data::ACTIVE_FORMAT),
    ];

    for (name, map) in maps {
        assert!(!map.is_empty(), "{name} has no entries");
        for (value, label) in map.iter() {
            assert!(!label.trim().is_empty(), "{name} value {value} has an empty label");
            // a duplicated value would shadow the later label
            assert_eq!(describe(map, *value), *label, "{name} value {value}");
        }
    }

    assert_eq!(f_code_meaning(0), crate::utils::syntax_log::FORBIDDEN);
    assert!((1..=15).all(|code| !f_code_meaning(code).is_empty()));
}
