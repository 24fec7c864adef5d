//! `sequence_display_extension()`, extension id 2.

use anyhow::Result;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::{SyntaxStructure, read_marker};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::syntax_log::{FORBIDDEN, Meanings};

pub const VIDEO_FORMAT: &Meanings = &[
    (0, "component"),
    (1, "PAL"),
    (2, "NTSC"),
    (3, "SECAM"),
    (4, "MAC"),
    (5, "unspecified"),
];

pub const COLOUR_PRIMARIES: &Meanings = &[
    (0, FORBIDDEN),
    (1, "BT.709"),
    (2, "unspecified"),
    (4, "BT.470-2 System M"),
    (5, "BT.470-2 System B, G"),
    (6, "SMPTE 170M"),
    (7, "SMPTE 240M"),
];

pub const TRANSFER_CHARACTERISTICS: &Meanings = &[
    (0, FORBIDDEN),
    (1, "BT.709"),
    (2, "unspecified"),
    (4, "BT.470-2 System M"),
    (5, "BT.470-2 System B, G"),
    (6, "SMPTE 170M"),
    (7, "SMPTE 240M"),
    (8, "linear"),
];

pub const MATRIX_COEFFICIENTS: &Meanings = &[
    (0, FORBIDDEN),
    (1, "BT.709"),
    (2, "unspecified"),
    (4, "FCC"),
    (5, "BT.470-2 System B, G"),
    (6, "SMPTE 170M"),
    (7, "SMPTE 240M"),
];

/// The colour fields are present only when `colour_description` is set.
#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct SequenceDisplayExtension {
    pub video_format: u8,
    pub colour_description: bool,
    pub colour_primaries: Option<u8>,
    pub transfer_characteristics: Option<u8>,
    pub matrix_coefficients: Option<u8>,
    pub display_horizontal_size: u16,
    pub display_vertical_size: u16,
}

impl SyntaxStructure for SequenceDisplayExtension {
    const NAME: &'static str = "sequence_display_extension";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let video_format = reader.read_bits_with_meaning("video_format", 3, VIDEO_FORMAT)?;
        let colour_description = reader.read_flag("colour_description")?;

        let (colour_primaries, transfer_characteristics, matrix_coefficients) =
            if colour_description {
                (
                    Some(reader.read_bits_with_meaning("colour_primaries", 8, COLOUR_PRIMARIES)?),
                    Some(reader.read_bits_with_meaning(
                        "transfer_characteristics",
                        8,
                        TRANSFER_CHARACTERISTICS,
                    )?),
                    Some(reader.read_bits_with_meaning(
                        "matrix_coefficients",
                        8,
                        MATRIX_COEFFICIENTS,
                    )?),
                )
            } else {
                (None, None, None)
            };

        let display_horizontal_size = reader.read_bits("display_horizontal_size", 14)?;
        read_marker(state, reader, Self::NAME)?;
        let display_vertical_size = reader.read_bits("display_vertical_size", 14)?;

        Ok(Self {
            video_format,
            colour_description,
            colour_primaries,
            transfer_characteristics,
            matrix_coefficients,
            display_horizontal_size,
            display_vertical_size,
        })
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_bits(3, self.video_format)?;
        writer.put_flag(self.colour_description)?;

        if self.colour_description {
            writer.put_bits(8, self.colour_primaries.unwrap_or(2))?;
            writer.put_bits(8, self.transfer_characteristics.unwrap_or(2))?;
            writer.put_bits(8, self.matrix_coefficients.unwrap_or(2))?;
        }

        writer.put_bits(14, self.display_horizontal_size)?;
        writer.put_flag(true)?;
        writer.put_bits(14, self.display_vertical_size)?;

        Ok(())
    }
}

#[cfg(test)]
use crate::structs::roundtrip;

#[test]
fn colour_description_is_optional() -> anyhow::Result<()> {
    let mut ext = SequenceDisplayExtension {
        video_format: 1,
        colour_description: true,
        colour_primaries: Some(5),
        transfer_characteristics: Some(5),
        matrix_coefficients: Some(5),
        display_horizontal_size: 720,
        display_vertical_size: 576,
    };

    let (parsed, bits) = roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 3 + 1 + 24 + 29);

    ext.colour_description = false;
    ext.colour_primaries = None;
    ext.transfer_characteristics = None;
    ext.matrix_coefficients = None;

    let (parsed, bits) = roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 3 + 1 + 29);
    assert!(parsed.field("colour_primaries").is_none());
    Ok(())
}
