//! `picture_display_extension()`, extension id 7.
//!
//! The number of frame centre offsets is not coded; it follows from the
//! sequence and picture context.

use anyhow::Result;
use log::Level;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::picture_coding_extension::{BOTTOM_FIELD, TOP_FIELD};
use crate::structs::{SyntaxStructure, read_marker, report};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::SyntaxError;

/// Offsets in units of 1/16 sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FieldSet)]
pub struct FrameCentreOffset {
    pub frame_centre_horizontal_offset: i16,
    pub frame_centre_vertical_offset: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct PictureDisplayExtension {
    pub frame_centre_offsets: Vec<FrameCentreOffset>,
}

/// Number of frame centre offsets coded for the current picture.
pub fn number_of_frame_centre_offsets(state: &ParserState) -> usize {
    let progressive_sequence = state.sequence.is_some_and(|s| s.progressive_sequence);
    let picture = state.picture.unwrap_or_default();

    if progressive_sequence {
        match (picture.repeat_first_field, picture.top_field_first) {
            (true, true) => 3,
            (true, false) => 2,
            (false, _) => 1,
        }
    } else if matches!(picture.picture_structure, TOP_FIELD | BOTTOM_FIELD) {
        1
    } else if picture.repeat_first_field {
        3
    } else {
        2
    }
}

fn read_offset(state: &ParserState, reader: &mut SyntaxReader, name: &str) -> Result<i16> {
    let raw: u16 = reader.read_bits(name, 16)?;
    let offset = raw as i16;
    reader.annotate(format!("{} samples", offset as f32 / 16.0));
    read_marker(state, reader, PictureDisplayExtension::NAME)?;

    Ok(offset)
}

impl SyntaxStructure for PictureDisplayExtension {
    const NAME: &'static str = "picture_display_extension";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        if state.sequence.is_none() || state.picture.is_none() {
            report(
                state,
                Level::Debug,
                SyntaxError::MissingContext {
                    structure: Self::NAME,
                    needed: "picture_coding_extension",
                },
            )?;
        }

        let count = number_of_frame_centre_offsets(state);
        let mut frame_centre_offsets = Vec::with_capacity(count);

        for i in 0..count {
            let frame_centre_horizontal_offset =
                read_offset(state, reader, &format!("frame_centre_horizontal_offset[{i}]"))?;
            let frame_centre_vertical_offset =
                read_offset(state, reader, &format!("frame_centre_vertical_offset[{i}]"))?;

            frame_centre_offsets.push(FrameCentreOffset {
                frame_centre_horizontal_offset,
                frame_centre_vertical_offset,
            });
        }

        Ok(Self {
            frame_centre_offsets,
        })
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        for offset in &self.frame_centre_offsets {
            writer.put_bits(16, offset.frame_centre_horizontal_offset as u16)?;
            writer.put_flag(true)?;
            writer.put_bits(16, offset.frame_centre_vertical_offset as u16)?;
            writer.put_flag(true)?;
        }

        Ok(())
    }
}

#[cfg(test)]
use crate::process::parse::{PictureContext, SequenceContext};

#[test]
fn offset_count_follows_context() {
    let mut state = ParserState::default();
    assert_eq!(number_of_frame_centre_offsets(&state), 2);

    state.sequence = Some(SequenceContext {
        progressive_sequence: true,
        ..SequenceContext::default()
    });
    state.picture = Some(PictureContext {
        repeat_first_field: true,
        top_field_first: true,
        ..PictureContext::default()
    });
    assert_eq!(number_of_frame_centre_offsets(&state), 3);

    state.sequence = Some(SequenceContext::default());
    state.picture = Some(PictureContext {
        picture_structure: TOP_FIELD,
        ..PictureContext::default()
    });
    assert_eq!(number_of_frame_centre_offsets(&state), 1);
}

#[test]
fn signed_offsets_roundtrip() -> anyhow::Result<()> {
    let ext = PictureDisplayExtension {
        frame_centre_offsets: vec![
            FrameCentreOffset {
                frame_centre_horizontal_offset: -24,
                frame_centre_vertical_offset: 8,
            },
            FrameCentreOffset {
                frame_centre_horizontal_offset: i16::MIN,
                frame_centre_vertical_offset: i16::MAX,
            },
        ],
    };

    let (parsed, bits) = crate::structs::roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 2 * 34);

    let names = parsed.fields().into_iter().map(|(n, _)| n).collect::<Vec<_>>();
    assert_eq!(
        names[0],
        "frame_centre_offsets[0].frame_centre_horizontal_offset"
    );
    Ok(())
}
