//! `slice()`, start codes `0x01..=0xAF`.
//!
//! Only the slice header is modelled. Macroblock data is logged as a single
//! opaque entry and only its length is kept; `write` emits zero bits in its
//! place.

use anyhow::Result;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::SyntaxStructure;
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};

/// Above this height the slice header carries three extra position bits.
pub const LARGE_PICTURE_HEIGHT: u32 = 2800;

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct Slice {
    pub slice_vertical_position_extension: Option<u8>,
    pub quantiser_scale_code: u8,
    pub intra_slice_flag: Option<bool>,
    pub intra_slice: Option<bool>,
    pub slice_picture_id_enable: Option<bool>,
    pub slice_picture_id: Option<u8>,
    pub extra_information_slice: Vec<u8>,
    pub slice_data_bits: u64,
}

impl Slice {
    /// Macroblock row of the first macroblock, from the slice start code value.
    pub fn macroblock_row(&self, start_code: u8) -> u32 {
        let extension = self.slice_vertical_position_extension.unwrap_or_default() as u32;
        ((extension << 7) + start_code as u32).saturating_sub(1)
    }
}

impl SyntaxStructure for Slice {
    const NAME: &'static str = "slice";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let sequence = state.sequence.unwrap_or_default();
        let mpeg2 = state.sequence.is_none_or(|s| s.mpeg2);

        let slice_vertical_position_extension = if sequence.vertical_size > LARGE_PICTURE_HEIGHT {
            Some(reader.read_bits("slice_vertical_position_extension", 3)?)
        } else {
            None
        };

        let quantiser_scale_code = reader.read_bits("quantiser_scale_code", 5)?;

        let mut slice = Self {
            slice_vertical_position_extension,
            quantiser_scale_code,
            intra_slice_flag: None,
            intra_slice: None,
            slice_picture_id_enable: None,
            slice_picture_id: None,
            extra_information_slice: Vec::new(),
            slice_data_bits: 0,
        };

        if mpeg2 && reader.available() > 0 && reader.peek_bits(1)? == 1 {
            slice.intra_slice_flag = Some(reader.read_flag("intra_slice_flag")?);
            slice.intra_slice = Some(reader.read_flag("intra_slice")?);
            slice.slice_picture_id_enable = Some(reader.read_flag("slice_picture_id_enable")?);
            slice.slice_picture_id = Some(reader.read_bits("slice_picture_id", 6)?);
        }

        // MPEG-2 only allows extra slice information after the intra flags.
        if !mpeg2 || slice.intra_slice_flag.is_some() {
            while reader.available() > 0 && reader.peek_bits(1)? == 1 {
                reader.read_flag("extra_bit_slice")?;
                let info = reader.read_bits(
                    &format!(
                        "extra_information_slice[{}]",
                        slice.extra_information_slice.len()
                    ),
                    8,
                )?;
                slice.extra_information_slice.push(info);
            }
        }
        reader.read_flag("extra_bit_slice")?;

        slice.slice_data_bits = reader.read_payload("slice_data")?;

        Ok(slice)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        if let Some(extension) = self.slice_vertical_position_extension {
            writer.put_bits(3, extension)?;
        }

        writer.put_bits(5, self.quantiser_scale_code)?;

        if let Some(intra_slice_flag) = self.intra_slice_flag {
            writer.put_flag(intra_slice_flag)?;
            writer.put_flag(self.intra_slice.unwrap_or_default())?;
            writer.put_flag(self.slice_picture_id_enable.unwrap_or_default())?;
            writer.put_bits(6, self.slice_picture_id.unwrap_or_default())?;
        }

        for info in &self.extra_information_slice {
            writer.put_flag(true)?;
            writer.put_bits(8, *info)?;
        }
        writer.put_flag(false)?;

        let mut remaining = self.slice_data_bits;
        while remaining > 0 {
            let chunk = remaining.min(32) as u32;
            writer.put_bits(chunk, 0u32)?;
            remaining -= chunk as u64;
        }

        Ok(())
    }
}

#[cfg(test)]
use crate::process::parse::SequenceContext;

#[test]
fn header_then_opaque_data() -> anyhow::Result<()> {
    let (slice, log) = crate::structs::parse_standalone::<Slice>(&[0x43, 0x5A, 0x80])?;

    assert_eq!(slice.quantiser_scale_code, 8);
    assert!(slice.intra_slice_flag.is_none());
    assert_eq!(slice.slice_data_bits, 18);
    assert_eq!(slice.macroblock_row(1), 0);

    let data = log.find("slice_data").unwrap();
    assert_eq!((data.bit_offset, data.bit_len), (6, 18));
    assert_eq!(log.attributed_bits(), 24);
    Ok(())
}

#[test]
fn intra_slice_and_large_picture() -> anyhow::Result<()> {
    let slice = Slice {
        slice_vertical_position_extension: Some(2),
        quantiser_scale_code: 31,
        intra_slice_flag: Some(true),
        intra_slice: Some(true),
        slice_picture_id_enable: Some(false),
        slice_picture_id: Some(0),
        extra_information_slice: vec![0x5A],
        slice_data_bits: 70,
    };

    let mut writer = SyntaxWriter::new();
    slice.write(&mut writer)?;
    let bits = writer.bit_len();
    let data = writer.finish()?;

    let mut state = ParserState::default();
    state.sequence = Some(SequenceContext {
        vertical_size: 4320,
        mpeg2: true,
        ..SequenceContext::default()
    });

    let mut reader = SyntaxReader::with_bit_len(&data, bits);
    let parsed = Slice::parse(&mut state, &mut reader)?;
    assert_eq!(parsed, slice);
    assert_eq!(parsed.macroblock_row(0x10), 2 * 128 + 15);
    assert!(reader.log().is_contiguous());
    Ok(())
}

#[test]
fn mpeg1_extra_slice_information() -> anyhow::Result<()> {
    // quantiser_scale 1, extra_bit_slice 1, 0xFF, extra_bit_slice 0
    let data = [0b0000_1111, 0b1111_1100];

    let mut state = ParserState::default();
    state.sequence = Some(SequenceContext::default());

    let mut reader = SyntaxReader::new(&data);
    let slice = Slice::parse(&mut state, &mut reader)?;
    assert_eq!(slice.extra_information_slice, [0xFF]);
    assert!(slice.intra_slice_flag.is_none());
    assert_eq!(slice.slice_data_bits, 1);
    Ok(())
}
