//! `copyright_extension()`, extension id 4.

use anyhow::Result;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::{SyntaxStructure, read_marker};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct CopyrightExtension {
    pub copyright_flag: bool,
    pub copyright_identifier: u8,
    pub original_or_copy: bool,
    pub reserved: u8,
    pub copyright_number_1: u32,
    pub copyright_number_2: u32,
    pub copyright_number_3: u32,
}

impl CopyrightExtension {
    /// The 64-bit copyright number assembled from its three parts.
    pub fn copyright_number(&self) -> u64 {
        (self.copyright_number_1 as u64) << 44
            | (self.copyright_number_2 as u64) << 22
            | self.copyright_number_3 as u64
    }
}

impl SyntaxStructure for CopyrightExtension {
    const NAME: &'static str = "copyright_extension";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let copyright_flag = reader.read_flag("copyright_flag")?;
        let copyright_identifier = reader.read_bits("copyright_identifier", 8)?;
        let original_or_copy = reader.read_flag("original_or_copy")?;
        reader.annotate(if original_or_copy { "original" } else { "copy" });
        let reserved = reader.read_bits("reserved", 7)?;
        read_marker(state, reader, Self::NAME)?;
        let copyright_number_1 = reader.read_bits("copyright_number_1", 20)?;
        read_marker(state, reader, Self::NAME)?;
        let copyright_number_2 = reader.read_bits("copyright_number_2", 22)?;
        read_marker(state, reader, Self::NAME)?;
        let copyright_number_3 = reader.read_bits("copyright_number_3", 22)?;

        Ok(Self {
            copyright_flag,
            copyright_identifier,
            original_or_copy,
            reserved,
            copyright_number_1,
            copyright_number_2,
            copyright_number_3,
        })
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_flag(self.copyright_flag)?;
        writer.put_bits(8, self.copyright_identifier)?;
        writer.put_flag(self.original_or_copy)?;
        writer.put_bits(7, self.reserved)?;
        writer.put_flag(true)?;
        writer.put_bits(20, self.copyright_number_1)?;
        writer.put_flag(true)?;
        writer.put_bits(22, self.copyright_number_2)?;
        writer.put_flag(true)?;
        writer.put_bits(22, self.copyright_number_3)?;

        Ok(())
    }
}

#[test]
fn copyright_number_spans_three_fields() -> anyhow::Result<()> {
    let ext = CopyrightExtension {
        copyright_flag: true,
        copyright_identifier: 0x2A,
        original_or_copy: true,
        reserved: 0,
        copyright_number_1: 0xABCDE,
        copyright_number_2: 0x3FFFFF,
        copyright_number_3: 1,
    };

    let (parsed, bits) = crate::structs::roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 1 + 8 + 1 + 7 + 1 + 20 + 1 + 22 + 1 + 22);
    assert_eq!(parsed.copyright_number(), 0xABCDE << 44 | 0x3FFFFF << 22 | 1);
    Ok(())
}
