//! `group_of_pictures_header()`, start code `0xB8`.

use std::fmt::{Display, Formatter};

use anyhow::Result;
use log::trace;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::{SyntaxStructure, read_marker};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct GroupOfPicturesHeader {
    pub drop_frame_flag: bool,
    pub time_code_hours: u8,
    pub time_code_minutes: u8,
    pub time_code_seconds: u8,
    pub time_code_pictures: u8,
    pub closed_gop: bool,
    pub broken_link: bool,
}

/// SMPTE style time code; `;` separates the picture count in drop-frame mode.
impl Display for GroupOfPicturesHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.time_code_hours,
            self.time_code_minutes,
            self.time_code_seconds,
            if self.drop_frame_flag { ';' } else { ':' },
            self.time_code_pictures
        )
    }
}

impl SyntaxStructure for GroupOfPicturesHeader {
    const NAME: &'static str = "group_of_pictures_header";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let drop_frame_flag = reader.read_flag("drop_frame_flag")?;
        let time_code_hours = reader.read_bits("time_code_hours", 5)?;
        let time_code_minutes = reader.read_bits("time_code_minutes", 6)?;
        read_marker(state, reader, Self::NAME)?;
        let time_code_seconds = reader.read_bits("time_code_seconds", 6)?;
        let time_code_pictures = reader.read_bits("time_code_pictures", 6)?;
        let closed_gop = reader.read_flag("closed_gop")?;
        let broken_link = reader.read_flag("broken_link")?;

        let gop = Self {
            drop_frame_flag,
            time_code_hours,
            time_code_minutes,
            time_code_seconds,
            time_code_pictures,
            closed_gop,
            broken_link,
        };

        trace!("GOP {gop}, closed {closed_gop}, broken link {broken_link}");

        Ok(gop)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_flag(self.drop_frame_flag)?;
        writer.put_bits(5, self.time_code_hours)?;
        writer.put_bits(6, self.time_code_minutes)?;
        writer.put_flag(true)?;
        writer.put_bits(6, self.time_code_seconds)?;
        writer.put_bits(6, self.time_code_pictures)?;
        writer.put_flag(self.closed_gop)?;
        writer.put_flag(self.broken_link)?;

        Ok(())
    }
}

#[test]
fn time_code() -> anyhow::Result<()> {
    let data = [0x00, 0x08, 0x00, 0x40];
    let (gop, log) = crate::structs::parse_standalone::<GroupOfPicturesHeader>(&data)?;
    assert_eq!(gop.to_string(), "00:00:00:00");
    assert!(gop.closed_gop);
    assert!(!gop.broken_link);
    assert_eq!(log.attributed_bits(), 27);

    let gop = GroupOfPicturesHeader {
        drop_frame_flag: true,
        time_code_hours: 23,
        time_code_minutes: 59,
        time_code_seconds: 58,
        time_code_pictures: 29,
        closed_gop: false,
        broken_link: true,
    };
    let (parsed, bits) = crate::structs::roundtrip(&gop)?;
    assert_eq!(parsed, gop);
    assert_eq!(bits, 27);
    assert_eq!(parsed.to_string(), "23:59:58;29");
    Ok(())
}
