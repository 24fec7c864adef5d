//! `user_data()`, start code `0xB2`.
//!
//! The payload is kept as raw bytes. Two registered formats are parsed in
//! nested readers: ATSC A/53 closed captions (`GA94`, type 3) and the
//! active format description (`DTG1`).

use anyhow::Result;
use log::trace;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::SyntaxStructure;
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::syntax_log::Meanings;

/// `GA94`
pub const ATSC_IDENTIFIER: u32 = 0x4741_3934;
/// `DTG1`
pub const AFD_IDENTIFIER: u32 = 0x4454_4731;

pub const CC_DATA_TYPE_CODE: u8 = 0x03;

pub const USER_DATA_IDENTIFIER: &Meanings = &[
    (ATSC_IDENTIFIER as u64, "ATSC A/53 (GA94)"),
    (AFD_IDENTIFIER as u64, "active format description (DTG1)"),
];

pub const USER_DATA_TYPE_CODE: &Meanings = &[(0x03, "cc_data"), (0x06, "bar_data")];

pub const CC_TYPE: &Meanings = &[
    (0, "NTSC line 21 field 1"),
    (1, "NTSC line 21 field 2"),
    (2, "DTVCC packet data"),
    (3, "DTVCC packet start"),
];

pub const ACTIVE_FORMAT: &Meanings = &[
    (2, "box 16:9 (top)"),
    (3, "box 14:9 (top)"),
    (4, "box > 16:9 (centre)"),
    (8, "as the coded frame"),
    (9, "4:3 (centre)"),
    (10, "16:9 (centre)"),
    (11, "14:9 (centre)"),
    (13, "4:3 (with shoot and protect 14:9 centre)"),
    (14, "16:9 (with shoot and protect 14:9 centre)"),
    (15, "16:9 (with shoot and protect 4:3 centre)"),
];

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct CaptionConstruct {
    pub cc_valid: bool,
    pub cc_type: u8,
    pub cc_data_1: u8,
    pub cc_data_2: u8,
}

/// ATSC A/53 `cc_data()`.
#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct CaptionData {
    pub process_em_data_flag: bool,
    pub process_cc_data_flag: bool,
    pub additional_data_flag: bool,
    pub cc_count: u8,
    pub em_data: u8,
    pub constructs: Vec<CaptionConstruct>,
}

impl CaptionData {
    fn parse(reader: &mut SyntaxReader) -> Result<Self> {
        let process_em_data_flag = reader.read_flag("process_em_data_flag")?;
        let process_cc_data_flag = reader.read_flag("process_cc_data_flag")?;
        let additional_data_flag = reader.read_flag("additional_data_flag")?;
        let cc_count: u8 = reader.read_bits("cc_count", 5)?;
        let em_data = reader.read_bits("em_data", 8)?;

        let mut constructs = Vec::with_capacity(cc_count as usize);
        for i in 0..cc_count {
            reader.read_bits::<u8>(&format!("marker_bits[{i}]"), 5)?;
            reader.annotate("marker");
            let cc_valid = reader.read_flag(&format!("cc_valid[{i}]"))?;
            let cc_type = reader.read_bits_with_meaning(&format!("cc_type[{i}]"), 2, CC_TYPE)?;
            let cc_data_1 = reader.read_bits(&format!("cc_data_1[{i}]"), 8)?;
            let cc_data_2 = reader.read_bits(&format!("cc_data_2[{i}]"), 8)?;

            constructs.push(CaptionConstruct {
                cc_valid,
                cc_type,
                cc_data_1,
                cc_data_2,
            });
        }

        reader.read_bits::<u8>("marker_bits", 8)?;
        reader.annotate("marker");

        Ok(Self {
            process_em_data_flag,
            process_cc_data_flag,
            additional_data_flag,
            cc_count,
            em_data,
            constructs,
        })
    }

    /// Valid line 21 byte pairs for the given field (0 or 1).
    pub fn line21_pairs(&self, field: u8) -> impl Iterator<Item = [u8; 2]> + '_ {
        self.constructs
            .iter()
            .filter(move |c| c.cc_valid && c.cc_type == field)
            .map(|c| [c.cc_data_1 & 0x7F, c.cc_data_2 & 0x7F])
    }
}

/// Active format description, `afd_data()`.
#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct ActiveFormatDescription {
    pub active_format_flag: bool,
    pub active_format: Option<u8>,
}

impl ActiveFormatDescription {
    fn parse(reader: &mut SyntaxReader) -> Result<Self> {
        reader.read_flag("zero")?;
        let active_format_flag = reader.read_flag("active_format_flag")?;
        reader.read_bits::<u8>("reserved", 6)?;

        let active_format = if active_format_flag {
            reader.read_bits::<u8>("reserved", 4)?;
            Some(reader.read_bits_with_meaning("active_format", 4, ACTIVE_FORMAT)?)
        } else {
            None
        };

        Ok(Self {
            active_format_flag,
            active_format,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct UserData {
    pub user_data_identifier: Option<u32>,
    pub user_data_type_code: Option<u8>,
    pub cc_data: Option<CaptionData>,
    pub afd_data: Option<ActiveFormatDescription>,
    pub user_data: Box<[u8]>,
}

/// Parses the rest of `reader` with `parse` in a nested reader, attributing
/// anything left over to `additional_data`.
fn parse_nested<T>(
    reader: &mut SyntaxReader,
    name: &str,
    parse: impl FnOnce(&mut SyntaxReader) -> Result<T>,
) -> Result<T> {
    let len = (reader.available() >> 3) as usize;
    let mut child = reader.sub_reader(name, len)?;

    let parsed = parse(&mut child)?;
    child.byte_align()?;
    if child.available() > 0 {
        let rest = (child.available() >> 3) as usize;
        child.read_bytes("additional_data", rest)?;
    }

    reader.merge(child);
    Ok(parsed)
}

impl SyntaxStructure for UserData {
    const NAME: &'static str = "user_data";

    fn parse(_state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let start = (reader.position() >> 3) as usize;
        let len = (reader.available() >> 3) as usize;

        let mut user_data = Self {
            user_data_identifier: None,
            user_data_type_code: None,
            cc_data: None,
            afd_data: None,
            user_data: Box::default(),
        };

        if len >= 4 {
            let identifier =
                reader.read_bits_with_meaning("user_data_identifier", 32, USER_DATA_IDENTIFIER)?;
            user_data.user_data_identifier = Some(identifier);

            match identifier {
                ATSC_IDENTIFIER if len >= 5 => {
                    let type_code = reader.read_bits_with_meaning(
                        "user_data_type_code",
                        8,
                        USER_DATA_TYPE_CODE,
                    )?;
                    user_data.user_data_type_code = Some(type_code);

                    if type_code == CC_DATA_TYPE_CODE {
                        user_data.cc_data =
                            Some(parse_nested(reader, "cc_data", CaptionData::parse)?);
                    }
                }
                AFD_IDENTIFIER => {
                    user_data.afd_data = Some(parse_nested(
                        reader,
                        "afd_data",
                        ActiveFormatDescription::parse,
                    )?);
                }
                _ => {}
            }
        }

        let rest = (reader.available() >> 3) as usize;
        if rest > 0 {
            reader.read_bytes("user_data", rest)?;
        }

        user_data.user_data = reader.data()[start..start + len].into();

        if let Some(cc) = &user_data.cc_data {
            trace!("Closed captions: {} constructs", cc.constructs.len());
        }

        Ok(user_data)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_bytes(&self.user_data)?;
        Ok(())
    }
}

#[cfg(test)]
use crate::structs::parse_standalone;
#[cfg(test)]
use crate::utils::syntax_log::EntryKind;

#[cfg(test)]
const CAPTIONS: [u8; 14] = [
    0x47, 0x41, 0x39, 0x34, 0x03, 0x42, 0xFF, 0xFC, 0x94, 0x2C, 0xFD, 0x80, 0x80, 0xFF,
];

#[test]
fn atsc_closed_captions() -> anyhow::Result<()> {
    let (user_data, log) = parse_standalone::<UserData>(&CAPTIONS)?;

    assert_eq!(user_data.user_data_identifier, Some(ATSC_IDENTIFIER));
    assert_eq!(user_data.user_data_type_code, Some(CC_DATA_TYPE_CODE));
    assert_eq!(&*user_data.user_data, &CAPTIONS);

    let cc = user_data.cc_data.as_ref().unwrap();
    assert!(cc.process_cc_data_flag);
    assert_eq!(cc.cc_count, 2);
    assert_eq!(cc.constructs[1].cc_type, 1);
    assert_eq!(cc.line21_pairs(0).collect::<Vec<_>>(), [[0x14, 0x2C]]);

    // nested entries keep absolute offsets one level down
    let nested = log.find("cc_count").unwrap();
    assert_eq!((nested.bit_offset, nested.depth), (43, 1));
    assert!(log.entries().iter().any(|e| e.kind == EntryKind::Nested));
    assert!(log.is_contiguous());
    assert_eq!(log.attributed_bits(), 14 * 8);

    assert_eq!(
        user_data.field("cc_data.constructs[1].cc_data_1"),
        Some(crate::utils::syntax_log::FieldValue::Unsigned(0x80))
    );
    Ok(())
}

#[test]
fn active_format_description() -> anyhow::Result<()> {
    let (user_data, log) =
        parse_standalone::<UserData>(&[0x44, 0x54, 0x47, 0x31, 0x41, 0xFA])?;

    let afd = user_data.afd_data.unwrap();
    assert!(afd.active_format_flag);
    assert_eq!(afd.active_format, Some(10));
    assert_eq!(
        log.find("active_format").and_then(|e| e.meaning.as_deref()),
        Some("16:9 (centre)")
    );
    assert!(log.is_contiguous());
    Ok(())
}

#[test]
fn unregistered_user_data_is_opaque() -> anyhow::Result<()> {
    let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
    let (user_data, log) = parse_standalone::<UserData>(&data)?;

    assert_eq!(user_data.user_data_identifier, Some(0x1234_5678));
    assert!(user_data.cc_data.is_none() && user_data.afd_data.is_none());
    assert_eq!(
        log.find("user_data_identifier").and_then(|e| e.meaning.as_deref()),
        Some("reserved")
    );
    assert_eq!(log.find("user_data").map(|e| e.bit_len), Some(16));

    let (short, log) = parse_standalone::<UserData>(&[0xAA, 0xBB])?;
    assert!(short.user_data_identifier.is_none());
    assert_eq!(log.len(), 1);

    let (parsed, bits) = crate::structs::roundtrip(&user_data)?;
    assert_eq!(parsed, user_data);
    assert_eq!(bits, 48);
    Ok(())
}
