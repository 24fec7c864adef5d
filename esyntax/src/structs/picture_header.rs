//! `picture_header()`, start code `0x00`.

use std::fmt::{Display, Formatter};

use anyhow::Result;
use log::{Level, trace};

use crate::process::parse::{ParserState, PictureContext};
use crate::structs::fields::FieldSet;
use crate::structs::{SyntaxStructure, check_not_forbidden, report};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::SyntaxError;
use crate::utils::syntax_log::{FORBIDDEN, Meanings};

pub const PICTURE_CODING_TYPE: &Meanings = &[
    (0, FORBIDDEN),
    (1, "intra-coded (I)"),
    (2, "predictive-coded (P)"),
    (3, "bidirectionally-predictive-coded (B)"),
    (4, "dc intra-coded (D)"),
];

/// `vbv_delay` value signalling variable bit rate.
pub const VBV_DELAY_VARIABLE: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodingType {
    Intra,
    Predictive,
    Bidirectional,
    DcIntra,
    Invalid(u8),
}

impl From<u8> for CodingType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Intra,
            2 => Self::Predictive,
            3 => Self::Bidirectional,
            4 => Self::DcIntra,
            other => Self::Invalid(other),
        }
    }
}

impl Display for CodingType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intra => write!(f, "I"),
            Self::Predictive => write!(f, "P"),
            Self::Bidirectional => write!(f, "B"),
            Self::DcIntra => write!(f, "D"),
            Self::Invalid(v) => write!(f, "invalid ({v})"),
        }
    }
}

/// Motion vector fields are present for P and B pictures only, the backward
/// pair for B pictures only.
#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    pub picture_coding_type: u8,
    pub vbv_delay: u16,
    pub full_pel_forward_vector: Option<bool>,
    pub forward_f_code: Option<u8>,
    pub full_pel_backward_vector: Option<bool>,
    pub backward_f_code: Option<u8>,
    pub extra_information_picture: Vec<u8>,
}

impl PictureHeader {
    pub fn coding_type(&self) -> CodingType {
        CodingType::from(self.picture_coding_type)
    }

    pub fn has_forward_vectors(&self) -> bool {
        matches!(self.coding_type(), CodingType::Predictive | CodingType::Bidirectional)
    }

    pub fn has_backward_vectors(&self) -> bool {
        self.coding_type() == CodingType::Bidirectional
    }
}

fn annotate_f_code(reader: &mut SyntaxReader, value: u8) {
    reader.annotate(match value {
        0 => FORBIDDEN,
        7 => "range code 7 (required in MPEG-2)",
        _ => "motion vector range code",
    });
}

impl SyntaxStructure for PictureHeader {
    const NAME: &'static str = "picture_header";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let temporal_reference = reader.read_bits("temporal_reference", 10)?;
        let picture_coding_type =
            reader.read_bits_with_meaning("picture_coding_type", 3, PICTURE_CODING_TYPE)?;
        let vbv_delay = reader.read_bits("vbv_delay", 16)?;
        if vbv_delay == VBV_DELAY_VARIABLE {
            reader.annotate("variable bit rate");
        }

        let coding_type = CodingType::from(picture_coding_type);
        let mut header = Self {
            temporal_reference,
            picture_coding_type,
            vbv_delay,
            full_pel_forward_vector: None,
            forward_f_code: None,
            full_pel_backward_vector: None,
            backward_f_code: None,
            extra_information_picture: Vec::new(),
        };

        if header.has_forward_vectors() {
            header.full_pel_forward_vector = Some(reader.read_flag("full_pel_forward_vector")?);
            let code = reader.read_bits("forward_f_code", 3)?;
            annotate_f_code(reader, code);
            header.forward_f_code = Some(code);
        }

        if header.has_backward_vectors() {
            header.full_pel_backward_vector = Some(reader.read_flag("full_pel_backward_vector")?);
            let code = reader.read_bits("backward_f_code", 3)?;
            annotate_f_code(reader, code);
            header.backward_f_code = Some(code);
        }

        while reader.available() > 0 && reader.peek_bits(1)? == 1 {
            reader.read_flag("extra_bit_picture")?;
            let info = reader.read_bits(
                &format!(
                    "extra_information_picture[{}]",
                    header.extra_information_picture.len()
                ),
                8,
            )?;
            header.extra_information_picture.push(info);
        }
        reader.read_flag("extra_bit_picture")?;

        check_not_forbidden(state, Self::NAME, "picture_coding_type", picture_coding_type as u32)?;
        if picture_coding_type > 4 {
            report(
                state,
                Level::Info,
                SyntaxError::UnsupportedFieldValue {
                    structure: Self::NAME,
                    field: "picture_coding_type",
                    value: picture_coding_type as u32,
                },
            )?;
        }

        if let Some(code) = header.forward_f_code {
            check_not_forbidden(state, Self::NAME, "forward_f_code", code as u32)?;
        }
        if let Some(code) = header.backward_f_code {
            check_not_forbidden(state, Self::NAME, "backward_f_code", code as u32)?;
        }

        trace!("Picture {coding_type}, temporal reference {temporal_reference}");

        state.picture = Some(PictureContext::from_header(&header));

        Ok(header)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_bits(10, self.temporal_reference)?;
        writer.put_bits(3, self.picture_coding_type)?;
        writer.put_bits(16, self.vbv_delay)?;

        if self.has_forward_vectors() {
            writer.put_flag(self.full_pel_forward_vector.unwrap_or_default())?;
            writer.put_bits(3, self.forward_f_code.unwrap_or(7))?;
        }

        if self.has_backward_vectors() {
            writer.put_flag(self.full_pel_backward_vector.unwrap_or_default())?;
            writer.put_bits(3, self.backward_f_code.unwrap_or(7))?;
        }

        for info in &self.extra_information_picture {
            writer.put_flag(true)?;
            writer.put_bits(8, *info)?;
        }
        writer.put_flag(false)?;

        Ok(())
    }
}

#[cfg(test)]
use crate::structs::{parse_standalone, roundtrip};

#[test]
fn intra_picture() -> anyhow::Result<()> {
    let (header, log) = parse_standalone::<PictureHeader>(&[0x00, 0x0F, 0xFF, 0xF8])?;

    assert_eq!(header.temporal_reference, 0);
    assert_eq!(header.coding_type(), CodingType::Intra);
    assert_eq!(header.vbv_delay, VBV_DELAY_VARIABLE);
    assert!(header.forward_f_code.is_none());
    assert!(header.extra_information_picture.is_empty());

    assert_eq!(log.attributed_bits(), 30);
    assert_eq!(
        log.find("vbv_delay").and_then(|e| e.meaning.as_deref()),
        Some("variable bit rate")
    );
    Ok(())
}

#[test]
fn b_picture_with_extra_information() -> anyhow::Result<()> {
    let header = PictureHeader {
        temporal_reference: 513,
        picture_coding_type: 3,
        vbv_delay: 1234,
        full_pel_forward_vector: Some(false),
        forward_f_code: Some(7),
        full_pel_backward_vector: Some(true),
        backward_f_code: Some(7),
        extra_information_picture: vec![0xAB, 0x01],
    };

    let (parsed, bits) = roundtrip(&header)?;
    assert_eq!(parsed, header);
    assert_eq!(bits, 29 + 4 + 4 + 2 * 9 + 1);
    assert_eq!(parsed.coding_type().to_string(), "B");
    assert_eq!(
        parsed.field("extra_information_picture[1]"),
        Some(crate::utils::syntax_log::FieldValue::Unsigned(1))
    );
    Ok(())
}

#[test]
fn missing_terminating_extra_bit() {
    // I picture cut right after vbv_delay
    let mut state = ParserState::default();
    let mut reader = SyntaxReader::with_bit_len(&[0x00, 0x0F, 0xFF, 0xF8], 29);

    let err = PictureHeader::parse(&mut state, &mut reader).unwrap_err();
    let field = err
        .downcast_ref::<crate::utils::errors::ReadError>()
        .and_then(|e| e.field());
    assert_eq!(field, Some("extra_bit_picture"));
}
