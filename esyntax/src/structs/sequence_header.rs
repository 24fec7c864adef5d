//! `sequence_header()`, start code `0xB3`.

use anyhow::Result;
use log::{Level, debug};

use crate::process::parse::{ParserState, SequenceContext};
use crate::structs::fields::FieldSet;
use crate::structs::{
    SyntaxStructure, check_not_forbidden, read_marker, read_matrix, report, write_matrix,
};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::SyntaxError;
use crate::utils::syntax_log::{FORBIDDEN, Meanings, describe};

pub const ASPECT_RATIO_INFORMATION: &Meanings = &[
    (0, FORBIDDEN),
    (1, "square samples"),
    (2, "4:3 display"),
    (3, "16:9 display"),
    (4, "2.21:1 display"),
];

pub const FRAME_RATE_CODE: &Meanings = &[
    (0, FORBIDDEN),
    (1, "23.976 Hz"),
    (2, "24 Hz"),
    (3, "25 Hz"),
    (4, "29.97 Hz"),
    (5, "30 Hz"),
    (6, "50 Hz"),
    (7, "59.94 Hz"),
    (8, "60 Hz"),
];

/// Frame rate numerator and denominator per `frame_rate_code`.
const FRAME_RATES: [(u32, u32); 9] = [
    (0, 1),
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
];

/// `bit_rate_value` of an MPEG-1 variable bit rate stream.
pub const VARIABLE_BIT_RATE: u32 = 0x3FFFF;

/// Quantiser matrices are kept in bitstream (zigzag scan) order.
#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct SequenceHeader {
    pub horizontal_size_value: u16,
    pub vertical_size_value: u16,
    pub aspect_ratio_information: u8,
    pub frame_rate_code: u8,
    pub bit_rate_value: u32,
    pub vbv_buffer_size_value: u16,
    pub constrained_parameters_flag: bool,
    pub load_intra_quantiser_matrix: bool,
    pub intra_quantiser_matrix: Option<[u8; 64]>,
    pub load_non_intra_quantiser_matrix: bool,
    pub non_intra_quantiser_matrix: Option<[u8; 64]>,
}

impl SequenceHeader {
    /// Frame rate in Hz, `None` for forbidden and reserved codes.
    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate_fraction()
            .map(|(num, den)| num as f64 / den as f64)
    }

    pub fn frame_rate_fraction(&self) -> Option<(u32, u32)> {
        match self.frame_rate_code {
            1..=8 => Some(FRAME_RATES[self.frame_rate_code as usize]),
            _ => None,
        }
    }

    pub fn aspect_ratio(&self) -> &'static str {
        describe(ASPECT_RATIO_INFORMATION, self.aspect_ratio_information as u64)
    }

    /// Bit rate in bits per second from the 18 low bits alone, `None` for
    /// variable bit rate.
    pub fn bit_rate(&self) -> Option<u64> {
        (self.bit_rate_value != VARIABLE_BIT_RATE).then(|| self.bit_rate_value as u64 * 400)
    }

    /// VBV buffer size in bits from the 10 low bits.
    pub fn vbv_buffer_size(&self) -> u64 {
        self.vbv_buffer_size_value as u64 * 16 * 1024
    }
}

impl SyntaxStructure for SequenceHeader {
    const NAME: &'static str = "sequence_header";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let horizontal_size_value = reader.read_bits("horizontal_size_value", 12)?;
        let vertical_size_value = reader.read_bits("vertical_size_value", 12)?;
        let aspect_ratio_information =
            reader.read_bits_with_meaning("aspect_ratio_information", 4, ASPECT_RATIO_INFORMATION)?;
        let frame_rate_code = reader.read_bits_with_meaning("frame_rate_code", 4, FRAME_RATE_CODE)?;
        let bit_rate_value = reader.read_bits("bit_rate_value", 18)?;
        read_marker(state, reader, Self::NAME)?;
        let vbv_buffer_size_value = reader.read_bits("vbv_buffer_size_value", 10)?;
        let constrained_parameters_flag = reader.read_flag("constrained_parameters_flag")?;

        let load_intra_quantiser_matrix = reader.read_flag("load_intra_quantiser_matrix")?;
        let intra_quantiser_matrix = if load_intra_quantiser_matrix {
            Some(read_matrix(reader, "intra_quantiser_matrix")?)
        } else {
            None
        };

        let load_non_intra_quantiser_matrix = reader.read_flag("load_non_intra_quantiser_matrix")?;
        let non_intra_quantiser_matrix = if load_non_intra_quantiser_matrix {
            Some(read_matrix(reader, "non_intra_quantiser_matrix")?)
        } else {
            None
        };

        check_not_forbidden(
            state,
            Self::NAME,
            "aspect_ratio_information",
            aspect_ratio_information as u32,
        )?;
        check_not_forbidden(state, Self::NAME, "frame_rate_code", frame_rate_code as u32)?;

        if frame_rate_code > 8 {
            report(
                state,
                Level::Info,
                SyntaxError::UnsupportedFieldValue {
                    structure: Self::NAME,
                    field: "frame_rate_code",
                    value: frame_rate_code as u32,
                },
            )?;
        }

        let header = Self {
            horizontal_size_value,
            vertical_size_value,
            aspect_ratio_information,
            frame_rate_code,
            bit_rate_value,
            vbv_buffer_size_value,
            constrained_parameters_flag,
            load_intra_quantiser_matrix,
            intra_quantiser_matrix,
            load_non_intra_quantiser_matrix,
            non_intra_quantiser_matrix,
        };

        debug!(
            "Sequence header: {}x{}, {}, frame rate code {}",
            horizontal_size_value,
            vertical_size_value,
            header.aspect_ratio(),
            frame_rate_code
        );

        state.sequence = Some(SequenceContext::from_header(&header));
        state.picture = None;

        Ok(header)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_bits(12, self.horizontal_size_value)?;
        writer.put_bits(12, self.vertical_size_value)?;
        writer.put_bits(4, self.aspect_ratio_information)?;
        writer.put_bits(4, self.frame_rate_code)?;
        writer.put_bits(18, self.bit_rate_value)?;
        writer.put_flag(true)?;
        writer.put_bits(10, self.vbv_buffer_size_value)?;
        writer.put_flag(self.constrained_parameters_flag)?;

        writer.put_flag(self.load_intra_quantiser_matrix)?;
        if let Some(matrix) = &self.intra_quantiser_matrix {
            write_matrix(writer, matrix)?;
        }

        writer.put_flag(self.load_non_intra_quantiser_matrix)?;
        if let Some(matrix) = &self.non_intra_quantiser_matrix {
            write_matrix(writer, matrix)?;
        }

        Ok(())
    }
}

#[cfg(test)]
use crate::structs::{parse_standalone, roundtrip};

#[test]
fn parse_pal_header() -> anyhow::Result<()> {
    let (header, log) =
        parse_standalone::<SequenceHeader>(&[0x2D, 0x02, 0x40, 0x23, 0x0E, 0xA6, 0x23, 0x80])?;

    assert_eq!(header.horizontal_size_value, 720);
    assert_eq!(header.vertical_size_value, 576);
    assert_eq!(header.aspect_ratio(), "4:3 display");
    assert_eq!(header.frame_rate(), Some(25.0));
    assert_eq!(header.bit_rate(), Some(6_000_000));
    assert_eq!(header.vbv_buffer_size_value, 112);
    assert!(!header.constrained_parameters_flag);
    assert!(header.intra_quantiser_matrix.is_none());
    assert!(header.non_intra_quantiser_matrix.is_none());

    assert!(log.is_contiguous());
    assert_eq!(log.attributed_bits(), 64);
    assert_eq!(
        log.find("frame_rate_code").and_then(|e| e.meaning.as_deref()),
        Some("25 Hz")
    );
    Ok(())
}

#[test]
fn matrices_roundtrip() -> anyhow::Result<()> {
    let mut intra = [16u8; 64];
    intra[0] = 8;
    intra[63] = 83;

    let header = SequenceHeader {
        horizontal_size_value: 1920,
        vertical_size_value: 1088,
        aspect_ratio_information: 3,
        frame_rate_code: 4,
        bit_rate_value: 20000,
        vbv_buffer_size_value: 488,
        constrained_parameters_flag: false,
        load_intra_quantiser_matrix: true,
        intra_quantiser_matrix: Some(intra),
        load_non_intra_quantiser_matrix: false,
        non_intra_quantiser_matrix: None,
    };

    let (parsed, bits) = roundtrip(&header)?;
    assert_eq!(parsed, header);
    assert_eq!(bits, 64 + 64 * 8);
    assert_eq!(
        header.field("intra_quantiser_matrix[63]"),
        Some(crate::utils::syntax_log::FieldValue::Unsigned(83))
    );
    assert!((parsed.frame_rate().unwrap_or_default() - 29.97).abs() < 0.001);
    Ok(())
}

#[test]
fn forbidden_frame_rate_is_labelled() -> anyhow::Result<()> {
    // frame_rate_code 0, marker set
    let data = [0x2D, 0x02, 0x40, 0x20, 0x0E, 0xA6, 0x23, 0x80];

    let (header, log) = parse_standalone::<SequenceHeader>(&data)?;
    assert_eq!(header.frame_rate(), None);
    assert_eq!(
        log.find("frame_rate_code").and_then(|e| e.meaning.as_deref()),
        Some("forbidden")
    );

    let mut state = ParserState::default();
    state.set_fail_level(Level::Warn);
    let mut reader = SyntaxReader::new(&data);
    assert!(SequenceHeader::parse(&mut state, &mut reader).is_err());
    Ok(())
}
