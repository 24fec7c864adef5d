//! `sequence_extension()`, extension id 1.
//!
//! Presence of this extension after a sequence header marks the stream as
//! MPEG-2. The size and rate fields extend the sequence header values with
//! their high-order bits.

use anyhow::Result;
use log::{Level, debug};

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::sequence_header::SequenceHeader;
use crate::structs::{SyntaxStructure, read_marker, report};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::SyntaxError;
use crate::utils::syntax_log::{Meanings, RESERVED, describe};

pub const CHROMA_FORMAT: &Meanings = &[(1, "4:2:0"), (2, "4:2:2"), (3, "4:4:4")];

pub(crate) const PROFILES: &Meanings = &[
    (1, "High"),
    (2, "Spatially Scalable"),
    (3, "SNR Scalable"),
    (4, "Main"),
    (5, "Simple"),
];

pub(crate) const LEVELS: &Meanings = &[(4, "High"), (6, "High 1440"), (8, "Main"), (10, "Low")];

/// `profile_and_level_indication` values with the escape bit set.
pub(crate) const ESCAPED_PROFILE_LEVELS: &Meanings = &[
    (0x82, "4:2:2@High"),
    (0x85, "4:2:2@Main"),
    (0x8A, "Multi-view@High"),
    (0x8B, "Multi-view@High 1440"),
    (0x8D, "Multi-view@Main"),
    (0x8E, "Multi-view@Low"),
];

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct SequenceExtension {
    pub profile_and_level_indication: u8,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
    pub horizontal_size_extension: u8,
    pub vertical_size_extension: u8,
    pub bit_rate_extension: u16,
    pub vbv_buffer_size_extension: u8,
    pub low_delay: bool,
    pub frame_rate_extension_n: u8,
    pub frame_rate_extension_d: u8,
}

impl SequenceExtension {
    pub fn is_escaped(&self) -> bool {
        self.profile_and_level_indication & 0x80 != 0
    }

    pub fn profile(&self) -> &'static str {
        if self.is_escaped() {
            return self.escaped_label().0;
        }

        describe(PROFILES, ((self.profile_and_level_indication >> 4) & 0x7) as u64)
    }

    pub fn level(&self) -> &'static str {
        if self.is_escaped() {
            return self.escaped_label().1;
        }

        describe(LEVELS, (self.profile_and_level_indication & 0xF) as u64)
    }

    pub fn chroma_format(&self) -> &'static str {
        describe(CHROMA_FORMAT, self.chroma_format as u64)
    }

    pub fn horizontal_size(&self, header: &SequenceHeader) -> u32 {
        (self.horizontal_size_extension as u32) << 12 | header.horizontal_size_value as u32
    }

    pub fn vertical_size(&self, header: &SequenceHeader) -> u32 {
        (self.vertical_size_extension as u32) << 12 | header.vertical_size_value as u32
    }

    /// Bit rate in bits per second.
    pub fn bit_rate(&self, header: &SequenceHeader) -> u64 {
        ((self.bit_rate_extension as u64) << 18 | header.bit_rate_value as u64) * 400
    }

    pub fn frame_rate(&self, header: &SequenceHeader) -> Option<f64> {
        header.frame_rate_fraction().map(|(num, den)| {
            num as f64 * (self.frame_rate_extension_n as f64 + 1.0)
                / (den as f64 * (self.frame_rate_extension_d as f64 + 1.0))
        })
    }

    fn escaped_label(&self) -> (&'static str, &'static str) {
        describe(ESCAPED_PROFILE_LEVELS, self.profile_and_level_indication as u64)
            .split_once('@')
            .unwrap_or((RESERVED, RESERVED))
    }
}

fn profile_and_level_meaning(value: u8) -> String {
    if value & 0x80 != 0 {
        return describe(ESCAPED_PROFILE_LEVELS, value as u64).to_string();
    }

    format!(
        "{}@{}",
        describe(PROFILES, ((value >> 4) & 0x7) as u64),
        describe(LEVELS, (value & 0xF) as u64)
    )
}

impl SyntaxStructure for SequenceExtension {
    const NAME: &'static str = "sequence_extension";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let profile_and_level_indication = reader.read_bits("profile_and_level_indication", 8)?;
        reader.annotate(profile_and_level_meaning(profile_and_level_indication));

        let progressive_sequence = reader.read_flag("progressive_sequence")?;
        let chroma_format = reader.read_bits_with_meaning("chroma_format", 2, CHROMA_FORMAT)?;
        let horizontal_size_extension = reader.read_bits("horizontal_size_extension", 2)?;
        let vertical_size_extension = reader.read_bits("vertical_size_extension", 2)?;
        let bit_rate_extension = reader.read_bits("bit_rate_extension", 12)?;
        read_marker(state, reader, Self::NAME)?;
        let vbv_buffer_size_extension = reader.read_bits("vbv_buffer_size_extension", 8)?;
        let low_delay = reader.read_flag("low_delay")?;
        let frame_rate_extension_n = reader.read_bits("frame_rate_extension_n", 2)?;
        let frame_rate_extension_d = reader.read_bits("frame_rate_extension_d", 5)?;

        if chroma_format == 0 {
            report(
                state,
                Level::Warn,
                SyntaxError::UnsupportedFieldValue {
                    structure: Self::NAME,
                    field: "chroma_format",
                    value: 0,
                },
            )?;
        }

        let ext = Self {
            profile_and_level_indication,
            progressive_sequence,
            chroma_format,
            horizontal_size_extension,
            vertical_size_extension,
            bit_rate_extension,
            vbv_buffer_size_extension,
            low_delay,
            frame_rate_extension_n,
            frame_rate_extension_d,
        };

        debug!(
            "Sequence extension: {}@{}, {}, progressive_sequence {}",
            ext.profile(),
            ext.level(),
            ext.chroma_format(),
            progressive_sequence
        );

        match state.sequence.as_mut() {
            Some(sequence) => sequence.apply_extension(&ext),
            None => report(
                state,
                Level::Debug,
                SyntaxError::MissingContext {
                    structure: Self::NAME,
                    needed: "sequence_header",
                },
            )?,
        }

        Ok(ext)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_bits(8, self.profile_and_level_indication)?;
        writer.put_flag(self.progressive_sequence)?;
        writer.put_bits(2, self.chroma_format)?;
        writer.put_bits(2, self.horizontal_size_extension)?;
        writer.put_bits(2, self.vertical_size_extension)?;
        writer.put_bits(12, self.bit_rate_extension)?;
        writer.put_flag(true)?;
        writer.put_bits(8, self.vbv_buffer_size_extension)?;
        writer.put_flag(self.low_delay)?;
        writer.put_bits(2, self.frame_rate_extension_n)?;
        writer.put_bits(5, self.frame_rate_extension_d)?;

        Ok(())
    }
}

#[cfg(test)]
use crate::structs::{parse_standalone, roundtrip};

#[test]
fn main_profile_main_level() -> anyhow::Result<()> {
    let (ext, log) =
        parse_standalone::<SequenceExtension>(&[0x48, 0x20, 0x00, 0x10, 0x00, 0x00])?;

    assert_eq!(ext.profile(), "Main");
    assert_eq!(ext.level(), "Main");
    assert_eq!(ext.chroma_format(), "4:2:0");
    assert!(!ext.progressive_sequence);
    assert!(!ext.low_delay);
    assert_eq!(
        log.find("profile_and_level_indication")
            .and_then(|e| e.meaning.as_deref()),
        Some("Main@Main")
    );
    assert_eq!(log.attributed_bits(), 44);
    Ok(())
}

#[test]
fn extended_sizes_and_rates() -> anyhow::Result<()> {
    let ext = SequenceExtension {
        profile_and_level_indication: 0x82,
        progressive_sequence: true,
        chroma_format: 2,
        horizontal_size_extension: 1,
        vertical_size_extension: 0,
        bit_rate_extension: 1,
        vbv_buffer_size_extension: 0,
        low_delay: false,
        frame_rate_extension_n: 1,
        frame_rate_extension_d: 0,
    };
    let (parsed, bits) = roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 44);

    assert_eq!(ext.profile(), "4:2:2");
    assert_eq!(ext.level(), "High");
    assert_eq!(ext.chroma_format(), "4:2:2");

    let (header, _) = parse_standalone::<SequenceHeader>(&[
        0x2D, 0x02, 0x40, 0x23, 0x0E, 0xA6, 0x23, 0x80,
    ])?;
    assert_eq!(ext.horizontal_size(&header), 4096 + 720);
    assert_eq!(ext.bit_rate(&header), ((1 << 18) + 15000) * 400);
    assert_eq!(ext.frame_rate(&header), Some(50.0));
    Ok(())
}
