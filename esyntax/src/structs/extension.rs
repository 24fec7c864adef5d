//! `extension_data()`, start code `0xB5`.
//!
//! The first four bits select the extension. Scalable and reserved
//! extensions are not modelled; their payload is logged as one opaque entry.

use anyhow::{Result, bail};
use log::Level;

use crate::process::parse::ParserState;
use crate::structs::copyright_extension::CopyrightExtension;
use crate::structs::fields::{FieldList, FieldSet};
use crate::structs::picture_coding_extension::PictureCodingExtension;
use crate::structs::picture_display_extension::PictureDisplayExtension;
use crate::structs::quant_matrix_extension::QuantMatrixExtension;
use crate::structs::sequence_display_extension::SequenceDisplayExtension;
use crate::structs::sequence_extension::SequenceExtension;
use crate::structs::{SyntaxStructure, report};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::SyntaxError;
use crate::utils::syntax_log::{FieldValue, Meanings};

pub const EXTENSION_START_CODE_IDENTIFIER: &Meanings = &[
    (1, "sequence extension"),
    (2, "sequence display extension"),
    (3, "quant matrix extension"),
    (4, "copyright extension"),
    (5, "sequence scalable extension"),
    (7, "picture display extension"),
    (8, "picture coding extension"),
    (9, "picture spatial scalable extension"),
    (10, "picture temporal scalable extension"),
    (11, "camera parameters extension"),
    (12, "ITU-T extension"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    Sequence(SequenceExtension),
    SequenceDisplay(SequenceDisplayExtension),
    QuantMatrix(QuantMatrixExtension),
    Copyright(CopyrightExtension),
    PictureDisplay(PictureDisplayExtension),
    PictureCoding(PictureCodingExtension),
    Unsupported {
        extension_start_code_identifier: u8,
        payload_bits: u64,
    },
}

impl Extension {
    pub fn identifier(&self) -> u8 {
        match self {
            Self::Sequence(_) => 1,
            Self::SequenceDisplay(_) => 2,
            Self::QuantMatrix(_) => 3,
            Self::Copyright(_) => 4,
            Self::PictureDisplay(_) => 7,
            Self::PictureCoding(_) => 8,
            Self::Unsupported {
                extension_start_code_identifier,
                ..
            } => *extension_start_code_identifier,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sequence(_) => SequenceExtension::NAME,
            Self::SequenceDisplay(_) => SequenceDisplayExtension::NAME,
            Self::QuantMatrix(_) => QuantMatrixExtension::NAME,
            Self::Copyright(_) => CopyrightExtension::NAME,
            Self::PictureDisplay(_) => PictureDisplayExtension::NAME,
            Self::PictureCoding(_) => PictureCodingExtension::NAME,
            Self::Unsupported { .. } => Self::NAME,
        }
    }
}

impl FieldSet for Extension {
    fn collect_fields(&self, prefix: &str, out: &mut FieldList) {
        out.push((
            format!("{prefix}extension_start_code_identifier"),
            FieldValue::Unsigned(self.identifier() as u64),
        ));

        match self {
            Self::Sequence(ext) => ext.collect_fields(prefix, out),
            Self::SequenceDisplay(ext) => ext.collect_fields(prefix, out),
            Self::QuantMatrix(ext) => ext.collect_fields(prefix, out),
            Self::Copyright(ext) => ext.collect_fields(prefix, out),
            Self::PictureDisplay(ext) => ext.collect_fields(prefix, out),
            Self::PictureCoding(ext) => ext.collect_fields(prefix, out),
            Self::Unsupported { payload_bits, .. } => out.push((
                format!("{prefix}extension_data"),
                FieldValue::Payload(*payload_bits),
            )),
        }
    }
}

impl SyntaxStructure for Extension {
    const NAME: &'static str = "extension_data";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let id: u8 = reader.read_bits_with_meaning(
            "extension_start_code_identifier",
            4,
            EXTENSION_START_CODE_IDENTIFIER,
        )?;

        let ext = match id {
            1 => Self::Sequence(SequenceExtension::parse(state, reader)?),
            2 => Self::SequenceDisplay(SequenceDisplayExtension::parse(state, reader)?),
            3 => Self::QuantMatrix(QuantMatrixExtension::parse(state, reader)?),
            4 => Self::Copyright(CopyrightExtension::parse(state, reader)?),
            7 => Self::PictureDisplay(PictureDisplayExtension::parse(state, reader)?),
            8 => Self::PictureCoding(PictureCodingExtension::parse(state, reader)?),
            _ => {
                report(
                    state,
                    Level::Info,
                    SyntaxError::UnsupportedFieldValue {
                        structure: Self::NAME,
                        field: "extension_start_code_identifier",
                        value: id as u32,
                    },
                )?;

                Self::Unsupported {
                    extension_start_code_identifier: id,
                    payload_bits: reader.read_payload("extension_data")?,
                }
            }
        };

        Ok(ext)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        writer.put_bits(4, self.identifier())?;

        match self {
            Self::Sequence(ext) => ext.write(writer),
            Self::SequenceDisplay(ext) => ext.write(writer),
            Self::QuantMatrix(ext) => ext.write(writer),
            Self::Copyright(ext) => ext.write(writer),
            Self::PictureDisplay(ext) => ext.write(writer),
            Self::PictureCoding(ext) => ext.write(writer),
            Self::Unsupported { .. } => bail!(
                "extension {} has no modelled payload to serialize",
                self.identifier()
            ),
        }
    }
}

#[cfg(test)]
use crate::structs::parse_standalone;

#[test]
fn dispatch_by_identifier() -> anyhow::Result<()> {
    // id 8 followed by the frame picture coding extension, shifted by four bits
    let (ext, log) = parse_standalone::<Extension>(&[0x8F, 0xFF, 0xF7, 0xC0, 0x80])?;

    let Extension::PictureCoding(pce) = &ext else {
        panic!("unexpected extension {ext:?}");
    };
    assert_eq!(pce.picture_structure, 3);
    assert_eq!(ext.name(), "picture_coding_extension");
    assert_eq!(
        log.entries()[0].meaning.as_deref(),
        Some("picture coding extension")
    );
    assert_eq!(log.attributed_bits(), 34);

    let fields = ext.fields();
    assert_eq!(fields[0].0, "extension_start_code_identifier");
    assert_eq!(fields[0].1, FieldValue::Unsigned(8));
    Ok(())
}

#[test]
fn unsupported_extension_is_opaque() -> anyhow::Result<()> {
    // sequence scalable extension: not modelled
    let (ext, log) = parse_standalone::<Extension>(&[0x51, 0x23, 0x45])?;
    assert_eq!(
        ext,
        Extension::Unsupported {
            extension_start_code_identifier: 5,
            payload_bits: 20,
        }
    );
    assert_eq!(log.attributed_bits(), 24);

    let (ext, log) = parse_standalone::<Extension>(&[0xF0])?;
    assert_eq!(ext.identifier(), 15);
    assert_eq!(log.entries()[0].meaning.as_deref(), Some("reserved"));

    assert!(ext.write(&mut SyntaxWriter::new()).is_err());
    Ok(())
}
