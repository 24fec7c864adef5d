//! `quant_matrix_extension()`, extension id 3.

use anyhow::Result;

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::{SyntaxStructure, read_matrix, write_matrix};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};

/// Each matrix follows its load flag, in bitstream (zigzag) order.
#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct QuantMatrixExtension {
    pub load_intra_quantiser_matrix: bool,
    pub intra_quantiser_matrix: Option<[u8; 64]>,
    pub load_non_intra_quantiser_matrix: bool,
    pub non_intra_quantiser_matrix: Option<[u8; 64]>,
    pub load_chroma_intra_quantiser_matrix: bool,
    pub chroma_intra_quantiser_matrix: Option<[u8; 64]>,
    pub load_chroma_non_intra_quantiser_matrix: bool,
    pub chroma_non_intra_quantiser_matrix: Option<[u8; 64]>,
}

fn read_optional_matrix(
    reader: &mut SyntaxReader,
    flag: &str,
    name: &str,
) -> Result<(bool, Option<[u8; 64]>)> {
    let load = reader.read_flag(flag)?;
    let matrix = if load {
        Some(read_matrix(reader, name)?)
    } else {
        None
    };

    Ok((load, matrix))
}

impl QuantMatrixExtension {
    fn matrices(&self) -> [(bool, &Option<[u8; 64]>); 4] {
        [
            (self.load_intra_quantiser_matrix, &self.intra_quantiser_matrix),
            (self.load_non_intra_quantiser_matrix, &self.non_intra_quantiser_matrix),
            (
                self.load_chroma_intra_quantiser_matrix,
                &self.chroma_intra_quantiser_matrix,
            ),
            (
                self.load_chroma_non_intra_quantiser_matrix,
                &self.chroma_non_intra_quantiser_matrix,
            ),
        ]
    }
}

impl SyntaxStructure for QuantMatrixExtension {
    const NAME: &'static str = "quant_matrix_extension";

    fn parse(_state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let (load_intra_quantiser_matrix, intra_quantiser_matrix) = read_optional_matrix(
            reader,
            "load_intra_quantiser_matrix",
            "intra_quantiser_matrix",
        )?;
        let (load_non_intra_quantiser_matrix, non_intra_quantiser_matrix) = read_optional_matrix(
            reader,
            "load_non_intra_quantiser_matrix",
            "non_intra_quantiser_matrix",
        )?;
        let (load_chroma_intra_quantiser_matrix, chroma_intra_quantiser_matrix) =
            read_optional_matrix(
                reader,
                "load_chroma_intra_quantiser_matrix",
                "chroma_intra_quantiser_matrix",
            )?;
        let (load_chroma_non_intra_quantiser_matrix, chroma_non_intra_quantiser_matrix) =
            read_optional_matrix(
                reader,
                "load_chroma_non_intra_quantiser_matrix",
                "chroma_non_intra_quantiser_matrix",
            )?;

        Ok(Self {
            load_intra_quantiser_matrix,
            intra_quantiser_matrix,
            load_non_intra_quantiser_matrix,
            non_intra_quantiser_matrix,
            load_chroma_intra_quantiser_matrix,
            chroma_intra_quantiser_matrix,
            load_chroma_non_intra_quantiser_matrix,
            chroma_non_intra_quantiser_matrix,
        })
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        for (load, matrix) in self.matrices() {
            writer.put_flag(load)?;
            if let Some(matrix) = matrix {
                write_matrix(writer, matrix)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
use crate::structs::{parse_standalone, roundtrip};

#[test]
fn only_loaded_matrices_are_read() -> anyhow::Result<()> {
    let ext = QuantMatrixExtension {
        load_intra_quantiser_matrix: false,
        intra_quantiser_matrix: None,
        load_non_intra_quantiser_matrix: true,
        non_intra_quantiser_matrix: Some([16; 64]),
        load_chroma_intra_quantiser_matrix: false,
        chroma_intra_quantiser_matrix: None,
        load_chroma_non_intra_quantiser_matrix: false,
        chroma_non_intra_quantiser_matrix: None,
    };

    let (parsed, bits) = roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 4 + 64 * 8);

    // no matrices: four clear flags and nothing else
    let (parsed, log) = parse_standalone::<QuantMatrixExtension>(&[0x00])?;
    assert!(parsed.intra_quantiser_matrix.is_none());
    assert_eq!(log.attributed_bits(), 4);
    Ok(())
}

#[test]
fn truncated_matrix_names_the_element() {
    // load_intra_quantiser_matrix set, then 15 bits of matrix data
    let err = parse_standalone::<QuantMatrixExtension>(&[0x80, 0x00]).unwrap_err();
    let read = err
        .downcast_ref::<crate::utils::errors::ReadError>()
        .and_then(|e| e.field());
    assert_eq!(read, Some("intra_quantiser_matrix[1]"));
}
