//! `picture_coding_extension()`, extension id 8.
//!
//! Follows every MPEG-2 picture header. The parsed values drive the picture
//! context: field/frame structure, field order and repetition are needed to
//! size a following `picture_display_extension`.

use anyhow::Result;
use log::{Level, debug};

use crate::process::parse::ParserState;
use crate::structs::fields::FieldSet;
use crate::structs::{SyntaxStructure, check_not_forbidden, f_code_meaning, report};
use crate::utils::bitstream_io::{SyntaxReader, SyntaxWriter};
use crate::utils::errors::SyntaxError;
use crate::utils::syntax_log::{Meanings, RESERVED};

pub const INTRA_DC_PRECISION: &Meanings =
    &[(0, "8 bit"), (1, "9 bit"), (2, "10 bit"), (3, "11 bit")];

pub const PICTURE_STRUCTURE: &Meanings = &[
    (0, RESERVED),
    (1, "top field"),
    (2, "bottom field"),
    (3, "frame picture"),
];

pub const FIELD_SEQUENCE: &Meanings = &[
    (0, "frame 1, field 1"),
    (1, "frame 1, field 2"),
    (2, "frame 2, field 3"),
    (3, "frame 2, field 4"),
    (4, "frame 3, field 5"),
    (5, "frame 3, field 6"),
    (6, "frame 4, field 7"),
    (7, "frame 4, field 8"),
];

pub const TOP_FIELD: u8 = 1;
pub const BOTTOM_FIELD: u8 = 2;
pub const FRAME_PICTURE: u8 = 3;

/// Composite video information, present when `composite_display_flag` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FieldSet)]
pub struct CompositeDisplay {
    pub v_axis: bool,
    pub field_sequence: u8,
    pub sub_carrier: bool,
    pub burst_amplitude: u8,
    pub sub_carrier_phase: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, FieldSet)]
pub struct PictureCodingExtension {
    /// `f_code[s][t]`: `s` is forward (0) or backward (1), `t` horizontal
    /// (0) or vertical (1).
    pub f_code: [[u8; 2]; 2],
    pub intra_dc_precision: u8,
    pub picture_structure: u8,
    pub top_field_first: bool,
    pub frame_pred_frame_dct: bool,
    pub concealment_motion_vectors: bool,
    pub q_scale_type: bool,
    pub intra_vlc_format: bool,
    pub alternate_scan: bool,
    pub repeat_first_field: bool,
    pub chroma_420_type: bool,
    pub progressive_frame: bool,
    pub composite_display_flag: bool,
    pub composite_display: Option<CompositeDisplay>,
}

impl PictureCodingExtension {
    pub fn is_progressive_frame(&self) -> bool {
        self.progressive_frame
    }

    pub fn is_field_picture(&self) -> bool {
        matches!(self.picture_structure, TOP_FIELD | BOTTOM_FIELD)
    }

    pub fn is_frame_picture(&self) -> bool {
        self.picture_structure == FRAME_PICTURE
    }

    /// DC coefficient precision in bits.
    pub fn dc_precision_bits(&self) -> u8 {
        8 + self.intra_dc_precision
    }
}

impl SyntaxStructure for PictureCodingExtension {
    const NAME: &'static str = "picture_coding_extension";

    fn parse(state: &mut ParserState, reader: &mut SyntaxReader) -> Result<Self> {
        let mut f_code = [[0u8; 2]; 2];
        for (s, row) in f_code.iter_mut().enumerate() {
            for (t, code) in row.iter_mut().enumerate() {
                *code = reader.read_bits(&format!("f_code[{s}][{t}]"), 4)?;
                reader.annotate(f_code_meaning(*code));
            }
        }

        let intra_dc_precision =
            reader.read_bits_with_meaning("intra_dc_precision", 2, INTRA_DC_PRECISION)?;
        let picture_structure =
            reader.read_bits_with_meaning("picture_structure", 2, PICTURE_STRUCTURE)?;
        let top_field_first = reader.read_flag("top_field_first")?;
        let frame_pred_frame_dct = reader.read_flag("frame_pred_frame_dct")?;
        let concealment_motion_vectors = reader.read_flag("concealment_motion_vectors")?;
        let q_scale_type = reader.read_flag("q_scale_type")?;
        let intra_vlc_format = reader.read_flag("intra_vlc_format")?;
        let alternate_scan = reader.read_flag("alternate_scan")?;
        let repeat_first_field = reader.read_flag("repeat_first_field")?;
        let chroma_420_type = reader.read_flag("chroma_420_type")?;
        let progressive_frame = reader.read_flag("progressive_frame")?;
        let composite_display_flag = reader.read_flag("composite_display_flag")?;

        let composite_display = if composite_display_flag {
            let v_axis = reader.read_flag("v_axis")?;
            let field_sequence =
                reader.read_bits_with_meaning("field_sequence", 3, FIELD_SEQUENCE)?;
            let sub_carrier = reader.read_flag("sub_carrier")?;
            let burst_amplitude = reader.read_bits("burst_amplitude", 7)?;
            let sub_carrier_phase = reader.read_bits("sub_carrier_phase", 8)?;

            Some(CompositeDisplay {
                v_axis,
                field_sequence,
                sub_carrier,
                burst_amplitude,
                sub_carrier_phase,
            })
        } else {
            None
        };

        for (s, row) in f_code.iter().enumerate() {
            for code in row {
                check_not_forbidden(
                    state,
                    Self::NAME,
                    if s == 0 { "f_code[0]" } else { "f_code[1]" },
                    *code as u32,
                )?;
            }
        }

        let ext = Self {
            f_code,
            intra_dc_precision,
            picture_structure,
            top_field_first,
            frame_pred_frame_dct,
            concealment_motion_vectors,
            q_scale_type,
            intra_vlc_format,
            alternate_scan,
            repeat_first_field,
            chroma_420_type,
            progressive_frame,
            composite_display_flag,
            composite_display,
        };

        match state.picture.as_mut() {
            Some(picture) => {
                picture.apply_coding_extension(&ext);
                debug!(
                    "Picture structure {picture_structure}, progressive_frame {progressive_frame}, \
                     repeat_first_field {repeat_first_field}"
                );
            }
            None => report(
                state,
                Level::Debug,
                SyntaxError::MissingContext {
                    structure: Self::NAME,
                    needed: "picture_header",
                },
            )?,
        }

        Ok(ext)
    }

    fn write(&self, writer: &mut SyntaxWriter) -> Result<()> {
        for code in self.f_code.iter().flatten() {
            writer.put_bits(4, *code)?;
        }

        writer.put_bits(2, self.intra_dc_precision)?;
        writer.put_bits(2, self.picture_structure)?;

        for flag in [
            self.top_field_first,
            self.frame_pred_frame_dct,
            self.concealment_motion_vectors,
            self.q_scale_type,
            self.intra_vlc_format,
            self.alternate_scan,
            self.repeat_first_field,
            self.chroma_420_type,
            self.progressive_frame,
            self.composite_display_flag,
        ] {
            writer.put_flag(flag)?;
        }

        if let Some(composite) = &self.composite_display {
            writer.put_flag(composite.v_axis)?;
            writer.put_bits(3, composite.field_sequence)?;
            writer.put_flag(composite.sub_carrier)?;
            writer.put_bits(7, composite.burst_amplitude)?;
            writer.put_bits(8, composite.sub_carrier_phase)?;
        }

        Ok(())
    }
}

#[cfg(test)]
use crate::structs::{parse_standalone, roundtrip};
#[cfg(test)]
use crate::utils::syntax_log::FieldValue;

/// Frame picture, 9-bit DC, top field first, frame DCT, progressive frame.
#[cfg(test)]
const FRAME_PICTURE_EXTENSION: [u8; 4] = [0xFF, 0xFF, 0x7C, 0x08];

#[test]
fn frame_picture_fields() -> anyhow::Result<()> {
    let (ext, log) = parse_standalone::<PictureCodingExtension>(&FRAME_PICTURE_EXTENSION)?;

    assert_eq!(ext.f_code, [[15, 15], [15, 15]]);
    assert_eq!(ext.intra_dc_precision, 1);
    assert_eq!(ext.picture_structure, FRAME_PICTURE);
    assert!(ext.top_field_first);
    assert!(ext.frame_pred_frame_dct);
    assert!(!ext.concealment_motion_vectors);
    assert!(!ext.repeat_first_field);
    assert!(ext.is_progressive_frame());
    assert!(ext.is_frame_picture());
    assert!(!ext.is_field_picture());
    assert_eq!(ext.dc_precision_bits(), 9);
    assert!(ext.composite_display.is_none());

    // one entry per field, nothing for the absent composite group
    assert_eq!(log.len(), 4 + 2 + 10);
    assert!(log.is_contiguous());
    assert_eq!(log.attributed_bits(), 30);

    let entry = log.find("picture_structure").unwrap();
    assert_eq!((entry.bit_offset, entry.bit_len), (18, 2));
    assert_eq!(entry.meaning.as_deref(), Some("frame picture"));
    assert_eq!(
        log.find("intra_dc_precision").and_then(|e| e.meaning.as_deref()),
        Some("9 bit")
    );
    assert_eq!(
        log.find("f_code[1][0]").and_then(|e| e.meaning.as_deref()),
        Some("not used")
    );
    Ok(())
}

#[test]
fn exact_extent_and_one_bit_short() {
    let mut state = ParserState::default();

    let mut reader = SyntaxReader::with_bit_len(&FRAME_PICTURE_EXTENSION, 30);
    assert!(PictureCodingExtension::parse(&mut state, &mut reader).is_ok());
    assert_eq!(reader.available(), 0);

    let mut reader = SyntaxReader::with_bit_len(&FRAME_PICTURE_EXTENSION, 29);
    let err = PictureCodingExtension::parse(&mut state, &mut reader).unwrap_err();

    match err.downcast_ref::<crate::utils::errors::ReadError>() {
        Some(crate::utils::errors::ReadError::OutOfBufferRange {
            field,
            bit_offset,
            requested,
            available,
        }) => {
            assert_eq!(field, "composite_display_flag");
            assert_eq!((*bit_offset, *requested, *available), (29, 1, 0));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn composite_display_roundtrip() -> anyhow::Result<()> {
    let ext = PictureCodingExtension {
        f_code: [[1, 2], [3, 4]],
        intra_dc_precision: 2,
        picture_structure: BOTTOM_FIELD,
        top_field_first: false,
        frame_pred_frame_dct: false,
        concealment_motion_vectors: true,
        q_scale_type: true,
        intra_vlc_format: true,
        alternate_scan: true,
        repeat_first_field: false,
        chroma_420_type: false,
        progressive_frame: false,
        composite_display_flag: true,
        composite_display: Some(CompositeDisplay {
            v_axis: true,
            field_sequence: 5,
            sub_carrier: false,
            burst_amplitude: 0x55,
            sub_carrier_phase: 0xA0,
        }),
    };

    let (parsed, bits) = roundtrip(&ext)?;
    assert_eq!(parsed, ext);
    assert_eq!(bits, 30 + 20);
    assert!(parsed.is_field_picture());

    assert_eq!(
        parsed.field("composite_display.field_sequence"),
        Some(FieldValue::Unsigned(5))
    );
    assert_eq!(parsed.field("f_code[0][1]"), Some(FieldValue::Unsigned(2)));
    Ok(())
}

#[test]
fn reserved_and_forbidden_patterns_are_kept() -> anyhow::Result<()> {
    // every bit set: composite group present, every field kept
    let (ext, log) = parse_standalone::<PictureCodingExtension>(&[0xFF; 7])?;
    assert_eq!(ext.intra_dc_precision, 3);
    assert_eq!(ext.composite_display.map(|c| c.burst_amplitude), Some(0x7F));
    assert_eq!(ext.fields().len(), 4 + 2 + 10 + 5);
    assert_eq!(log.attributed_bits(), 50);

    // every bit clear: reserved structure, forbidden f_codes, still parsed
    let (ext, log) = parse_standalone::<PictureCodingExtension>(&[0x00; 4])?;
    assert_eq!(ext.picture_structure, 0);
    assert_eq!(ext.f_code, [[0, 0], [0, 0]]);
    assert_eq!(ext.fields().len(), 4 + 2 + 10);
    assert_eq!(
        log.find("picture_structure").and_then(|e| e.meaning.as_deref()),
        Some("reserved")
    );
    assert_eq!(
        log.find("f_code[0][0]").and_then(|e| e.meaning.as_deref()),
        Some("forbidden")
    );

    // f_code 10..=14 carry no meaning of their own
    assert_eq!(f_code_meaning(12), "reserved");
    Ok(())
}

#[test]
fn strict_mode_rejects_forbidden_f_code() {
    let mut state = ParserState::default();
    state.set_fail_level(Level::Warn);

    let mut reader = SyntaxReader::new(&[0x00; 4]);
    let err = PictureCodingExtension::parse(&mut state, &mut reader).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyntaxError>(),
        Some(SyntaxError::ForbiddenValue { field: "f_code[0]", .. })
    ));
}

#[test]
fn concurrent_parses_keep_separate_logs() -> anyhow::Result<()> {
    let composite = [0xFFu8; 7];

    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(|| {
            parse_standalone::<PictureCodingExtension>(&FRAME_PICTURE_EXTENSION)
        });
        let b = scope.spawn(|| parse_standalone::<PictureCodingExtension>(&composite));
        (a.join(), b.join())
    });

    let (ext_a, log_a) = a.map_err(|_| anyhow::anyhow!("worker panicked"))??;
    let (ext_b, log_b) = b.map_err(|_| anyhow::anyhow!("worker panicked"))??;

    assert_eq!(ext_a.intra_dc_precision, 1);
    assert_eq!(ext_b.intra_dc_precision, 3);
    assert_eq!(log_a.len(), 16);
    assert_eq!(log_b.len(), 21);
    assert_eq!(log_a.entries()[0].bit_offset, 0);
    assert_eq!(log_b.entries()[0].bit_offset, 0);
    assert!(log_a.is_contiguous() && log_b.is_contiguous());
    Ok(())
}
