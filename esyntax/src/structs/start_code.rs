//! Start code values of the video elementary stream.

use std::fmt::{Display, Formatter};

/// Byte prefix of every start code.
pub const START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

pub const PICTURE_START_CODE: u8 = 0x00;
pub const SLICE_START_CODE_MIN: u8 = 0x01;
pub const SLICE_START_CODE_MAX: u8 = 0xAF;
pub const USER_DATA_START_CODE: u8 = 0xB2;
pub const SEQUENCE_HEADER_CODE: u8 = 0xB3;
pub const SEQUENCE_ERROR_CODE: u8 = 0xB4;
pub const EXTENSION_START_CODE: u8 = 0xB5;
pub const SEQUENCE_END_CODE: u8 = 0xB7;
pub const GROUP_START_CODE: u8 = 0xB8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StartCode {
    Picture,
    /// Slice with its vertical position.
    Slice(u8),
    UserData,
    SequenceHeader,
    SequenceError,
    Extension,
    SequenceEnd,
    GroupOfPictures,
    /// `0xB0`, `0xB1` and `0xB6`.
    Reserved(u8),
    /// `0xB9..=0xFF`, used by the system layer.
    System(u8),
}

impl From<u8> for StartCode {
    fn from(value: u8) -> Self {
        match value {
            PICTURE_START_CODE => Self::Picture,
            SLICE_START_CODE_MIN..=SLICE_START_CODE_MAX => Self::Slice(value),
            USER_DATA_START_CODE => Self::UserData,
            SEQUENCE_HEADER_CODE => Self::SequenceHeader,
            SEQUENCE_ERROR_CODE => Self::SequenceError,
            EXTENSION_START_CODE => Self::Extension,
            SEQUENCE_END_CODE => Self::SequenceEnd,
            GROUP_START_CODE => Self::GroupOfPictures,
            0xB0 | 0xB1 | 0xB6 => Self::Reserved(value),
            _ => Self::System(value),
        }
    }
}

impl StartCode {
    pub fn value(&self) -> u8 {
        match *self {
            Self::Picture => PICTURE_START_CODE,
            Self::Slice(v) | Self::Reserved(v) | Self::System(v) => v,
            Self::UserData => USER_DATA_START_CODE,
            Self::SequenceHeader => SEQUENCE_HEADER_CODE,
            Self::SequenceError => SEQUENCE_ERROR_CODE,
            Self::Extension => EXTENSION_START_CODE,
            Self::SequenceEnd => SEQUENCE_END_CODE,
            Self::GroupOfPictures => GROUP_START_CODE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Picture => "picture_start_code",
            Self::Slice(_) => "slice_start_code",
            Self::UserData => "user_data_start_code",
            Self::SequenceHeader => "sequence_header_code",
            Self::SequenceError => "sequence_error_code",
            Self::Extension => "extension_start_code",
            Self::SequenceEnd => "sequence_end_code",
            Self::GroupOfPictures => "group_start_code",
            Self::Reserved(_) => "reserved",
            Self::System(_) => "system_start_code",
        }
    }
}

impl Display for StartCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04X})", self.name(), self.value())
    }
}

#[test]
fn classify_start_codes() {
    assert_eq!(StartCode::from(0x00), StartCode::Picture);
    assert_eq!(StartCode::from(0x01), StartCode::Slice(1));
    assert_eq!(StartCode::from(0xAF), StartCode::Slice(0xAF));
    assert_eq!(StartCode::from(0xB6), StartCode::Reserved(0xB6));
    assert_eq!(StartCode::from(0xE0), StartCode::System(0xE0));

    for v in 0..=u8::MAX {
        assert_eq!(StartCode::from(v).value(), v);
    }

    assert_eq!(StartCode::SequenceHeader.to_string(), "sequence_header_code (0xB3)");
}
