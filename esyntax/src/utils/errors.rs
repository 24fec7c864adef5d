#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error(
        "{field}: out of buffer range at bit {bit_offset}, requested {requested} bits, {available} available"
    )]
    OutOfBufferRange {
        field: String,
        bit_offset: u64,
        requested: u64,
        available: u64,
    },

    #[error("{field}: bit count must be between 1 and 32. Got {bits}")]
    InvalidBitCount { field: String, bits: u32 },

    #[error("{field}: exp-golomb prefix at bit {bit_offset} exceeds 31 leading zero bits")]
    ExpGolombOverflow { field: String, bit_offset: u64 },

    #[error("{field}: byte-aligned read at unaligned bit offset {bit_offset}")]
    Unaligned { field: String, bit_offset: u64 },

    #[error("bit reader I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// Name of the field whose read failed.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::OutOfBufferRange { field, .. }
            | Self::InvalidBitCount { field, .. }
            | Self::ExpGolombOverflow { field, .. }
            | Self::Unaligned { field, .. } => Some(field),
            Self::Io(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Skipped {len} bytes without a start code at offset {offset:#X}")]
    SkippedBytes { offset: u64, len: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum SyntaxError {
    #[error("{structure}: {field} = {value} is not modelled further by this parser")]
    UnsupportedFieldValue {
        structure: &'static str,
        field: &'static str,
        value: u32,
    },

    #[error("{structure}: {field} = {value} is forbidden")]
    ForbiddenValue {
        structure: &'static str,
        field: &'static str,
        value: u32,
    },

    #[error("{structure}: {field} at bit {bit_offset} must be 1")]
    MarkerBitNotSet {
        structure: &'static str,
        field: &'static str,
        bit_offset: u64,
    },

    #[error("{structure} parsed without a preceding {needed}, defaults assumed")]
    MissingContext {
        structure: &'static str,
        needed: &'static str,
    },

    #[error("{structure}: {bits} bits of non-zero data follow the structure")]
    TrailingData { structure: &'static str, bits: u64 },
}
