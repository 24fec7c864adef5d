/// Unit extraction from video elementary streams.
///
/// Provides the [`Extractor`](extract::Extractor) for locating start codes and
/// splitting continuous stream data into [`Unit`](extract::Unit) payloads.
pub mod extract;

/// Unit parsing into syntax structures.
///
/// Provides the [`Parser`](parse::Parser) for turning units into
/// [`ParsedUnit`](parse::ParsedUnit) values: the typed structure together with
/// the log of every field read.
pub mod parse;

/// A short MPEG-2 stream: sequence header, sequence extension, GOP header,
/// I picture header, picture coding extension, one slice and a sequence end.
pub const EXAMPLE_DATA: &[u8] = &[
    0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x23, 0x0E, 0xA6, 0x23, 0x80, // sequence_header
    0x00, 0x00, 0x01, 0xB5, 0x14, 0x82, 0x00, 0x01, 0x00, 0x00, // sequence_extension
    0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x40, // group_of_pictures_header
    0x00, 0x00, 0x01, 0x00, 0x00, 0x0F, 0xFF, 0xF8, // picture_header
    0x00, 0x00, 0x01, 0xB5, 0x8F, 0xFF, 0xF7, 0xC0, 0x80, // picture_coding_extension
    0x00, 0x00, 0x01, 0x01, 0x43, 0x5A, 0x80, // slice
    0x00, 0x00, 0x01, 0xB7, // sequence_end
];

/// Number of units in [`EXAMPLE_DATA`].
pub const EXAMPLE_UNITS: usize = 7;
