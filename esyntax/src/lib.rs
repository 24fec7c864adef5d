//! Bit-exact, self-describing parser for MPEG-2 video elementary stream syntax.
//!
//! ## Technical Overview
//!
//! An elementary stream is a sequence of units, each introduced by a start
//! code `00 00 01 xx`. The start code value selects the syntax structure of
//! the payload that follows.
//!
//! Every field is read through a [`SyntaxReader`](utils::bitstream_io::SyntaxReader),
//! which records its name, bit offset, width, raw code and meaning. The
//! resulting [`SyntaxLog`](utils::syntax_log::SyntaxLog) attributes every bit
//! of a unit payload to a field or to padding.
//!
//! ### Structures
//!
//! - Sequence header and its extensions (sequence, display, quant matrix, copyright)
//! - Group of pictures header
//! - Picture header, picture coding extension, picture display extension
//! - Slice header (macroblock data is kept opaque)
//! - User data, with ATSC closed captions and active format description
//!
//! ## Quick Start
//!
//! 1. Split a stream into units using [`process::extract::Extractor`]
//! 2. Parse units into structures and logs using [`process::parse::Parser`]
//!
//! ```rust,no_run
//! use esyntax::process::{EXAMPLE_DATA, extract::Extractor, parse::Parser};
//!
//! let mut extractor = Extractor::default();
//! let mut parser = Parser::default();
//!
//! extractor.push_bytes(EXAMPLE_DATA);
//! extractor.finish();
//!
//! for unit_result in extractor {
//!     match unit_result {
//!         Ok(unit) => {
//!             let parsed = parser.parse(&unit)?;
//!
//!             for entry in parsed.log.entries() {
//!                 println!("{entry}");
//!             }
//!         }
//!         Err(extract_error) => {
//!             // Garbage between units is skipped, the stream continues
//!             eprintln!("Extraction error: {}", extract_error);
//!         }
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Processing functionality for video elementary streams.
///
/// 1. **Unit Extraction** ([`process::extract`]): Splits stream data at start
///    code prefixes.
///
/// 2. **Parsing** ([`process::parse`]): Converts unit payloads into structures
///    and syntax logs, carrying sequence and picture context between units.
pub mod process;

/// Data structures representing video syntax structures.
///
/// - **Start Codes** ([`structs::start_code`]): Unit classification
/// - **Sequence Layer** ([`structs::sequence_header`], [`structs::sequence_extension`])
/// - **Extensions** ([`structs::extension`]): Dispatch by extension identifier
/// - **Pictures** ([`structs::picture_header`], [`structs::picture_coding_extension`])
/// - **Slices** ([`structs::slice`]): Slice headers
/// - **User Data** ([`structs::user_data`]): Registered user data formats
/// - **Field Sets** ([`structs::fields`]): Named field access
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Logging bit reader and writer
/// - **Syntax Log** ([`utils::syntax_log`]): Parse trace entries
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
