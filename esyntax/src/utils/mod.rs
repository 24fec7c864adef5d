//! Utility functions and supporting infrastructure.
//!
//! Provides the logging bit reader and writer, the parse trace types and the
//! error types shared by the structure parsers and the stream driver.

pub mod bitstream_io;
pub mod errors;
pub mod syntax_log;
