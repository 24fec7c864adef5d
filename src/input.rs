use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;
use esyntax::process::extract::{Extractor, Unit};
use esyntax::utils::errors::ExtractError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Unified input reader for files and stdin, feeding an [`Extractor`].
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
    len: Option<u64>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let (reader, len): (Box<dyn Read>, _) = if is_pipe {
            (Box::new(io::stdin().lock()), None)
        } else {
            let file = File::open(input_path)?;
            let len = file.metadata().ok().map(|m| m.len());
            (Box::new(BufReader::new(file)), len)
        };

        Ok(Self {
            reader,
            is_pipe,
            len,
        })
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Input size in bytes, when known.
    pub fn size(&self) -> Option<u64> {
        self.len
    }

    /// Extracts units from the whole input, calling `callback` for each.
    ///
    /// The callback returns Ok(false) to stop early. Returns the extractor so
    /// the caller can query its counters.
    pub fn for_each_unit<F>(&mut self, mut callback: F) -> Result<Extractor>
    where
        F: FnMut(Result<Unit, ExtractError>) -> Result<bool>,
    {
        let mut extractor = Extractor::default();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let bytes_read = self.reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            extractor.push_bytes(&buffer[..bytes_read]);
            for unit in extractor.by_ref() {
                if !callback(unit)? {
                    return Ok(extractor);
                }
            }
        }

        extractor.finish();
        for unit in extractor.by_ref() {
            if !callback(unit)? {
                break;
            }
        }

        Ok(extractor)
    }
}
