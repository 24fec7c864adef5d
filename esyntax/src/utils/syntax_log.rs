//! Structured trace of a parse pass.
//!
//! Every read performed through a [`SyntaxReader`](crate::utils::bitstream_io::SyntaxReader)
//! appends one [`LogEntry`]. Entries are kept in read order, which is also the
//! document order of the syntax diagram, so the log can be rendered as is.

use std::fmt::{Display, Formatter};

/// Value to label mapping for enumerated fields.
///
/// Values without an entry are reported as `reserved`.
pub type Meanings = [(u64, &'static str)];

pub const RESERVED: &str = "reserved";
pub const FORBIDDEN: &str = "forbidden";

/// Looks up the label of `value`, falling back to [`RESERVED`].
pub fn describe(meanings: &Meanings, value: u64) -> &'static str {
    meanings
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, label)| *label)
        .unwrap_or(RESERVED)
}

/// Decoded value of one log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Flag(bool),
    /// Opaque payload, measured in bits.
    Payload(u64),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Unsigned(v) => Some(v),
            Self::Flag(f) => Some(f as u64),
            Self::Signed(_) | Self::Payload(_) => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{}", *v as u8),
            Self::Payload(bits) if bits % 8 == 0 => write!(f, "<{} bytes>", bits / 8),
            Self::Payload(bits) => write!(f, "<{bits} bits>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A syntax element.
    Field,
    /// Bits skipped for alignment or stuffing.
    Padding,
    /// Marker for bytes handed to a sub-reader; the bits are attributed by
    /// the entries that follow at `depth + 1`.
    Nested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub name: String,
    pub bit_offset: u64,
    pub bit_len: u64,
    pub value: FieldValue,
    /// Raw code bits as read, MSB first. Zero for payload entries.
    pub code: u64,
    pub meaning: Option<String>,
    pub kind: EntryKind,
    pub depth: u8,
}

impl LogEntry {
    pub fn end(&self) -> u64 {
        self.bit_offset + self.bit_len
    }

    /// Code bits rendered in binary, for entries short enough to carry them.
    pub fn code_string(&self) -> Option<String> {
        match self.value {
            FieldValue::Payload(_) => None,
            _ if self.bit_len == 0 || self.bit_len > 64 => None,
            _ => Some(format!("{:0width$b}", self.code, width = self.bit_len as usize)),
        }
    }
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let indent = 2 * self.depth as usize;
        let name = match self.kind {
            EntryKind::Padding => format!("{:indent$}({})", "", self.name),
            _ => format!("{:indent$}{}", "", self.name),
        };

        write!(
            f,
            "{:>7} {:>4}  {:<40} {:>10}",
            self.bit_offset,
            self.bit_len,
            name,
            self.value.to_string()
        )?;

        if let Some(code) = self.code_string() {
            if self.bit_len <= 32 {
                write!(f, "  {code:>32}")?;
            }
        }

        if let Some(meaning) = &self.meaning {
            write!(f, "  {meaning}")?;
        }

        Ok(())
    }
}

/// Append-only, ordered sequence of log entries for one parse pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxLog {
    entries: Vec<LogEntry>,
}

impl SyntaxLog {
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut LogEntry> {
        self.entries.last_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Syntax element entries only.
    pub fn fields(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Field)
    }

    /// First field entry with the given name.
    pub fn find(&self, name: &str) -> Option<&LogEntry> {
        self.fields().find(|e| e.name == name)
    }

    /// Bits attributed to fields and padding. Nested markers are not counted,
    /// the entries of the nested structure are.
    pub fn attributed_bits(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.kind != EntryKind::Nested)
            .map(|e| e.bit_len)
            .sum()
    }

    /// Checks that every attributed entry starts where the previous one ended.
    pub fn is_contiguous(&self) -> bool {
        let mut attributed = self.entries.iter().filter(|e| e.kind != EntryKind::Nested);

        let Some(first) = attributed.next() else {
            return true;
        };

        attributed
            .try_fold(first.end(), |end, e| (e.bit_offset == end).then(|| e.end()))
            .is_some()
    }

    /// Appends the entries of a nested log one level deeper.
    pub fn extend_nested(&mut self, nested: SyntaxLog) {
        self.entries.extend(nested.entries.into_iter().map(|mut e| {
            e.depth += 1;
            e
        }));
    }
}

impl IntoIterator for SyntaxLog {
    type Item = LogEntry;
    type IntoIter = std::vec::IntoIter<LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
fn entry(name: &str, bit_offset: u64, bit_len: u64, kind: EntryKind) -> LogEntry {
    LogEntry {
        name: name.to_string(),
        bit_offset,
        bit_len,
        value: FieldValue::Unsigned(0),
        code: 0,
        meaning: None,
        kind,
        depth: 0,
    }
}

#[test]
fn describe_falls_back_to_reserved() {
    const MAP: &Meanings = &[(0, FORBIDDEN), (1, "one"), (2, "two")];

    assert_eq!(describe(MAP, 0), "forbidden");
    assert_eq!(describe(MAP, 2), "two");
    assert_eq!(describe(MAP, 3), "reserved");
}

#[test]
fn contiguity_skips_nested_markers() {
    let mut log = SyntaxLog::default();
    log.push(entry("a", 0, 8, EntryKind::Field));
    log.push(entry("nested", 8, 16, EntryKind::Nested));
    log.push(entry("b", 8, 12, EntryKind::Field));
    log.push(entry("stuffing", 20, 4, EntryKind::Padding));
    log.push(entry("c", 24, 1, EntryKind::Field));

    assert!(log.is_contiguous());
    assert_eq!(log.attributed_bits(), 25);
    assert_eq!(log.fields().count(), 3);

    log.push(entry("gap", 30, 1, EntryKind::Field));
    assert!(!log.is_contiguous());
}

#[test]
fn entry_display() {
    let mut e = entry("picture_structure", 18, 2, EntryKind::Field);
    e.value = FieldValue::Unsigned(3);
    e.code = 3;
    e.meaning = Some("frame picture".into());

    let line = e.to_string();
    assert!(line.contains("picture_structure"));
    assert!(line.contains(" 11"));
    assert!(line.ends_with("frame picture"));

    assert_eq!(FieldValue::Payload(24).to_string(), "<3 bytes>");
    assert_eq!(FieldValue::Payload(18).to_string(), "<18 bits>");
}
