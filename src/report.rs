//! Serializable views of parsed units for the YAML trace output.

use serde::Serialize;

use esyntax::process::extract::Unit;
use esyntax::process::parse::ParsedUnit;
use esyntax::structs::fields::FieldSet;
use esyntax::utils::syntax_log::{EntryKind, FieldValue, LogEntry};

#[derive(Debug, Serialize)]
pub struct TraceReport {
    pub input: String,
    pub units: Vec<UnitReport>,
}

#[derive(Debug, Serialize)]
pub struct UnitReport {
    pub offset: u64,
    pub start_code: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub name: String,
    pub bit_offset: u64,
    pub bit_len: u64,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(skip_serializing_if = "is_field")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "is_zero")]
    pub depth: u8,
}

#[derive(Debug, Serialize)]
pub struct FieldReport {
    pub name: String,
    pub value: String,
}

fn is_field(kind: &&'static str) -> bool {
    *kind == "field"
}

fn is_zero(depth: &u8) -> bool {
    *depth == 0
}

impl From<&LogEntry> for EntryReport {
    fn from(entry: &LogEntry) -> Self {
        Self {
            name: entry.name.clone(),
            bit_offset: entry.bit_offset,
            bit_len: entry.bit_len,
            value: entry.value.to_string(),
            code: entry.code_string(),
            meaning: entry.meaning.clone(),
            kind: match entry.kind {
                EntryKind::Field => "field",
                EntryKind::Padding => "padding",
                EntryKind::Nested => "nested",
            },
            depth: entry.depth,
        }
    }
}

impl UnitReport {
    pub fn from_parsed(parsed: &ParsedUnit, with_fields: bool) -> Self {
        let fields = with_fields.then(|| {
            parsed
                .syntax
                .fields()
                .into_iter()
                .map(|(name, value)| FieldReport {
                    name,
                    value: field_value_string(value),
                })
                .collect()
        });

        Self {
            offset: parsed.offset,
            start_code: format!("{:#04X}", parsed.start_code),
            kind: parsed.kind().name().to_string(),
            structure: Some(parsed.syntax.name()),
            entries: parsed.log.entries().iter().map(EntryReport::from).collect(),
            fields,
            error: None,
        }
    }

    pub fn from_failure(unit: &Unit, error: &anyhow::Error) -> Self {
        Self {
            offset: unit.offset,
            start_code: format!("{:#04X}", unit.start_code),
            kind: unit.kind().name().to_string(),
            structure: None,
            entries: Vec::new(),
            fields: None,
            error: Some(format!("{error:#}")),
        }
    }
}

fn field_value_string(value: FieldValue) -> String {
    match value {
        FieldValue::Flag(flag) => flag.to_string(),
        other => other.to_string(),
    }
}
