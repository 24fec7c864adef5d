use std::collections::BTreeMap;
use std::io::{BufWriter, Stdout, Write};
use std::sync::mpsc;
use std::thread;

use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar};
use log::Level;

use super::command::{Cli, TraceArgs, TraceFormat};
use super::{create_spinner, tick};
use crate::input::InputReader;
use crate::report::{TraceReport, UnitReport};
use esyntax::process::extract::Unit;
use esyntax::process::parse::{ParsedUnit, Parser};
use esyntax::structs::fields::FieldSet;
use esyntax::structs::start_code::StartCode;

/// Result of parsing one unit.
enum Traced {
    Parsed(ParsedUnit),
    Failed(Unit, anyhow::Error),
}

pub fn cmd_trace(args: &TraceArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Tracing elementary stream: {}", args.input.display());

    let pb = multi.map(|m| create_spinner(m, "Tracing")).transpose()?;
    let mut output = TraceOutput::new(args, cli.strict, pb.clone());

    let mut input_reader = InputReader::new(&args.input)?;
    let mut limit = UnitLimit::new(args.limit);

    let extractor = if args.jobs > 1 {
        let mut units = Vec::new();
        let extractor = input_reader.for_each_unit(|unit| {
            if let Ok(unit) = unit {
                if !limit.claim() {
                    return Ok(false);
                }
                units.push(unit);
            }
            Ok(!limit.exhausted())
        })?;

        trace_parallel(units, args.jobs, cli.fail_level(), &mut output)?;
        extractor
    } else {
        let mut parser = Parser::default();
        parser.set_fail_level(cli.fail_level());

        input_reader.for_each_unit(|unit| {
            let Ok(unit) = unit else {
                return Ok(true);
            };
            if !limit.claim() {
                return Ok(false);
            }

            let traced = match parser.parse(&unit) {
                Ok(parsed) => Traced::Parsed(parsed),
                Err(e) => Traced::Failed(unit, e),
            };
            output.emit(traced)?;

            Ok(!limit.exhausted())
        })?
    };

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    log::info!(
        "Traced {} units, {} failed, {} bytes skipped",
        output.units,
        output.failed,
        extractor.bytes_skipped()
    );

    output.finish(&args.input.display().to_string())
}

/// Number of units `--limit` still allows.
struct UnitLimit(usize);

impl UnitLimit {
    fn new(limit: Option<usize>) -> Self {
        Self(limit.unwrap_or(usize::MAX))
    }

    /// Takes one unit from the allowance, false once none are left.
    fn claim(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }

    fn exhausted(&self) -> bool {
        self.0 == 0
    }
}

/// Splits units into segments starting at sequence headers.
///
/// Each segment is independent: a sequence header resets all parser context.
fn split_segments(units: Vec<Unit>) -> Vec<Vec<Unit>> {
    let mut segments: Vec<Vec<Unit>> = Vec::new();

    for unit in units {
        match segments.last_mut() {
            Some(segment) if unit.kind() != StartCode::SequenceHeader => segment.push(unit),
            _ => segments.push(vec![unit]),
        }
    }

    segments
}

fn trace_segment(segment: Vec<Unit>, parser: &mut Parser) -> Vec<Traced> {
    segment
        .into_iter()
        .map(|unit| match parser.parse(&unit) {
            Ok(parsed) => Traced::Parsed(parsed),
            Err(e) => Traced::Failed(unit, e),
        })
        .collect()
}

fn trace_parallel(
    units: Vec<Unit>,
    jobs: usize,
    fail_level: Level,
    output: &mut TraceOutput,
) -> Result<()> {
    let segments = split_segments(units);
    log::debug!("Parsing {} segments on {jobs} workers", segments.len());

    let mut buckets: Vec<Vec<(usize, Vec<Unit>)>> = (0..jobs).map(|_| Vec::new()).collect();
    for (index, segment) in segments.into_iter().enumerate() {
        buckets[index % jobs].push((index, segment));
    }

    let (tx, rx) = mpsc::channel::<(usize, Vec<Traced>)>();

    let handles = buckets
        .into_iter()
        .filter(|bucket| !bucket.is_empty())
        .map(|bucket| {
            let tx = tx.clone();
            thread::spawn(move || {
                for (index, segment) in bucket {
                    let mut parser = Parser::default();
                    parser.set_fail_level(fail_level);

                    if tx.send((index, trace_segment(segment, &mut parser))).is_err() {
                        break;
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    drop(tx);

    // results arrive out of order, emit them in stream order
    let mut pending = BTreeMap::new();
    let mut next = 0;
    let mut result: Result<()> = Ok(());

    for (index, traced) in rx {
        pending.insert(index, traced);

        while let Some(segment) = pending.remove(&next) {
            next += 1;
            if result.is_ok() {
                result = segment.into_iter().try_for_each(|t| output.emit(t));
            }
        }
    }

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("Trace worker thread panicked"))?;
    }

    result
}

struct TraceOutput {
    format: TraceFormat,
    with_fields: bool,
    strict: bool,
    out: BufWriter<Stdout>,
    reports: Vec<UnitReport>,
    pb: Option<ProgressBar>,
    units: usize,
    failed: usize,
}

impl TraceOutput {
    fn new(args: &TraceArgs, strict: bool, pb: Option<ProgressBar>) -> Self {
        Self {
            format: args.format,
            with_fields: args.fields,
            strict,
            out: BufWriter::new(std::io::stdout()),
            reports: Vec::new(),
            pb,
            units: 0,
            failed: 0,
        }
    }

    fn emit(&mut self, traced: Traced) -> Result<()> {
        self.units += 1;
        tick(self.pb.as_ref(), self.units);

        match self.format {
            TraceFormat::Yaml => self.reports.push(match &traced {
                Traced::Parsed(parsed) => UnitReport::from_parsed(parsed, self.with_fields),
                Traced::Failed(unit, e) => UnitReport::from_failure(unit, e),
            }),
            TraceFormat::Plain => match self.pb.clone() {
                Some(pb) => pb.suspend(|| self.write_plain(&traced))?,
                None => self.write_plain(&traced)?,
            },
        }

        if let Traced::Failed(unit, e) = traced {
            self.failed += 1;
            if self.strict {
                self.out.flush()?;
                return Err(e);
            }
            log::warn!("Unit at offset {:#X} skipped: {e:#}", unit.offset);
        }

        Ok(())
    }

    fn write_plain(&mut self, traced: &Traced) -> Result<()> {
        let out = &mut self.out;

        match traced {
            Traced::Parsed(parsed) => {
                writeln!(
                    out,
                    "{:#010X}  {}  {}",
                    parsed.offset,
                    parsed.kind(),
                    parsed.syntax.name()
                )?;

                for entry in parsed.log.entries() {
                    writeln!(out, "  {entry}")?;
                }

                if self.with_fields {
                    for (name, value) in parsed.syntax.fields() {
                        writeln!(out, "    {name} = {value}")?;
                    }
                }
            }
            Traced::Failed(unit, e) => {
                writeln!(out, "{:#010X}  {}  <failed: {e:#}>", unit.offset, unit.kind())?;
            }
        }

        writeln!(out)?;
        Ok(())
    }

    fn finish(mut self, input: &str) -> Result<()> {
        if self.format == TraceFormat::Yaml {
            let report = TraceReport {
                input: input.to_string(),
                units: std::mem::take(&mut self.reports),
            };
            serde_yaml_ng::to_writer(&mut self.out, &report)?;
        }

        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
fn example_units() -> Vec<Unit> {
    use esyntax::process::{EXAMPLE_DATA, extract::Extractor};

    let mut extractor = Extractor::default();
    extractor.push_bytes(EXAMPLE_DATA);
    extractor.push_bytes(EXAMPLE_DATA);
    extractor.finish();
    extractor.flatten().collect()
}

#[test]
fn segments_start_at_sequence_headers() {
    let segments = split_segments(example_units());

    assert_eq!(segments.len(), 2);
    assert!(
        segments
            .iter()
            .all(|s| s[0].kind() == StartCode::SequenceHeader)
    );
    assert_eq!(segments[1][0].offset, 58);
}

#[test]
fn segment_parse_matches_sequential() -> Result<()> {
    let mut parser = Parser::default();
    let sequential = example_units()
        .iter()
        .map(|u| parser.parse(u).map(|p| p.log))
        .collect::<Result<Vec<_>>>()?;

    // segments parsed out of order on fresh parsers
    let mut segments = split_segments(example_units());
    let second = trace_segment(segments.remove(1), &mut Parser::default());
    let first = trace_segment(segments.remove(0), &mut Parser::default());

    let logs = first
        .into_iter()
        .chain(second)
        .map(|t| match t {
            Traced::Parsed(parsed) => Ok(parsed.log),
            Traced::Failed(_, e) => Err(e),
        })
        .collect::<Result<Vec<_>>>()?;

    assert_eq!(logs, sequential);
    Ok(())
}

#[test]
fn limit_counts_traced_units() {
    let mut none = UnitLimit::new(Some(0));
    assert!(none.exhausted());
    assert!(!none.claim());

    let mut two = UnitLimit::new(Some(2));
    let traced = example_units()
        .into_iter()
        .take_while(|_| two.claim())
        .count();
    assert_eq!(traced, 2);
    assert!(two.exhausted());

    let mut unlimited = UnitLimit::new(None);
    assert_eq!(
        example_units().into_iter().take_while(|_| unlimited.claim()).count(),
        14
    );
}
