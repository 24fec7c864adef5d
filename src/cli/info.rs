use std::collections::BTreeMap;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar};

use super::command::{Cli, InfoArgs};
use super::{create_spinner, tick};
use crate::input::InputReader;
use esyntax::process::extract::Unit;
use esyntax::process::parse::Parser;
use esyntax::structs::Syntax;
use esyntax::structs::extension::Extension;
use esyntax::structs::group_of_pictures::GroupOfPicturesHeader;
use esyntax::structs::picture_header::CodingType;
use esyntax::structs::sequence_extension::SequenceExtension;
use esyntax::structs::sequence_header::SequenceHeader;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing elementary stream: {}", args.input.display());

    let mut input_reader = InputReader::new(&args.input)?;
    if input_reader.is_pipe() {
        log::debug!("Reading from stdin");
    }

    let mut parser = Parser::default();
    parser.set_fail_level(cli.fail_level());

    let mut context = AnalysisContext {
        total_bytes: input_reader.size(),
        pb: multi.map(|m| create_spinner(m, "Analyzing")).transpose()?,
        ..Default::default()
    };

    let extractor = input_reader.for_each_unit(|unit| {
        if let Ok(unit) = unit {
            context.process_unit(&unit, &mut parser, cli)?;
        }
        Ok(true)
    })?;
    context.bytes_skipped = extractor.bytes_skipped();

    if let Some(pb) = &context.pb {
        pb.finish_and_clear();
    }

    match &context.sequence {
        Some(sequence) => {
            println!();
            println!("Video Stream Information");
            println!("========================");
            println!();

            display_sequence_info(sequence, context.sequence_extension.as_ref());
            if let Some(gop) = &context.first_gop {
                println!("First time code             {gop}");
                println!();
            }
            context.display_summary();
        }
        None => {
            println!("No sequence header found in the file.");
            println!("This doesn't appear to be a valid video elementary stream.");
        }
    }

    Ok(())
}

#[derive(Default)]
struct AnalysisContext {
    sequence: Option<SequenceHeader>,
    sequence_extension: Option<SequenceExtension>,
    first_gop: Option<GroupOfPicturesHeader>,
    unit_counts: BTreeMap<&'static str, usize>,
    picture_counts: BTreeMap<CodingType, usize>,
    field_pictures: usize,
    caption_units: usize,
    unit_count: usize,
    failed_units: usize,
    total_bytes: Option<u64>,
    bytes_skipped: u64,
    pb: Option<ProgressBar>,
}

impl AnalysisContext {
    fn process_unit(&mut self, unit: &Unit, parser: &mut Parser, cli: &Cli) -> Result<()> {
        self.unit_count += 1;
        tick(self.pb.as_ref(), self.unit_count);

        let parsed = match parser.parse(unit) {
            Ok(parsed) => parsed,
            Err(e) => {
                if cli.strict {
                    return Err(e);
                }
                log::warn!("Parse error: {e:#}");
                self.failed_units += 1;
                return Ok(());
            }
        };

        *self.unit_counts.entry(parsed.syntax.name()).or_default() += 1;

        match parsed.syntax {
            Syntax::SequenceHeader(header) => {
                self.sequence.get_or_insert(header);
            }
            Syntax::Extension(Extension::Sequence(ext)) => {
                self.sequence_extension.get_or_insert(ext);
            }
            Syntax::Extension(Extension::PictureCoding(ext)) if ext.is_field_picture() => {
                self.field_pictures += 1;
            }
            Syntax::GroupOfPictures(gop) => {
                self.first_gop.get_or_insert(gop);
            }
            Syntax::Picture(picture) => {
                *self.picture_counts.entry(picture.coding_type()).or_default() += 1;
            }
            Syntax::UserData(user_data) if user_data.cc_data.is_some() => {
                self.caption_units += 1;
            }
            _ => {}
        }

        Ok(())
    }

    fn display_summary(&self) {
        println!("Unit Counts");
        for (name, count) in &self.unit_counts {
            println!("  {name:26}  {count}");
        }
        println!();

        let pictures = self.picture_counts.values().sum::<usize>();
        let by_type = self
            .picture_counts
            .iter()
            .map(|(coding_type, count)| format!("{coding_type}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");

        println!("Analysis Summary");
        println!("  Units processed           {}", self.unit_count);
        println!("  Failed units              {}", self.failed_units);
        println!("  Pictures                  {pictures} ({by_type})");
        println!("  Field pictures            {}", self.field_pictures);
        println!("  Closed caption units      {}", self.caption_units);

        if let Some(total_bytes) = self.total_bytes {
            let size_mb = total_bytes as f64 / 1_000_000.0;
            println!("  Size                      {size_mb:.2} MB ({total_bytes} bytes)");
        }
        if self.bytes_skipped > 0 {
            println!("  Bytes skipped             {}", self.bytes_skipped);
        }

        // frame pictures count once, field pictures come in pairs
        let frames = pictures.saturating_sub(self.field_pictures / 2);
        if let Some(rate) = self.frame_rate() {
            println!(
                "  Duration                  {}",
                duration_str(frames as f64 / rate)
            );
        }

        println!();
    }

    fn frame_rate(&self) -> Option<f64> {
        let header = self.sequence.as_ref()?;
        match &self.sequence_extension {
            Some(ext) => ext.frame_rate(header),
            None => header.frame_rate(),
        }
    }
}

fn display_sequence_info(header: &SequenceHeader, ext: Option<&SequenceExtension>) {
    let (width, height, bit_rate) = match ext {
        Some(ext) => (
            ext.horizontal_size(header),
            ext.vertical_size(header),
            Some(ext.bit_rate(header)),
        ),
        None => (
            header.horizontal_size_value as u32,
            header.vertical_size_value as u32,
            header.bit_rate(),
        ),
    };

    println!("Sequence Information");
    println!(
        "  Format                    {}",
        if ext.is_some() { "MPEG-2" } else { "MPEG-1" }
    );
    println!("  Frame size                {width}x{height}");
    println!("  Aspect ratio              {}", header.aspect_ratio());

    match ext.and_then(|ext| ext.frame_rate(header)).or(header.frame_rate()) {
        Some(rate) => println!("  Frame rate                {rate:.3} fps"),
        None => println!("  Frame rate                reserved ({})", header.frame_rate_code),
    }

    match bit_rate {
        Some(bit_rate) => println!("  Bit rate                  {} kbps", bit_rate / 1000),
        None => println!("  Bit rate                  variable"),
    }
    println!("  VBV buffer size           {} bits", header.vbv_buffer_size());

    if let Some(ext) = ext {
        println!(
            "  Profile and level         {}@{}",
            ext.profile(),
            ext.level()
        );
        println!("  Chroma format             {}", ext.chroma_format());
        println!("  Progressive sequence      {}", ext.progressive_sequence);
        println!("  Low delay                 {}", ext.low_delay);
    }

    println!();
}

fn duration_str(sec: f64) -> String {
    let total_ms = (sec * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = total_ms / 60_000 % 60;
    let seconds = total_ms / 1000 % 60;
    let milliseconds = total_ms % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
}

#[test]
fn summary_of_example_stream() -> Result<()> {
    use clap::Parser as ClapParser;
    use esyntax::process::{EXAMPLE_DATA, extract::Extractor};

    let cli = Cli::try_parse_from(["esdump", "info", "-"])?;
    let mut parser = Parser::default();
    let mut context = AnalysisContext::default();

    let mut extractor = Extractor::default();
    extractor.push_bytes(EXAMPLE_DATA);
    extractor.finish();
    for unit in extractor {
        context.process_unit(&unit?, &mut parser, &cli)?;
    }

    assert_eq!(context.unit_count, 7);
    assert_eq!(context.failed_units, 0);
    assert_eq!(context.picture_counts.get(&CodingType::Intra), Some(&1));
    assert_eq!(context.unit_counts.get("group_of_pictures_header"), Some(&1));
    assert_eq!(context.frame_rate(), Some(25.0));
    assert!(context.sequence_extension.is_some());
    Ok(())
}

#[test]
fn duration_formatting() {
    assert_eq!(duration_str(0.04), "00:00:00.040");
    assert_eq!(duration_str(3725.5), "01:02:05.500");
}
