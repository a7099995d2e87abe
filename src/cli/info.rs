use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mediaprobe::structs::track::MediaType;
use mediaprobe::{MediaReader, RecordReader, Track, TrackSource};

use super::command::{Cli, InfoArgs, OutputFormat};
use crate::input::InputReader;
use crate::report::StreamReport;
use crate::timestamp::time_str;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing stream: {}", args.input.display());

    let input = InputReader::new(&args.input)?;
    let mut reader = mediaprobe::open(input, cli.reader_options(args.lenient_labels))?;

    let records = count_records(&mut reader, cli, multi)?;
    let tracks = reader.get_tracks()?.to_vec();
    let size = reader.source().len();

    match args.output {
        OutputFormat::Yaml => {
            let report = StreamReport::new(reader.format(), size, records, &tracks);
            print!("{}", report.to_yaml()?);
        }
        OutputFormat::Plain => {
            display_container(&reader, size, records);
            tracks.iter().for_each(display_track);
        }
    }

    Ok(())
}

/// Walks every record once. `None` when enumeration stopped at a fault.
fn count_records(
    reader: &mut MediaReader<InputReader>,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<Option<u64>> {
    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new(reader.source().len()));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Reading records...");
            Some(pb)
        }
        None => None,
    };

    reader.rewind();
    let mut count = 0u64;
    let mut complete = true;

    for node in reader.nodes() {
        match node {
            Ok(node) => {
                count += 1;
                if count.is_multiple_of(100) {
                    if let Some(ref pb) = pb {
                        pb.set_position(node.end());
                        pb.set_message(format!("Reading records...        {count}"));
                    }
                }
            }
            Err(e) => {
                if cli.strict {
                    return Err(e);
                }
                log::warn!("Record enumeration stopped after {count} records: {e}");
                complete = false;
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    reader.rewind();

    Ok(complete.then_some(count))
}

fn display_container(reader: &MediaReader<InputReader>, size: u64, records: Option<u64>) {
    let title = format!("{} Stream Information", reader.format());
    println!();
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    println!();

    println!("Container");
    println!("  Format                    {}", reader.format());
    let size_mb = size as f64 / 1_000_000.0;
    println!("  Size                      {size_mb:.2} MB ({size} bytes)");
    if let Some(records) = records {
        println!("  Records                   {records}");
    }
    if reader.first_record_offset() > 0 {
        println!("  First record at           {}", reader.first_record_offset());
    }
    println!();
}

fn display_track(track: &Track) {
    println!("Track {}", track.id);
    println!("  Type                      {}", track.media_type);
    println!("  Codec                     {}", track.codec);

    if let Some(name) = &track.name {
        println!("  Name                      {name}");
    }

    match track.media_type {
        MediaType::Audio => {
            println!("  Sampling rate             {} Hz", track.sample_rate);
            println!("  Channels                  {}", track.channels);
            println!("  Bit depth                 {}", track.bit_depth);
            println!("  Samples                   {}", track.sample_count);
        }
        MediaType::Video => {
            println!("  Resolution                {}x{}", track.width, track.height);
            println!("  Frame rate                {:.3} fps", track.sample_rate);
            println!("  Frames                    {}", track.sample_count);
        }
        MediaType::Image => {
            println!("  Resolution                {}x{}", track.width, track.height);
            println!("  Channels                  {}", track.channels);
            println!("  Bit depth                 {}", track.bit_depth);
        }
        MediaType::Data | MediaType::Unknown => {}
    }

    if !track.duration.is_zero() {
        println!("  Duration                  {}", time_str(track.duration));
    }
    if track.start_offset != 0 {
        println!("  Start offset              {}", track.start_offset);
    }
    if let Some(created) = &track.created {
        println!("  Created                   {created}");
    }
    if let Some(modified) = &track.modified {
        println!("  Modified                  {modified}");
    }
    println!();
}
