use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mediaprobe::RecordReader;
use mediaprobe::process::NodeFilter;
use mediaprobe::structs::node::FourCC;

use super::command::{Cli, NodesArgs};
use crate::input::InputReader;

pub fn cmd_nodes(args: &NodesArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let filters = args
        .id
        .iter()
        .map(|id| parse_filter(id))
        .collect::<Result<Vec<_>>>()?;

    let input = InputReader::new(&args.input)?;
    let mut reader = mediaprobe::open(input, cli.reader_options(args.lenient_labels))?;
    log::info!(
        "Listing {} records of {}",
        reader.format(),
        args.input.display()
    );

    let offset = args
        .offset
        .unwrap_or_else(|| reader.first_record_offset());
    let budget = args.budget.unwrap_or(u64::MAX);
    let limit = args.limit.unwrap_or(usize::MAX);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} records {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    let mut listed = 0usize;
    for node in reader.read_records(offset, budget, &filters).take(limit) {
        let node = match node {
            Ok(node) => node,
            Err(e) => {
                if let Some(ref pb) = pb {
                    pb.finish_and_clear();
                }
                if cli.strict {
                    return Err(e);
                }
                log::warn!("Stopped after {listed} records: {e}");
                return Ok(());
            }
        };

        listed += 1;
        match pb {
            Some(ref pb) => {
                pb.inc(1);
                pb.suspend(|| println!("{node}"));
            }
            None => println!("{node}"),
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    log::info!("Listed {listed} records");

    Ok(())
}

/// `0x`-prefixed hex becomes an identifier prefix, anything else a FourCC.
fn parse_filter(id: &str) -> Result<NodeFilter> {
    let Some(hex) = id.strip_prefix("0x") else {
        return id
            .parse::<FourCC>()
            .map(NodeFilter::FourCC)
            .map_err(|e| anyhow!(e));
    };

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|byte| u8::from_str_radix(byte, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()
        .filter(|bytes| !bytes.is_empty())
        .map(NodeFilter::Prefix)
        .ok_or_else(|| anyhow!("'{id}' is not a hex identifier prefix"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters() {
        assert_eq!(
            parse_filter("fmt").unwrap(),
            NodeFilter::FourCC(FourCC::new(b"fmt "))
        );
        assert_eq!(
            parse_filter("0xFFE1").unwrap(),
            NodeFilter::Prefix(vec![0xFF, 0xE1])
        );
        assert_eq!(
            parse_filter("0x060e2b34").unwrap(),
            NodeFilter::Prefix(vec![0x06, 0x0E, 0x2B, 0x34])
        );
        assert!(parse_filter("0xABC").is_err());
        assert!(parse_filter("0x").is_err());
        assert!(parse_filter("toolong").is_err());
    }
}
