use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        "\nmediaprobe ", env!("MEDIAPROBE_VERSION"),
        "\nbuilt ", env!("BUILD_TIMESTAMP"),
    ),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting FLAC, RIFF, MXF, JPEG and PNG record streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print container and track information
    Info(InfoArgs),

    /// List the records of a container
    Nodes(NodesArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    pub output: OutputFormat,

    /// Ignore the registry and version bytes when matching MXF labels.
    #[arg(long)]
    pub lenient_labels: bool,
}

#[derive(Debug, Args)]
pub struct NodesArgs {
    /// Input file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Start offset, defaults to the first record.
    #[arg(long, value_name = "BYTES")]
    pub offset: Option<u64>,

    /// Only list records starting within this many bytes of the start.
    #[arg(long, value_name = "BYTES")]
    pub budget: Option<u64>,

    /// Only list records with this FourCC, or identifier prefix given as
    /// hex with a 0x prefix. Repeatable.
    #[arg(long, value_name = "ID")]
    pub id: Vec<String>,

    /// Stop after this many records.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Ignore the registry and version bytes when matching MXF labels.
    #[arg(long)]
    pub lenient_labels: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    /// Aligned text.
    Plain,
    /// YAML document.
    Yaml,
}

impl Cli {
    /// Reader settings for the global flags.
    pub fn reader_options(&self, lenient_labels: bool) -> mediaprobe::ReaderOptions {
        let mut options = if self.strict {
            mediaprobe::ReaderOptions::strict()
        } else {
            mediaprobe::ReaderOptions::default()
        };

        if lenient_labels {
            options.label_match = mediaprobe::structs::mxf::label::LabelMatch::LENIENT;
        }

        options
    }
}
