use anyhow::Context;
use clap::{Parser, Subcommand};
use image_compressor::convert::Converter;
use image_compressor::imaging::{Bounds, FormatChoice, Quality, RustBackend, supported_input_formats};
use image_compressor::presets::SizePreset;
use image_compressor::process::{BatchOptions, process_files};
use image_compressor::{config, logging, output, probe, server};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "image-compressor")]
#[command(about = "Upload an image, get it back upright, resized and re-encoded")]
#[command(long_about = "\
Upload an image, get it back upright, resized and re-encoded

Every image goes through the same pipeline, whether it arrives over HTTP or
from the command line:

  decode      buffer → temp file → external converter (HEIC via sips/magick)
  rotate      EXIF orientation applied to the pixels
  resize      fit inside max width/height (never upscaled by default)
  encode      PNG/alpha → WebP, everything else → JPEG (or --format)

Run 'image-compressor gen-config' to generate a documented compressor.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = "compressor.toml", global = true)]
    config: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and browser client
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides config and API_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Compress local files with the same pipeline the server uses
    Compress(CompressArgs),
    /// Try buffer and path decoding on a file and report both
    Probe {
        file: PathBuf,
    },
    /// List supported input/output formats and the conversion tool
    Formats,
    /// Print a stock compressor.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct CompressArgs {
    /// Images to compress
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Quality 1-100 (default from config)
    #[arg(short, long)]
    quality: Option<u32>,

    /// Size preset, applied to both width and height
    #[arg(short, long, value_enum, default_value_t = SizePreset::Large)]
    size: SizePreset,

    /// Max width in pixels (overrides --size)
    #[arg(long)]
    max_width: Option<u32>,

    /// Max height in pixels (overrides --size)
    #[arg(long)]
    max_height: Option<u32>,

    /// Output format: auto, jpeg, webp, png, avif
    #[arg(short, long, default_value = "auto")]
    format: String,

    /// Write outputs here instead of next to each input
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
}

impl CompressArgs {
    fn bounds(&self) -> Bounds {
        if self.max_width.is_none() && self.max_height.is_none() {
            return self.size.bounds();
        }
        Bounds::new(
            self.max_width.unwrap_or(0),
            self.max_height.unwrap_or(0),
        )
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    match cli.command {
        Command::Serve { host, port } => {
            let mut config = load_config(&cli.config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&config))?;
        }
        Command::Compress(args) => {
            let config = load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let converter = config.detect_converter();
            let options = BatchOptions {
                quality: args
                    .quality
                    .map(Quality::new)
                    .unwrap_or_else(|| config.default_quality()),
                bounds: args.bounds(),
                format: FormatChoice::parse(&args.format),
                out_dir: args.out_dir.clone(),
            };

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_process_event(&event);
                }
            });
            let summary = process_files(
                &RustBackend::new(),
                &converter,
                &config.compress_settings(),
                &args.files,
                &options,
                Some(tx),
            );
            printer
                .join()
                .map_err(|_| anyhow::anyhow!("output thread panicked"))?;

            println!();
            println!("{}", output::format_batch_summary(&summary));
            if summary.failed > 0 {
                anyhow::bail!("{} file(s) could not be compressed", summary.failed);
            }
        }
        Command::Probe { file } => {
            let config = load_config(&cli.config)?;
            let converter = config.detect_converter();
            let report = probe::probe(&RustBackend::new(), &converter, &file)
                .with_context(|| format!("reading {}", file.display()))?;
            output::print_probe_report(&report);
        }
        Command::Formats => {
            let config = load_config(&cli.config)?;
            let converter = config.detect_converter();
            output::print_formats(supported_input_formats(), converter.tool());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<config::AppConfig> {
    config::load_config(path).with_context(|| format!("loading {}", path.display()))
}

/// Initialize the rayon thread pool based on processing config.
///
/// Never exceeds the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
