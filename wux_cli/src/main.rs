mod logging;

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use wux_core::format::DEFAULT_SECTOR_SIZE;
use wux_core::verify::validate_with_progress;
use wux_core::{decode, validate, Encoder, EncoderOptions, Media, Progress};
use wux_digests::digest_by_name;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "wux",
    about = "Lossless sector-dedup compression for fixed-block disk images (.wud ⇄ .wux)",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors and hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a raw image or decompress a container, picked by sniffing the input
    ///
    /// The output path swaps the extension (.wud ⇄ .wux) unless given.
    /// Existing files are never overwritten.
    Convert {
        /// Raw image or WUX container
        input: PathBuf,
        /// Destination (default: input with the opposite extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the byte-for-byte validation step at the end
        #[arg(long)]
        no_verify: bool,
        #[command(flatten)]
        encode: EncodeArgs,
    },
    /// Compress an image into a WUX container
    Compress {
        /// Source image
        input: PathBuf,
        /// Destination WUX file
        output: PathBuf,
        #[command(flatten)]
        encode: EncodeArgs,
        /// Skip the byte-for-byte validation step at the end
        #[arg(long)]
        no_verify: bool,
        /// Overwrite the destination if it exists
        #[arg(short, long)]
        force: bool,
    },
    /// Expand a WUX container back to a flat image
    Decompress {
        /// Source WUX file
        input: PathBuf,
        /// Destination image
        output: PathBuf,
        /// Skip the byte-for-byte validation step at the end
        #[arg(long)]
        no_verify: bool,
        /// Overwrite the destination if it exists
        #[arg(short, long)]
        force: bool,
    },
    /// Compare the logical contents of two images or containers
    Verify {
        a: PathBuf,
        b: PathBuf,
    },
    /// Print header metadata and dedup statistics
    Inspect {
        file: PathBuf,
        /// Print the logical sector → pool slot mapping
        #[arg(long)]
        table: bool,
    },
}

#[derive(Args)]
struct EncodeArgs {
    /// Sector fingerprint: blake3 | xxh3
    #[arg(short, long, default_value = "blake3")]
    digest: String,
    /// Bytes per sector
    #[arg(short, long, default_value_t = DEFAULT_SECTOR_SIZE)]
    sector_size: u32,
    /// Share slots on fingerprint match without byte-comparing the sectors
    #[arg(long)]
    trust_digest: bool,
}

impl EncodeArgs {
    fn encoder(&self) -> anyhow::Result<Encoder> {
        let digest = digest_by_name(&self.digest)?;
        let options = EncoderOptions::default()
            .sector_size(self.sector_size)
            .verify_matches(!self.trust_digest);
        Ok(Encoder::new(digest, options)?)
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Swap the extension: containers become `.wud`, raw images `.wux`.
fn derive_output_path(input: &Path, is_container: bool) -> PathBuf {
    input.with_extension(if is_container { "wud" } else { "wux" })
}

fn create_output(path: &Path, force: bool) -> anyhow::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).with_context(|| {
        if path.exists() && !force {
            format!("output file {:?} already exists", path)
        } else {
            format!("creating output file {:?}", path)
        }
    })
}

/// `indicatif` bar behind the library's `Progress` trait.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(message: &'static str, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{msg:>12} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(message);
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn update(&mut self, done: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(done);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Validate `output` against `input`, deleting `output` on failure.
fn verify_or_remove(input: &Path, output: &Path, quiet: bool) -> anyhow::Result<()> {
    info!("checking for errors...");
    let mut progress = BarProgress::new("verifying", quiet);
    if validate_with_progress(input, output, &mut progress) {
        info!("validation successful, no errors detected");
        return Ok(());
    }
    progress.bar.abandon();
    if let Err(e) = fs::remove_file(output) {
        warn!("could not remove {:?}: {}", output, e);
    }
    anyhow::bail!("validation failed: {:?} is corrupted and was removed", output)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    mut source: Media,
    input: &Path,
    output: &Path,
    encode: &EncodeArgs,
    force: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let encoder = encode.encoder()?;
    let file = create_output(output, force)?;
    let mut dest = BufWriter::new(file);

    eprintln!("  input       : {}", input.display());
    eprintln!("  output      : {}", output.display());

    let t0 = Instant::now();
    let mut progress = BarProgress::new("compressing", quiet);
    let summary = encoder
        .encode(&mut source, &mut dest, &mut progress)
        .with_context(|| format!("compressing {:?}", input))?;
    dest.into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flushing {:?}", output))?;
    let elapsed = t0.elapsed();

    eprintln!("  digest      : {}", encoder.digest_name());
    eprintln!("  sector size : {}", human_bytes(summary.sector_size as u64));
    eprintln!("  sectors     : {}", summary.entry_count);
    eprintln!("  unique      : {}", summary.unique_sectors);
    eprintln!("  raw size    : {}", human_bytes(summary.uncompressed_size));
    eprintln!("  compressed  : {}", human_bytes(summary.container_size));
    eprintln!("  ratio       : {:.2}x", summary.ratio());
    if summary.rejected_matches > 0 {
        eprintln!("  collisions  : {}", summary.rejected_matches);
    }
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(
    mut source: Media,
    input: &Path,
    output: &Path,
    force: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    if !source.is_container() {
        warn!("{:?} is not a WUX container, copying it as is", input);
    }
    let file = create_output(output, force)?;
    let mut dest = BufWriter::new(file);

    eprintln!("  input       : {}", input.display());
    eprintln!("  output      : {}", output.display());

    let t0 = Instant::now();
    let mut progress = BarProgress::new("expanding", quiet);
    let written = decode(&mut source, &mut dest, &mut progress)
        .with_context(|| format!("decompressing {:?}", input))?;
    let elapsed = t0.elapsed();

    eprintln!("  raw size    : {}", human_bytes(written));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((written as f64 / elapsed.as_secs_f64().max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn open_media(path: &Path) -> anyhow::Result<Media> {
    Media::open(path).with_context(|| format!("unable to open input file {:?}", path))
}

fn run_convert(
    input: PathBuf,
    output: Option<PathBuf>,
    no_verify: bool,
    encode: &EncodeArgs,
    quiet: bool,
) -> anyhow::Result<()> {
    let source = open_media(&input)?;
    let is_container = source.is_container();
    let output = output.unwrap_or_else(|| derive_output_path(&input, is_container));
    if output == input {
        anyhow::bail!("output path {:?} is the same as the input", output);
    }

    if is_container {
        info!("mode: decompress");
        run_decompress(source, &input, &output, false, quiet)?;
    } else {
        info!("mode: compress");
        run_compress(source, &input, &output, encode, false, quiet)?;
    }

    if !no_verify {
        verify_or_remove(&input, &output, quiet)?;
    }
    Ok(())
}

fn run_verify(a: PathBuf, b: PathBuf) -> anyhow::Result<()> {
    if validate(&a, &b) {
        println!("{:?} and {:?} are identical", a, b);
        Ok(())
    } else {
        anyhow::bail!("{:?} and {:?} differ", a, b)
    }
}

fn run_inspect(file: PathBuf, show_table: bool) -> anyhow::Result<()> {
    let media = open_media(&file)?;
    let file_size = fs::metadata(&file)?.len();

    println!("=== {:?} ===", file);
    println!();
    let Some(layout) = media.layout() else {
        println!("  kind           : raw image");
        println!("  size           : {}", human_bytes(media.size()));
        return Ok(());
    };

    let header = layout.header();
    let entries = layout.index_table().len();
    let unique = layout.unique_sectors();
    println!("  kind           : WUX container");
    println!("  raw size       : {}", human_bytes(header.uncompressed_size));
    println!("  sector size    : {}", human_bytes(header.sector_size as u64));
    println!("  sectors        : {}", entries);
    println!("  unique sectors : {}", unique);
    println!("  duplicates     : {}", entries - unique.min(entries));
    println!("  pool offset    : {:#x}", layout.pool_start());
    println!("  pool slots     : {}", layout.pool_slots());
    println!("  file on disk   : {}", human_bytes(file_size));
    println!(
        "  ratio          : {:.2}x",
        header.uncompressed_size as f64 / file_size.max(1) as f64
    );
    println!("  flags          : {:#010x}", header.flags);
    if unique > layout.pool_slots() {
        println!(
            "  WARNING        : index references {} slots but only {} are present",
            unique,
            layout.pool_slots()
        );
    }

    if show_table {
        println!();
        println!("  {:>10}  {:>10}  {:>16}", "sector", "slot", "file offset");
        println!("  {}", "-".repeat(40));
        let sector_size = header.sector_size as u64;
        for (i, &slot) in layout.index_table().as_slice().iter().enumerate() {
            println!(
                "  {:>10}  {:>10}  {:>#16x}",
                i,
                slot,
                layout.pool_start() + slot as u64 * sector_size
            );
        }
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Convert {
            input,
            output,
            no_verify,
            encode,
        } => run_convert(input, output, no_verify, &encode, quiet),
        Commands::Compress {
            input,
            output,
            encode,
            no_verify,
            force,
        } => {
            let source = open_media(&input)?;
            run_compress(source, &input, &output, &encode, force, quiet)?;
            if !no_verify {
                verify_or_remove(&input, &output, quiet)?;
            }
            Ok(())
        }
        Commands::Decompress {
            input,
            output,
            no_verify,
            force,
        } => {
            let source = open_media(&input)?;
            run_decompress(source, &input, &output, force, quiet)?;
            if !no_verify {
                verify_or_remove(&input, &output, quiet)?;
            }
            Ok(())
        }
        Commands::Verify { a, b } => run_verify(a, b),
        Commands::Inspect { file, table } => run_inspect(file, table),
    }
}
