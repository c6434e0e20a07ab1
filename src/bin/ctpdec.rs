//! ctpdec - decode raw trigger-link packet files
//!
//! Usage:
//!   ctpdec decode <file>                    - Decode and print a summary
//!   ctpdec decode <file> --digits out.json  - Also dump digits as JSON
//!   ctpdec info <file>                      - Show container metadata
//!   ctpdec validate <file>                  - Check container integrity

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ctpdec_rs::config::Config;
use ctpdec_rs::decoder::RawDataDecoder;
use ctpdec_rs::rawfile::RawFileReader;

#[derive(Parser)]
#[command(name = "ctpdec")]
#[command(about = "Decoder for raw trigger-link packet files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a packet file and print a summary
    Decode {
        /// Path to the packet file
        file: PathBuf,

        /// Configuration file (timing offsets, luminosity patterns)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write decoded digits to a JSON file
        #[arg(long)]
        digits: Option<PathBuf>,

        /// Write luminosity samples to a JSON file
        #[arg(long)]
        lumi: Option<PathBuf>,
    },

    /// Show container metadata
    Info {
        /// Path to the packet file
        file: PathBuf,
    },

    /// Check container integrity
    Validate {
        /// Path to the packet file
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ctpdec_rs=info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode {
            file,
            config,
            digits,
            lumi,
        } => decode_file(&file, config.as_deref(), digits.as_deref(), lumi.as_deref()),
        Commands::Info { file } => show_info(&file),
        Commands::Validate { file } => validate_file(&file),
    }
}

fn open_reader(path: &Path) -> anyhow::Result<RawFileReader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(RawFileReader::new(BufReader::new(file))?)
}

fn decode_file(
    path: &Path,
    config: Option<&Path>,
    digits_out: Option<&Path>,
    lumi_out: Option<&Path>,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut reader = open_reader(path)?;
    let packets = reader.read_all()?;

    let decoder = RawDataDecoder::new(config);
    let decoded = decoder.decode(packets)?;

    println!("Decoded: {}", path.display());
    println!("  Packets:         {}", decoded.stats.packets);
    println!("  Words:           {}", decoded.stats.words);
    println!("  Chunks:          {}", decoded.stats.chunks);
    println!("  Digits:          {}", decoded.digits.len());
    println!("  Lumi samples:    {}", decoded.lumi.len());
    println!("  Timeframes:      {}", decoded.tf_orbits.len());
    if decoded.stats.int_rec_rejected + decoded.stats.class_rec_rejected > 0 {
        println!(
            "  Rejected chunks: {} input, {} class",
            decoded.stats.int_rec_rejected, decoded.stats.class_rec_rejected
        );
    }
    if decoded.stats.duplicate_contributions > 0 {
        println!(
            "  Duplicates:      {}",
            decoded.stats.duplicate_contributions
        );
    }
    if decoded.stats.unknown_links > 0 {
        println!("  Unknown links:   {}", decoded.stats.unknown_links);
    }

    if let Some(out) = digits_out {
        let digits: Vec<_> = decoded.digits.values().collect();
        std::fs::write(out, serde_json::to_vec_pretty(&digits)?)?;
        println!("  Digits written:  {}", out.display());
    }
    if let Some(out) = lumi_out {
        std::fs::write(out, serde_json::to_vec_pretty(&decoded.lumi)?)?;
        println!("  Lumi written:    {}", out.display());
    }
    Ok(())
}

fn show_info(path: &Path) -> anyhow::Result<()> {
    let mut reader = open_reader(path)?;

    println!("File: {}", path.display());
    println!("Size: {} bytes", std::fs::metadata(path)?.len());
    println!();

    let header = reader.header();
    println!("=== Header ===");
    println!("  Version:     {}", header.version);
    println!("  Run Number:  {}", header.run_number);
    println!("  Comment:     {}", header.comment);
    println!(
        "  Start Time:  {} (unix timestamp)",
        header.file_start_time_ns / 1_000_000_000
    );
    if !header.metadata.is_empty() {
        println!("  Metadata:    {:?}", header.metadata);
    }

    println!();
    match reader.read_footer() {
        Ok(footer) => {
            println!("=== Footer ===");
            println!("  Complete:    {}", footer.is_complete());
            println!("  Packets:     {}", footer.total_packets);
            println!("  Data Bytes:  {}", footer.data_bytes);
            println!("  Checksum:    {:016x}", footer.data_checksum);
            println!(
                "  Orbit Range: {} - {}",
                footer.first_orbit, footer.last_orbit
            );
            println!(
                "  End Time:    {} (unix timestamp)",
                footer.file_end_time_ns / 1_000_000_000
            );
        }
        Err(e) => {
            println!("=== Footer ===");
            println!("  Could not read footer: {e}");
        }
    }
    Ok(())
}

fn validate_file(path: &Path) -> anyhow::Result<()> {
    println!("Validating: {}", path.display());
    println!();

    let mut reader = open_reader(path)?;
    let result = reader.validate();

    println!("=== Validation Result ===");
    println!("  Valid:               {}", result.is_valid);
    println!("  Recoverable packets: {}", result.recoverable_packets);
    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {error}");
        }
    }

    if result.is_valid {
        println!("\n\x1b[32m✓ File is valid\x1b[0m");
        Ok(())
    } else {
        println!("\n\x1b[31m✗ File is invalid\x1b[0m");
        std::process::exit(1);
    }
}
