//! Emulator binary - writes a synthetic raw packet file
//!
//! Generates a random digit set, encodes it into link packets and stores
//! them in the container format, so the decoder can be exercised without
//! hardware.
//!
//! Usage:
//!   cargo run --bin emulator -- out.ctpraw
//!   cargo run --bin emulator -- out.ctpraw --orbits 32 --mean-digits 20
//!   cargo run --bin emulator -- out.ctpraw --seed 7 --padded

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ctpdec_rs::common::constants::BCS_PER_ORBIT;
use ctpdec_rs::common::{Digit, InteractionRecord};
use ctpdec_rs::config::Config;
use ctpdec_rs::raw::RawEncoder;
use ctpdec_rs::rawfile::{FileHeader, RawFileWriter};

#[derive(Parser, Debug)]
#[command(name = "emulator", about = "Synthetic raw packet file generator")]
struct Args {
    /// Output file path
    output: PathBuf,

    /// Configuration file (timing offsets)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of orbits to populate
    #[arg(long, default_value_t = 16)]
    orbits: u32,

    /// First populated orbit
    #[arg(long, default_value_t = 1)]
    start_orbit: u32,

    /// Mean digits per orbit (Poisson)
    #[arg(long, default_value_t = 10.0)]
    mean_digits: f64,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Use padded 16-byte word framing
    #[arg(long)]
    padded: bool,

    /// Run number written into the file header
    #[arg(long, default_value_t = 0)]
    run_number: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ctpdec_rs=info".parse()?))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let digits = generate_digits(
        args.seed,
        args.start_orbit,
        args.orbits,
        args.mean_digits,
    )?;
    info!(digits = digits.len(), seed = args.seed, "digit set generated");

    let encoder = RawEncoder::new(config.offsets.clone(), args.padded);
    let packets = encoder.encode(digits.values());

    let mut header = FileHeader::new(args.run_number);
    header.comment = format!(
        "emulated: {} orbits from {}, seed {}",
        args.orbits, args.start_orbit, args.seed
    );

    let file = File::create(&args.output)?;
    let mut writer = RawFileWriter::new(BufWriter::new(file), &header)?;
    for packet in &packets {
        writer.write_packet(packet)?;
    }
    writer.finish()?;

    info!(
        packets = packets.len(),
        output = %args.output.display(),
        "raw packet file written"
    );
    Ok(())
}

/// Random digit set: per orbit a Poisson-distributed number of records,
/// each with a nonzero input mask and, half the time, a class mask.
fn generate_digits(
    seed: u64,
    start_orbit: u32,
    orbits: u32,
    mean: f64,
) -> anyhow::Result<BTreeMap<InteractionRecord, Digit>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let poisson = Poisson::new(mean.max(f64::MIN_POSITIVE))?;
    let mut digits = BTreeMap::new();

    for orbit in start_orbit..start_orbit + orbits {
        let count = poisson.sample(&mut rng) as u64;
        for _ in 0..count {
            let record = InteractionRecord::new(rng.gen_range(0..BCS_PER_ORBIT), orbit);
            let mut digit = Digit::new(record);
            // Keep within the 48 input bits; bias bit 2 (TVX) so the
            // luminosity counters see traffic
            digit.input_mask = (rng.gen::<u64>() & 0xffff_ffff_ffff) | 0x4;
            if rng.gen_bool(0.5) {
                digit.class_mask = rng.gen::<u64>() | 1;
            }
            digits.insert(record, digit);
        }
    }
    Ok(digits)
}
