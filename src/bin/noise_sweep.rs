use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use indicatif::ProgressBar;
use par_sim::medium::{LowNoiseMedium, Medium};
use par_sim::simulation::run_exchange;
use rayon::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sweeps the low-noise flip probability and reports per-point transfer
/// statistics.
#[derive(Parser)]
#[command(name = "noise-sweep")]
struct Args {
    /// Payload length per trial, in bytes
    #[arg(long, default_value_t = 4096)]
    payload_len: usize,

    /// Trials per probability
    #[arg(long, default_value_t = 8)]
    trials: u64,

    /// Comma-separated flip probabilities to sweep
    #[arg(long, value_delimiter = ',', default_values_t = [0.0, 1e-4, 5e-4, 1e-3, 2e-3])]
    probabilities: Vec<f64>,
}

struct SweepRow {
    flip_probability: f64,
    retransmissions: u64,
    damaged_frames: u64,
    mismatches: u64,
    elapsed: Duration,
}

fn sweep_point(args: &Args, flip_probability: f64, bar: &ProgressBar) -> SweepRow {
    let payload = vec![0x41u8; args.payload_len];

    let mut row = SweepRow {
        flip_probability,
        retransmissions: 0,
        damaged_frames: 0,
        mismatches: 0,
        elapsed: Duration::ZERO,
    };

    for _ in 0..args.trials {
        let medium: Arc<dyn Medium> =
            Arc::new(LowNoiseMedium::with_flip_probability(flip_probability));

        match run_exchange(medium, "PAR", &payload) {
            Ok(report) => {
                row.retransmissions += report.sender.retransmissions;
                row.damaged_frames += report.receiver.damaged_frames;
                row.elapsed += report.elapsed;
                if report.delivered != payload {
                    row.mismatches += 1;
                }
            }
            Err(err) => {
                eprintln!("{err}");
                row.mismatches += 1;
            }
        }

        bar.inc(1);
    }

    row
}

fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "par_sim=error".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });

    let bar = ProgressBar::new(args.probabilities.len() as u64 * args.trials);

    let rows: Vec<SweepRow> = args
        .probabilities
        .par_iter()
        .map(|&flip_probability| sweep_point(&args, flip_probability, &bar))
        .collect();

    bar.finish_and_clear();

    println!(
        "{:>10} {:>16} {:>10} {:>12} {:>10}",
        "p(flip)", "retransmissions", "damaged", "mismatches", "avg time"
    );

    let mut clean = true;
    for row in rows {
        println!(
            "{:>10} {:>16} {:>10} {:>12} {:>9.3}s",
            row.flip_probability,
            row.retransmissions,
            row.damaged_frames,
            row.mismatches,
            row.elapsed.as_secs_f64() / args.trials as f64,
        );
        clean &= row.mismatches == 0;
    }

    if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
