use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;
use par_sim::simulation;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Simultaneous link layer transfers in both directions between two
/// simulated hosts.
#[derive(Parser)]
#[command(name = "two-way-simulator")]
struct Args {
    /// Medium variant (Perfect, LowNoise, BurstNoise)
    medium: String,

    /// Data link layer variant (PAR)
    link_layer: String,

    /// File whose contents host A transmits to host B
    payload_a: PathBuf,

    /// File whose contents host B transmits to host A
    payload_b: PathBuf,
}

fn direction_report(label: &str, sent: &[u8], delivered: &[u8]) -> bool {
    if delivered == sent {
        println!("{label}: match ({} bytes)", sent.len());
        true
    } else {
        println!(
            "{label}: MISMATCH (sent {} bytes, delivered {})",
            sent.len(),
            delivered.len(),
        );
        false
    }
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

    let payload_a = match simulation::load_payload(&args.payload_a) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let payload_b = match simulation::load_payload(&args.payload_b) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let report = match simulation::simulate_two_way(
        &args.medium,
        &args.link_layer,
        &payload_a,
        &payload_b,
    ) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let a_to_b = direction_report("A -> B", &payload_a, &report.delivered_at_b);
    let b_to_a = direction_report("B -> A", &payload_b, &report.delivered_at_a);

    if a_to_b && b_to_a {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
