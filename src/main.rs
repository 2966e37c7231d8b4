use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;
use par_sim::simulation;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One-way link layer transfer between two simulated hosts.
#[derive(Parser)]
#[command(name = "simulator")]
struct Args {
    /// Medium variant (Perfect, LowNoise, BurstNoise)
    medium: String,

    /// Data link layer variant (PAR)
    link_layer: String,

    /// File whose contents are transmitted from host A to host B
    payload: PathBuf,
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

    let payload = match simulation::load_payload(&args.payload) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let report = match simulation::simulate_one_way(&args.medium, &args.link_layer, &payload) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "{} frames, {} retransmissions, {} damaged frames, {:.3}s",
        report.sender.frames_sent,
        report.sender.retransmissions,
        report.receiver.damaged_frames,
        report.elapsed.as_secs_f64(),
    );

    if report.delivered == payload {
        println!("A -> B: match ({} bytes)", payload.len());
        ExitCode::SUCCESS
    } else {
        println!(
            "A -> B: MISMATCH (sent {} bytes, delivered {})",
            payload.len(),
            report.delivered.len(),
        );
        ExitCode::FAILURE
    }
}
