//! Simulation drivers: construct two hosts on one medium, move payloads,
//! report outcomes.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::SimulatorError;
use crate::host::Host;
use crate::layers::link::LinkStatsSnapshot;
use crate::medium::{Medium, medium_by_name};

/// Largest payload file loaded into memory.
pub static MAX_PAYLOAD_BYTES: u64 = 1 << 31;

/// Settle pause of the two-way driver before both sides are read.
pub static SETTLE_PAUSE: Duration = Duration::from_secs(5);

static DELIVERY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Base waiting budget for a one-way transfer.
static BASE_DEADLINE: Duration = Duration::from_secs(5);

/// Extra waiting budget per payload byte, generous enough for noisy media.
static PER_BYTE_BUDGET: Duration = Duration::from_millis(2);

/// Outcome of a one-way exchange.
#[derive(Debug)]
pub struct ExchangeReport {
    /// Bytes the receiving host handed to its application.
    pub delivered: Vec<u8>,
    /// Transfer counters of the transmitting host.
    pub sender: LinkStatsSnapshot,
    /// Transfer counters of the receiving host.
    pub receiver: LinkStatsSnapshot,
    /// Wall-clock duration of the transfer.
    pub elapsed: Duration,
}

/// Outcome of a simultaneous two-way exchange.
#[derive(Debug)]
pub struct TwoWayReport {
    /// Bytes delivered to host A (sent by host B).
    pub delivered_at_a: Vec<u8>,
    /// Bytes delivered to host B (sent by host A).
    pub delivered_at_b: Vec<u8>,
    /// Transfer counters of host A.
    pub stats_a: LinkStatsSnapshot,
    /// Transfer counters of host B.
    pub stats_b: LinkStatsSnapshot,
}

/// Reads a payload file entirely into memory.
pub fn load_payload(path: &Path) -> Result<Vec<u8>, SimulatorError> {
    let metadata = fs::metadata(path).map_err(|source| SimulatorError::PayloadIo {
        path: path.to_owned(),
        source,
    })?;

    if metadata.len() > MAX_PAYLOAD_BYTES {
        return Err(SimulatorError::PayloadTooLarge {
            path: path.to_owned(),
            max_bytes: MAX_PAYLOAD_BYTES,
        });
    }

    fs::read(path).map_err(|source| SimulatorError::PayloadIo {
        path: path.to_owned(),
        source,
    })
}

/// Polls the receiving host until `expected` bytes were delivered or the
/// deadline passes.
fn wait_for_delivery(host: &Host, expected: usize, deadline: Duration) -> bool {
    let giving_up = Instant::now() + deadline;

    while host.delivered_len() < expected {
        if Instant::now() >= giving_up {
            return false;
        }
        thread::sleep(DELIVERY_POLL_INTERVAL);
    }

    true
}

fn transfer_deadline(payload_len: usize) -> Duration {
    BASE_DEADLINE + PER_BYTE_BUDGET * payload_len as u32
}

/// Transfers `payload` between two fresh hosts sharing `medium`.
pub fn run_exchange(
    medium: Arc<dyn Medium>,
    link_variant: &str,
    payload: &[u8],
) -> Result<ExchangeReport, SimulatorError> {
    let mut sender_host = Host::connect(&medium, link_variant)?;
    let mut receiver_host = Host::connect(&medium, link_variant)?;

    sender_host.send(payload);

    let started = Instant::now();
    sender_host.run();
    receiver_host.run();

    let complete = wait_for_delivery(&receiver_host, payload.len(), transfer_deadline(payload.len()));
    let elapsed = started.elapsed();

    if !complete {
        warn!(
            delivered = receiver_host.delivered_len(),
            expected = payload.len(),
            "transfer did not complete before the deadline"
        );
    }

    sender_host.stop();
    receiver_host.stop();

    Ok(ExchangeReport {
        delivered: receiver_host.retrieve(),
        sender: sender_host.stats(),
        receiver: receiver_host.stats(),
        elapsed,
    })
}

/// One-way transfer with the medium chosen by name.
pub fn simulate_one_way(
    medium_name: &str,
    link_variant: &str,
    payload: &[u8],
) -> Result<ExchangeReport, SimulatorError> {
    let medium = medium_by_name(medium_name)?;
    let report = run_exchange(medium, link_variant, payload)?;

    info!(
        bytes = report.delivered.len(),
        frames = report.sender.frames_sent,
        retransmissions = report.sender.retransmissions,
        damaged = report.receiver.damaged_frames,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "one-way transfer finished"
    );

    Ok(report)
}

/// Simultaneous transfers in both directions. Pauses for [`SETTLE_PAUSE`]
/// before reading the delivered bytes on either side.
pub fn simulate_two_way(
    medium_name: &str,
    link_variant: &str,
    payload_a: &[u8],
    payload_b: &[u8],
) -> Result<TwoWayReport, SimulatorError> {
    let medium = medium_by_name(medium_name)?;

    let mut host_a = Host::connect(&medium, link_variant)?;
    let mut host_b = Host::connect(&medium, link_variant)?;

    host_a.send(payload_a);
    host_b.send(payload_b);

    host_a.run();
    host_b.run();

    thread::sleep(SETTLE_PAUSE);

    host_a.stop();
    host_b.stop();

    let report = TwoWayReport {
        delivered_at_a: host_a.retrieve(),
        delivered_at_b: host_b.retrieve(),
        stats_a: host_a.stats(),
        stats_b: host_b.stats(),
    };

    info!(
        a_to_b = report.delivered_at_b.len(),
        b_to_a = report.delivered_at_a.len(),
        "two-way transfer finished"
    );

    Ok(report)
}
