//! A host: one physical endpoint, one link layer, one event loop thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::error::SimulatorError;
use crate::layers::link::{self, LinkLayer, LinkStatsSnapshot};
use crate::layers::physical::PhysicalLayer;
use crate::medium::Medium;

/// One endpoint of the simulation.
///
/// Owns the application-side buffers and the event loop thread; the link
/// layer moves onto that thread when [`Host::run`] is called.
pub struct Host {
    link: Option<LinkLayer>,
    send_buffer: Arc<StdMutex<VecDeque<u8>>>,
    delivered: Arc<StdMutex<Vec<u8>>>,
    stats: Arc<link::LinkStats>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Host {
    /// Creates a host on `medium` with the named link layer variant.
    pub fn connect(medium: &Arc<dyn Medium>, link_variant: &str) -> Result<Self, SimulatorError> {
        let physical = PhysicalLayer::new(Arc::clone(medium));
        let protocol = link::protocol_by_name(link_variant)?;
        let stats = protocol.stats();

        let send_buffer = Arc::new(StdMutex::new(VecDeque::new()));
        let delivered = Arc::new(StdMutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let link = LinkLayer::new(
            physical,
            protocol,
            Arc::clone(&send_buffer),
            Arc::clone(&delivered),
            Arc::clone(&stop),
        )?;

        Ok(Self {
            link: Some(link),
            send_buffer,
            delivered,
            stats,
            stop,
            thread: None,
        })
    }

    /// Starts the event loop on its own thread.
    pub fn run(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        self.thread = Some(thread::spawn(move || {
            if let Err(err) = link.run() {
                error!(error = %err, "event loop aborted");
            }
        }));
    }

    /// Queues application bytes for transmission to the peer.
    pub fn send(&self, bytes: &[u8]) {
        self.send_buffer.lock().unwrap().extend(bytes);
    }

    /// Drains and returns the bytes delivered so far.
    pub fn retrieve(&self) -> Vec<u8> {
        std::mem::take(&mut *self.delivered.lock().unwrap())
    }

    /// Number of delivered bytes not yet retrieved.
    pub fn delivered_len(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    /// Snapshot of the link layer's transfer counters.
    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the event loop and joins its thread. In-flight frames are
    /// abandoned; there is no graceful drain.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::PerfectMedium;

    #[test_log::test]
    fn stop_terminates_the_event_loop() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let mut host = Host::connect(&medium, "PAR").unwrap();

        host.run();
        host.stop();

        assert!(host.thread.is_none());
    }

    #[test_log::test]
    fn retrieve_drains_the_application_buffer() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let host = Host::connect(&medium, "PAR").unwrap();

        host.delivered.lock().unwrap().extend_from_slice(b"abc");

        assert_eq!(host.delivered_len(), 3);
        assert_eq!(host.retrieve(), b"abc");
        assert_eq!(host.delivered_len(), 0);
    }
}
