use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use crate::error::SimulatorError;
use crate::medium::Medium;

static NEXT_ENDPOINT_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-wide unique identity of a physical endpoint on a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(usize);

/// Bit-level endpoint of one host.
///
/// Outbound bits go straight to the medium; inbound bits land in a
/// thread-safe queue. Any transmitting host's thread may push into the
/// queue, only the owning link layer's event loop pops from it.
pub struct PhysicalLayer {
    id: EndpointId,
    medium: Arc<dyn Medium>,
    bits: StdMutex<VecDeque<bool>>,
    claimed: AtomicBool,
}

impl PhysicalLayer {
    /// Creates an endpoint and registers it on `medium`.
    pub fn new(medium: Arc<dyn Medium>) -> Arc<Self> {
        let layer = Arc::new(Self {
            id: EndpointId(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed)),
            medium: Arc::clone(&medium),
            bits: StdMutex::new(VecDeque::new()),
            claimed: AtomicBool::new(false),
        });

        medium.register(Arc::clone(&layer));
        layer
    }

    /// This endpoint's identity on the medium.
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Transmits one bit onto the medium.
    pub fn send(&self, bit: bool) -> Result<(), SimulatorError> {
        self.medium.transmit(self.id, bit)
    }

    /// Called by the medium to deliver one inbound bit.
    pub fn receive(&self, bit: bool) {
        self.bits.lock().unwrap().push_back(bit);
    }

    /// Pops the oldest pending inbound bit, if any.
    pub fn retrieve(&self) -> Option<bool> {
        self.bits.lock().unwrap().pop_front()
    }

    /// Claims this endpoint for a single link layer client.
    pub fn attach_link(&self) -> Result<(), SimulatorError> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            Err(SimulatorError::DoubleRegistration)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::PerfectMedium;

    #[test_log::test]
    fn retrieve_on_empty_queue_is_none() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let layer = PhysicalLayer::new(medium);

        assert_eq!(layer.retrieve(), None);
    }

    #[test_log::test]
    fn bits_are_retrieved_in_fifo_order() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let layer = PhysicalLayer::new(medium);

        layer.receive(true);
        layer.receive(false);
        layer.receive(true);

        assert_eq!(layer.retrieve(), Some(true));
        assert_eq!(layer.retrieve(), Some(false));
        assert_eq!(layer.retrieve(), Some(true));
        assert_eq!(layer.retrieve(), None);
    }

    #[test_log::test]
    fn second_link_attachment_is_rejected() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let layer = PhysicalLayer::new(medium);

        layer.attach_link().unwrap();

        assert!(matches!(
            layer.attach_link(),
            Err(SimulatorError::DoubleRegistration)
        ));
    }

    #[test_log::test]
    fn send_reaches_the_peer_endpoint() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let a = PhysicalLayer::new(Arc::clone(&medium));
        let b = PhysicalLayer::new(Arc::clone(&medium));

        a.send(true).unwrap();

        assert_eq!(b.retrieve(), Some(true));
        assert_eq!(a.retrieve(), None);
    }
}
