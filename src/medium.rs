//! Shared broadcast media connecting physical endpoints.

use std::sync::{Arc, Mutex};

use rand::prelude::*;

use crate::common::*;
use crate::error::SimulatorError;
use crate::layers::physical::{EndpointId, PhysicalLayer};

/// A shared substrate that carries single bits between physical endpoints.
///
/// A transmitted bit is delivered synchronously, on the caller's thread, to
/// every registered endpoint except the sender. Implementations may corrupt
/// individual bits but never reorder them.
pub trait Medium: Send + Sync {
    /// Adds an endpoint to the broadcast set. Re-registering an endpoint is
    /// a no-op.
    fn register(&self, endpoint: Arc<PhysicalLayer>);

    /// Broadcasts one bit from `sender` to every other registered endpoint.
    fn transmit(&self, sender: EndpointId, bit: bool) -> Result<(), SimulatorError>;
}

/// Registered endpoint set shared by the medium implementations.
#[derive(Default)]
pub struct Endpoints {
    inner: Mutex<Vec<Arc<PhysicalLayer>>>,
}

impl Endpoints {
    /// Adds `endpoint` unless an endpoint with the same id is present.
    pub fn register(&self, endpoint: Arc<PhysicalLayer>) {
        let mut endpoints = self.inner.lock().unwrap();

        if endpoints.iter().all(|e| e.id() != endpoint.id()) {
            endpoints.push(endpoint);
        }
    }

    /// Delivers `bit` to every endpoint except `sender`, passing each
    /// delivery through `distort`. The closure runs once per recipient.
    pub fn broadcast(
        &self,
        sender: EndpointId,
        bit: bool,
        mut distort: impl FnMut(bool) -> bool,
    ) -> Result<(), SimulatorError> {
        let endpoints = self.inner.lock().unwrap();

        if endpoints.iter().all(|e| e.id() != sender) {
            return Err(SimulatorError::UnregisteredSender(sender));
        }

        for endpoint in endpoints.iter().filter(|e| e.id() != sender) {
            endpoint.receive(distort(bit));
        }

        Ok(())
    }
}

/// Medium that delivers every bit unchanged.
#[derive(Default)]
pub struct PerfectMedium {
    endpoints: Endpoints,
}

impl Medium for PerfectMedium {
    fn register(&self, endpoint: Arc<PhysicalLayer>) {
        self.endpoints.register(endpoint);
    }

    fn transmit(&self, sender: EndpointId, bit: bool) -> Result<(), SimulatorError> {
        self.endpoints.broadcast(sender, bit, |bit| bit)
    }
}

/// Medium that independently flips each delivered bit with a fixed
/// probability. The coin is re-rolled per recipient, so one transmission may
/// arrive flipped at one endpoint and intact at another.
pub struct LowNoiseMedium {
    endpoints: Endpoints,
    flip_probability: f64,
}

impl LowNoiseMedium {
    /// Creates a medium with the stock flip probability.
    pub fn new() -> Self {
        Self::with_flip_probability(LOW_NOISE_FLIP_P)
    }

    /// Creates a medium with a caller-chosen flip probability, for noise
    /// sweeps.
    pub fn with_flip_probability(flip_probability: f64) -> Self {
        Self {
            endpoints: Endpoints::default(),
            flip_probability,
        }
    }
}

impl Default for LowNoiseMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl Medium for LowNoiseMedium {
    fn register(&self, endpoint: Arc<PhysicalLayer>) {
        self.endpoints.register(endpoint);
    }

    fn transmit(&self, sender: EndpointId, bit: bool) -> Result<(), SimulatorError> {
        self.endpoints.broadcast(sender, bit, |bit| {
            let r: f64 = rand::random();

            if r < self.flip_probability { !bit } else { bit }
        })
    }
}

/// Two-state burst error medium.
///
/// Errors cluster: a good state with a negligible bit error rate and a bad
/// state where flips are frequent. One coin per delivered bit drives both
/// the corruption decision and the state transition.
pub struct BurstNoiseMedium {
    endpoints: Endpoints,
    good: Mutex<bool>,
}

impl Default for BurstNoiseMedium {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            good: Mutex::new(true),
        }
    }
}

impl BurstNoiseMedium {
    /// Creates a burst medium starting in the good state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Medium for BurstNoiseMedium {
    fn register(&self, endpoint: Arc<PhysicalLayer>) {
        self.endpoints.register(endpoint);
    }

    fn transmit(&self, sender: EndpointId, bit: bool) -> Result<(), SimulatorError> {
        let mut state = self.good.lock().unwrap();
        let good = &mut *state;

        self.endpoints.broadcast(sender, bit, |bit| {
            let r: f64 = rand::rng().random();

            let ber = if *good { GOOD_STATE_BER } else { BAD_STATE_BER };
            let flipped = r < ber;

            if *good {
                if r < P_G_TO_B {
                    *good = false;
                }
            } else if r < P_B_TO_G {
                *good = true;
            }

            if flipped { !bit } else { bit }
        })
    }
}

fn perfect() -> Arc<dyn Medium> {
    Arc::new(PerfectMedium::default())
}

fn low_noise() -> Arc<dyn Medium> {
    Arc::new(LowNoiseMedium::new())
}

fn burst_noise() -> Arc<dyn Medium> {
    Arc::new(BurstNoiseMedium::new())
}

static MEDIUM_VARIANTS: &[(&str, fn() -> Arc<dyn Medium>)] = &[
    ("Perfect", perfect),
    ("LowNoise", low_noise),
    ("BurstNoise", burst_noise),
];

/// Constructs a registered medium variant by name.
pub fn medium_by_name(name: &str) -> Result<Arc<dyn Medium>, SimulatorError> {
    MEDIUM_VARIANTS
        .iter()
        .find(|(variant, _)| *variant == name)
        .map(|(_, constructor)| constructor())
        .ok_or_else(|| SimulatorError::UnknownVariant {
            kind: "medium",
            name: name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint_pair(medium: &Arc<dyn Medium>) -> (Arc<PhysicalLayer>, Arc<PhysicalLayer>) {
        (
            PhysicalLayer::new(Arc::clone(medium)),
            PhysicalLayer::new(Arc::clone(medium)),
        )
    }

    #[test_log::test]
    fn perfect_medium_broadcasts_in_order() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let (a, b) = endpoint_pair(&medium);

        let pattern = [true, false, false, true, true];
        for bit in pattern {
            a.send(bit).unwrap();
        }

        for bit in pattern {
            assert_eq!(b.retrieve(), Some(bit));
        }
        assert_eq!(b.retrieve(), None);

        // the sender must not hear itself
        assert_eq!(a.retrieve(), None);
    }

    #[test_log::test]
    fn unregistered_sender_is_rejected() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let other: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let stray = PhysicalLayer::new(Arc::clone(&other));

        let result = medium.transmit(stray.id(), true);
        assert!(matches!(result, Err(SimulatorError::UnregisteredSender(_))));
    }

    #[test_log::test]
    fn registration_is_idempotent() {
        let medium: Arc<dyn Medium> = Arc::new(PerfectMedium::default());
        let (a, b) = endpoint_pair(&medium);

        medium.register(Arc::clone(&a));

        b.send(true).unwrap();

        assert_eq!(a.retrieve(), Some(true));
        assert_eq!(a.retrieve(), None);
    }

    #[test_log::test]
    fn certain_flip_probability_inverts_every_bit() {
        let medium: Arc<dyn Medium> = Arc::new(LowNoiseMedium::with_flip_probability(1.0));
        let (a, b) = endpoint_pair(&medium);

        a.send(true).unwrap();
        a.send(false).unwrap();

        assert_eq!(b.retrieve(), Some(false));
        assert_eq!(b.retrieve(), Some(true));
    }

    #[test_log::test]
    fn zero_flip_probability_is_clean() {
        let medium: Arc<dyn Medium> = Arc::new(LowNoiseMedium::with_flip_probability(0.0));
        let (a, b) = endpoint_pair(&medium);

        for _ in 0..1000 {
            a.send(true).unwrap();
        }

        for _ in 0..1000 {
            assert_eq!(b.retrieve(), Some(true));
        }
    }

    #[test_log::test]
    fn burst_medium_delivers_every_bit() {
        let medium: Arc<dyn Medium> = Arc::new(BurstNoiseMedium::new());
        let (a, b) = endpoint_pair(&medium);

        for _ in 0..500 {
            a.send(false).unwrap();
        }

        let mut delivered = 0;
        while b.retrieve().is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, 500);
    }

    #[test_log::test]
    fn unknown_medium_name_is_fatal() {
        let result = medium_by_name("Telepathy");
        assert!(matches!(
            result,
            Err(SimulatorError::UnknownVariant { kind: "medium", .. })
        ));
    }
}
