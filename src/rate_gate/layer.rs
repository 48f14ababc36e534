use std::sync::Arc;

use tower::Layer;

use super::{RateGate, service::RateGateService};

/// Gates every request of the wrapped service through a shared [`RateGate`].
///
/// All services produced by one layer (and all their clones) draw from the same pace and
/// the same per-minute quota.
#[derive(Clone, Debug)]
pub struct RateGateLayer {
    gate: Arc<RateGate>,
}

impl RateGateLayer {
    pub fn new(gate: Arc<RateGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for RateGateLayer {
    type Service = RateGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateGateService::new(inner, Arc::clone(&self.gate))
    }
}
