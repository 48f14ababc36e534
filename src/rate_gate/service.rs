use std::{
    fmt,
    sync::Arc,
    task::{Context, Poll},
};

use futures::future::BoxFuture;
use tower::Service;

use super::RateGate;
use crate::Error as CrateError;

/// A [`Service`] that awaits admission from a [`RateGate`] before forwarding each request.
///
/// Readiness is the inner service's readiness; the gate wait happens inside the response
/// future, so a request that is never polled never consumes quota.
#[derive(Clone)]
pub struct RateGateService<S> {
    inner: S,
    gate: Arc<RateGate>,
}

impl<S> RateGateService<S> {
    pub fn new(inner: S, gate: Arc<RateGate>) -> Self {
        Self { inner, gate }
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: fmt::Debug> fmt::Debug for RateGateService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGateService")
            .field("inner", &self.inner)
            .field("gate", &self.gate.identifier())
            .finish()
    }
}

impl<S, Request> Service<Request> for RateGateService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<CrateError>,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = CrateError;
    type Future = BoxFuture<'static, Result<S::Response, CrateError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The instance that was driven to readiness is the one that must serve the request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = Arc::clone(&self.gate);

        Box::pin(async move {
            gate.admit().await?;
            inner.call(request).await.map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;
    use tokio_test::{assert_pending, assert_ready_ok, task};
    use tower_test::{assert_request_eq, mock};

    use super::*;
    use crate::rate_gate::{RateGateError, RateGateLayer, RoundingMode};

    #[tokio::test(start_paused = true)]
    async fn requests_are_paced() {
        let gate = Arc::new(RateGate::new("service", 600, RoundingMode::Hasty, false));
        let (mut svc, mut handle) = mock::spawn_layer(RateGateLayer::new(Arc::clone(&gate)));

        assert_ready_ok!(svc.poll_ready());
        let mut first = task::spawn(svc.call("first"));
        assert_pending!(first.poll());
        assert_request_eq!(handle, "first").send_response("one");
        assert_eq!(first.await.unwrap(), "one");

        assert_ready_ok!(svc.poll_ready());
        let mut second = task::spawn(svc.call("second"));
        assert_pending!(second.poll());

        time::advance(Duration::from_millis(50)).await;
        assert_pending!(second.poll());

        time::advance(Duration::from_millis(60)).await;
        assert_pending!(second.poll());
        assert_request_eq!(handle, "second").send_response("two");
        assert_eq!(second.await.unwrap(), "two");

        assert_eq!(gate.admitted_this_period(), 2);
    }

    #[tokio::test]
    async fn closed_gate_fails_requests() {
        let gate = Arc::new(RateGate::new("closed", 600, RoundingMode::Hasty, false));
        gate.shutdown().await;
        let (mut svc, _handle) = mock::spawn_layer::<&'static str, &'static str, _>(
            RateGateLayer::new(Arc::clone(&gate)),
        );

        assert_ready_ok!(svc.poll_ready());
        let err = svc.call("dropped").await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<RateGateError>(),
            Some(&RateGateError::Closed {
                identifier: "closed".to_owned()
            })
        );
    }
}
