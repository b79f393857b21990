//! Presentation filter for classified failures.
//!
//! Before a failure crosses a trust boundary, internal retry hints
//! (`Restartable`, `Wrapped`, `Naming`) must be stripped so a downstream
//! caller cannot act on them. [`PresentableFailureLayer`] does this as a
//! tower middleware: classified failures from the inner service are replaced
//! by their [`presentable_form`](crate::FailureValue::presentable_form);
//! every other error passes through untouched.
//!
//! ```rust
//! use rpc_partitioning::filter::PresentableFailureLayer;
//! use tower::ServiceBuilder;
//!
//! let svc = ServiceBuilder::new()
//!     .layer(PresentableFailureLayer)
//!     .service_fn(|_: ()| async { Ok::<_, rpc_partitioning::PartitionError>("pong") });
//! # let _ = svc;
//! ```

use crate::error::PartitionError;
use crate::failure::PresentableForm;
use futures_util::future::{MapErr, TryFutureExt};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Replaces a classified failure with its presentable form.
pub fn present(error: PartitionError) -> PartitionError {
    match error {
        PartitionError::Failure(failure) => match failure.presentable_form() {
            PresentableForm::Failure(shown) => PartitionError::Failure(shown),
            PresentableForm::Foreign { error, type_name } => {
                PartitionError::Foreign { error, type_name }
            }
        },
        other => other,
    }
}

/// Installs [`PresentableFailure`] around a service.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentableFailureLayer;

impl<S> Layer<S> for PresentableFailureLayer {
    type Service = PresentableFailure<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PresentableFailure { inner }
    }
}

#[derive(Debug, Clone)]
pub struct PresentableFailure<S> {
    inner: S,
}

impl<S> PresentableFailure<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, R> Service<R> for PresentableFailure<S>
where
    S: Service<R, Error = PartitionError>,
{
    type Response = S::Response;
    type Error = PartitionError;
    type Future = MapErr<S::Future, fn(PartitionError) -> PartitionError>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        self.inner
            .call(request)
            .map_err(present as fn(PartitionError) -> PartitionError)
    }
}
