// Unit Tests for the Presentation Filter
//
// UNIT UNDER TEST: PresentableFailureLayer, present
//
// BUSINESS RESPONSIBILITY:
//   - Strips internal retry flags from failures crossing a trust boundary
//   - Resolves wrapped failures to the error they wrap
//   - Leaves every other error untouched
//
// TEST COVERAGE:
//   - Restartable flag removed; Rejected, reason and sources kept
//   - Wrapped failure over a foreign error resolves to the foreign error
//   - Configuration errors and successes pass through the layer

use crate::error::PartitionError;
use crate::failure::{FailureCause, FailureFlags, FailureValue, SourceTag};
use crate::filter::{present, PresentableFailureLayer};
use std::fmt;
use tower::{service_fn, ServiceBuilder, ServiceExt};

#[derive(Debug)]
struct ConnectionReset;

impl fmt::Display for ConnectionReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection reset by peer")
    }
}

impl std::error::Error for ConnectionReset {}

fn restartable_rejection() -> FailureValue {
    FailureValue::with_reason("shard overloaded", FailureFlags::RESTARTABLE | FailureFlags::REJECTED)
        .unwrap()
        .with_source(SourceTag::Service, "inventory")
        .with_source(SourceTag::RemoteInfo, "10.0.0.7:9090")
}

#[cfg(test)]
mod present_tests {
    use super::*;

    #[test]
    fn test_present_strips_restartable_and_keeps_description() {
        // Arrange
        let error = PartitionError::from(restartable_rejection());

        // Act
        let shown = present(error);

        // Assert
        match shown {
            PartitionError::Failure(failure) => {
                assert_eq!(failure.flags(), FailureFlags::REJECTED);
                assert_eq!(failure.reason(), "shard overloaded");
                assert_eq!(failure.source(SourceTag::Service), Some("inventory"));
            }
            other => panic!("Expected presentable failure, got {other:?}"),
        }
    }

    #[test]
    fn test_present_resolves_wrapped_foreign_cause() {
        // Arrange
        let wrapped =
            FailureValue::wrap(FailureCause::foreign(ConnectionReset), FailureFlags::NONE).unwrap();

        // Act
        let shown = present(PartitionError::from(wrapped));

        // Assert
        match shown {
            PartitionError::Foreign { error, type_name } => {
                assert_eq!(error.to_string(), "connection reset by peer");
                assert!(type_name.ends_with("ConnectionReset"));
            }
            other => panic!("Expected foreign error, got {other:?}"),
        }
    }

    #[test]
    fn test_present_leaves_unclassified_errors_alone() {
        let shown = present(PartitionError::missing_hashing_key("MultiGet"));

        assert!(matches!(
            shown,
            PartitionError::MissingHashingKey { ref method } if method == "MultiGet"
        ));
    }
}

#[cfg(test)]
mod layer_tests {
    use super::*;

    #[tokio::test]
    async fn test_layer_presents_inner_failures() {
        // Arrange
        let service = ServiceBuilder::new()
            .layer(PresentableFailureLayer)
            .service(service_fn(|_: ()| async {
                Err::<String, _>(PartitionError::from(restartable_rejection()))
            }));

        // Act
        let result = service.oneshot(()).await;

        // Assert
        match result {
            Err(PartitionError::Failure(failure)) => {
                assert!(!failure.is_flagged(FailureFlags::RESTARTABLE));
                assert!(failure.is_flagged(FailureFlags::REJECTED));
            }
            other => panic!("Expected presentable failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_layer_passes_successes_through() {
        let service = ServiceBuilder::new()
            .layer(PresentableFailureLayer)
            .service(service_fn(|name: &'static str| async move {
                Ok::<_, PartitionError>(format!("hello {name}"))
            }));

        let result = service.oneshot("shard").await;

        assert_eq!(result.unwrap(), "hello shard");
    }
}
