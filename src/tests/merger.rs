// Unit Tests for Merger Registries
//
// UNIT UNDER TEST: MergerRegistry (request and response side)
//
// BUSINESS RESPONSIBILITY:
//   - Maps method names to merge functions registered at client construction
//   - Returns exactly the registered function on lookup
//   - Reports "not found" for methods without a merger
//
// TEST COVERAGE:
//   - Registration round-trip and identity of the stored merger
//   - Overwriting an entry
//   - Chained registration

use crate::error::PartitionError;
use crate::failure::FailureValue;
use crate::merger::{RequestMergerRegistry, ResponseMerger, ResponseMergerRegistry};
use std::sync::Arc;

#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn test_get_returns_registered_merger() {
        // Arrange
        let mut registry = ResponseMergerRegistry::<String>::new();
        registry.add("Get", |parts: Vec<String>, _failures| Ok(parts.join(";")));

        // Act
        let first = registry.get("Get").expect("merger should be registered");
        let second = registry.get("Get").expect("merger should be registered");

        // Assert
        assert!(Arc::ptr_eq(&first, &second), "Lookups return the same merger");
        assert_eq!(
            first(vec!["a".to_string(), "b".to_string()], vec![]).unwrap(),
            "a;b"
        );
    }

    #[test]
    fn test_get_unregistered_method_is_not_found() {
        let registry = ResponseMergerRegistry::<String>::new();

        assert!(registry.get("Unregistered").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_overwrites_existing_entry() {
        // Arrange
        let mut registry = RequestMergerRegistry::<Vec<i64>>::new();
        registry.add("Get", |batches: Vec<Vec<i64>>| batches.concat());

        // Act
        registry.add("Get", |_batches: Vec<Vec<i64>>| vec![42]);

        // Assert
        let merger = registry.get("Get").unwrap();
        assert_eq!(merger(vec![vec![1], vec![2]]), vec![42]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_supports_chaining() {
        // Arrange
        let mut registry = RequestMergerRegistry::<Vec<i64>>::new();

        // Act
        registry
            .add("Get", |batches: Vec<Vec<i64>>| batches.concat())
            .add("Scan", |mut batches: Vec<Vec<i64>>| batches.pop().unwrap_or_default());

        // Assert
        let mut methods: Vec<&str> = registry.methods().collect();
        methods.sort_unstable();
        assert_eq!(methods, vec!["Get", "Scan"]);
    }

    #[test]
    fn test_response_merger_receives_failures() {
        // Test verifies a "require all" merger surfaces the captured failure

        // Arrange
        let require_all: ResponseMerger<String> =
            Arc::new(|parts: Vec<String>, failures: Vec<PartitionError>| {
                match failures.into_iter().next() {
                    Some(failure) => Err(failure),
                    None => Ok(parts.join(";")),
                }
            });
        let failure = PartitionError::from(FailureValue::rejected("busy"));

        // Act
        let result = require_all(vec!["a".to_string()], vec![failure]);

        // Assert
        match result {
            Err(PartitionError::Failure(f)) => assert_eq!(f.reason(), "busy"),
            other => panic!("Expected captured failure, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_lists_methods() {
        let mut registry = ResponseMergerRegistry::<String>::new();
        registry.add("Get", |parts: Vec<String>, _failures| Ok(parts.concat()));

        assert_eq!(format!("{registry:?}"), "MergerRegistry { methods: [\"Get\"] }");
    }
}
