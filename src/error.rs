//! Physics Error Types
//!
//! Unified error type for the simulator. Operations that can fail
//! (body construction, handle lookup, merge/unmerge requests, config
//! validation) return `Result<T, PhysicsError>` instead of panicking.
//!
//! Solver degeneracy is never an error: a degenerate contact row is skipped
//! for that step and the step carries on.

use crate::body::BodyHandle;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    /// Handle does not refer to a live body.
    #[error("body handle {index} is not live (slots={count})")]
    InvalidBodyHandle {
        /// Slot index carried by the stale handle
        index: u32,
        /// Number of slots in the body table
        count: usize,
    },
    /// Unmerge requested for a body that is not a member of the collection.
    #[error("body {body:?} is not a member of collection {collection:?}")]
    NotACollectionMember {
        /// The body passed to the unmerge request
        body: BodyHandle,
        /// The collection it was expected to belong to
        collection: BodyHandle,
    },
    /// A collection operation was invoked on a simple body.
    #[error("body {handle:?} is not a collection")]
    NotACollection {
        /// The offending handle
        handle: BodyHandle,
    },
    /// A merge would make a collection contain itself.
    #[error("merging {body:?} into {collection:?} would create a cycle")]
    CyclicMerge {
        /// Body being absorbed
        body: BodyHandle,
        /// Receiving collection
        collection: BodyHandle,
    },
    /// A body was built without any primitives.
    #[error("body has no collision primitives")]
    MissingGeometry,
    /// Mass properties could not be constructed.
    #[error("non-positive mass {mass}")]
    NonPositiveMass {
        /// The rejected mass
        mass: f64,
    },
    /// A per-body restitution or friction override is out of range.
    #[error("invalid {property} override {value}")]
    InvalidMaterial {
        /// `"friction"` or `"restitution"`
        property: &'static str,
        /// The rejected value
        value: f64,
    },
    /// A non-zero velocity was requested for a pinned body.
    #[error("body {body:?} is pinned and cannot take a velocity")]
    PinnedBody {
        /// The pinned body
        body: BodyHandle,
    },
    /// Invalid configuration parameter.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PhysicsError::InvalidBodyHandle { index: 5, count: 3 };
        let s = format!("{}", e);
        assert!(s.contains('5'), "Should contain index");
        assert!(s.contains('3'), "Should contain count");
    }

    #[test]
    fn test_error_debug() {
        let e = PhysicsError::MissingGeometry;
        let s = format!("{:?}", e);
        assert!(s.contains("MissingGeometry"));
    }

    #[test]
    fn test_non_positive_mass() {
        let e = PhysicsError::NonPositiveMass { mass: -2.0 };
        assert!(e.to_string().contains("-2"));
    }

    #[test]
    fn test_invalid_configuration() {
        let e = PhysicsError::InvalidConfiguration {
            reason: "iterations must be > 0",
        };
        let s = format!("{}", e);
        assert!(s.contains("iterations"));
    }

    #[test]
    fn test_invalid_material() {
        let e = PhysicsError::InvalidMaterial {
            property: "friction",
            value: -0.5,
        };
        let s = e.to_string();
        assert!(s.contains("friction") && s.contains("-0.5"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&PhysicsError::MissingGeometry);
    }
}
