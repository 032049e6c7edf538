//! Multi-node integration tests for the FieldMesh mesh layer
//!
//! This test suite validates, over a simulated radio medium:
//! - Gateway relay between out-of-range leaves, hop ceiling enforcement
//! - Acknowledged delivery, bounded retry and failure reporting
//! - Priority ordering, duplicate suppression and disarm purges
//! - Peer discovery, gateway election and staleness eviction

pub mod test_utils;

#[cfg(test)]
mod relay_tests;

#[cfg(test)]
mod delivery_tests;

#[cfg(test)]
mod registry_tests;
