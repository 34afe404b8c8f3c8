//! Descriptor matching: nearest enrolled descriptor plus acceptance policy.

use crate::registry::Registry;
use crate::types::{FaceDescriptor, MatchResult};
use thiserror::Error;

/// Maximum distance accepted as the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.6;
/// Confidence reported when there is nothing to compare against.
pub const DEFAULT_UNKNOWN_CONFIDENCE: f32 = 0.5;
/// Lower bound on the confidence of a rejected match.
pub const DEFAULT_FLOOR_CONFIDENCE: f32 = 0.3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("descriptor dimension mismatch: probe has {probe} values, enrolled descriptor has {enrolled}")]
    DimensionMismatch { probe: usize, enrolled: usize },
}

/// What to do when an enrolled descriptor has a different length than the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DimensionPolicy {
    /// Log and ignore that one enrolled descriptor.
    #[default]
    Skip,
    /// Fail the whole comparison.
    Strict,
}

/// Tunables for one match decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// A match is accepted when the best distance is strictly below this value.
    pub tolerance: f32,
    /// Confidence for an empty registry (or one where every descriptor was skipped).
    pub unknown_confidence: f32,
    /// Minimum confidence of a rejected match.
    pub floor_confidence: f32,
    pub dimensions: DimensionPolicy,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            unknown_confidence: DEFAULT_UNKNOWN_CONFIDENCE,
            floor_confidence: DEFAULT_FLOOR_CONFIDENCE,
            dimensions: DimensionPolicy::Skip,
        }
    }
}

impl MatchPolicy {
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Strategy for comparing a probe descriptor against a registry.
pub trait Matcher {
    fn compare(
        &self,
        probe: &FaceDescriptor,
        registry: &Registry,
        policy: &MatchPolicy,
    ) -> Result<MatchResult, MatchError>;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// Visits every enrolled descriptor of every identity and keeps the global
/// minimum. Ties go to the identity that appears first in the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &FaceDescriptor,
        registry: &Registry,
        policy: &MatchPolicy,
    ) -> Result<MatchResult, MatchError> {
        let mut best: Option<(usize, f32)> = None;

        for (idx, identity) in registry.iter().enumerate() {
            for (pos, enrolled) in identity.descriptors.iter().enumerate() {
                let distance = match probe.distance(enrolled) {
                    Ok(d) => d,
                    Err(err) if policy.dimensions == DimensionPolicy::Skip => {
                        tracing::warn!(
                            person_id = %identity.id,
                            descriptor = pos,
                            error = %err,
                            "skipping enrolled descriptor"
                        );
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                // Strict `<` keeps the earlier identity on exact ties.
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((idx, distance));
                }
            }
        }

        let Some((idx, min_distance)) = best else {
            return Ok(MatchResult::unknown(policy.unknown_confidence));
        };

        let closeness = 1.0 - min_distance;
        if min_distance < policy.tolerance {
            Ok(MatchResult::recognized(&registry.identities()[idx], closeness))
        } else {
            Ok(MatchResult::unknown(closeness.max(policy.floor_confidence)))
        }
    }
}

/// Match one probe with the default policy at the given tolerance.
pub fn match_descriptor(
    probe: &FaceDescriptor,
    registry: &Registry,
    tolerance: f32,
) -> Result<MatchResult, MatchError> {
    EuclideanMatcher.compare(probe, registry, &MatchPolicy::default().with_tolerance(tolerance))
}
