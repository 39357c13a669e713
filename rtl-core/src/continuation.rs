//! Merge split threat reports.
//!
//! The sensor fits at most six records in one notification. With more
//! vehicles in view it sends a second notification whose sequence id is
//! exactly the previous one plus 2 (mod 256), meaning "append to the last
//! report". Any other delta starts a fresh report.

use log::debug;

use crate::frame::Frame;
use crate::types::ThreatRecord;

/// Sequence delta that marks a continuation notification.
pub const CONTINUATION_DELTA: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum ResolverState {
    #[default]
    Idle,
    HasPrevious {
        sequence_id: u8,
        resolved: Vec<ThreatRecord>,
    },
}

/// Turns decoded frames into resolved threat lists.
#[derive(Debug, Clone, Default)]
pub struct ContinuationResolver {
    state: ResolverState,
    pub merges: u64,
}

impl ContinuationResolver {
    pub fn new() -> Self {
        ContinuationResolver::default()
    }

    /// True if `sequence_id` continues a report that ended with `previous`.
    pub fn is_continuation(previous: u8, sequence_id: u8) -> bool {
        sequence_id == previous.wrapping_add(CONTINUATION_DELTA)
    }

    /// Resolve a frame against the previous one.
    ///
    /// The merged list (not just this frame's records) becomes the new
    /// previous list, so a chain of continuations keeps accumulating.
    pub fn resolve(&mut self, frame: &Frame) -> Vec<ThreatRecord> {
        let resolved = match &self.state {
            ResolverState::HasPrevious {
                sequence_id,
                resolved,
            } if Self::is_continuation(*sequence_id, frame.sequence_id) => {
                debug!(
                    "seq {} continues seq {sequence_id}: {} + {} threats",
                    frame.sequence_id,
                    resolved.len(),
                    frame.threats.len()
                );
                self.merges += 1;
                let mut merged = Vec::with_capacity(resolved.len() + frame.threats.len());
                merged.extend_from_slice(resolved);
                merged.extend_from_slice(&frame.threats);
                merged
            }
            _ => frame.threats.clone(),
        };

        self.state = ResolverState::HasPrevious {
            sequence_id: frame.sequence_id,
            resolved: resolved.clone(),
        };
        resolved
    }

    /// Sequence id of the last resolved frame, if any.
    pub fn last_sequence_id(&self) -> Option<u8> {
        match &self.state {
            ResolverState::Idle => None,
            ResolverState::HasPrevious { sequence_id, .. } => Some(*sequence_id),
        }
    }

    /// Last resolved list (empty while idle).
    pub fn last_resolved(&self) -> &[ThreatRecord] {
        match &self.state {
            ResolverState::Idle => &[],
            ResolverState::HasPrevious { resolved, .. } => resolved,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
