//! One notification in, one diff out.
//!
//! `ThreatMonitor` owns the continuation resolver and the registry, so a
//! single `&mut` borrow covers the whole decode → resolve → apply step and
//! no two notifications can interleave.

use log::warn;

use crate::continuation::ContinuationResolver;
use crate::frame::{parse_frame, Frame};
use crate::projector::Projector;
use crate::registry::{Diff, ThreatRegistry, VisualHooks};
use crate::types::{Result, ThreatRecord};

pub struct ThreatMonitor<H> {
    resolver: ContinuationResolver,
    registry: ThreatRegistry<H>,

    // Counters
    pub total_frames: u64,
    pub valid_frames: u64,
    pub rejected_frames: u64,
}

impl<H: Clone> ThreatMonitor<H> {
    pub fn new(projector: Projector) -> Self {
        ThreatMonitor {
            resolver: ContinuationResolver::new(),
            registry: ThreatRegistry::new(projector),
            total_frames: 0,
            valid_frames: 0,
            rejected_frames: 0,
        }
    }

    /// Decode a raw payload and apply it.
    ///
    /// A payload that fails to decode leaves resolver and registry state
    /// untouched.
    pub fn process<K>(&mut self, payload: &[u8], hooks: &mut K) -> Result<Diff<H>>
    where
        K: VisualHooks<Handle = H>,
    {
        self.total_frames += 1;
        let frame = match parse_frame(payload) {
            Ok(f) => f,
            Err(e) => {
                self.rejected_frames += 1;
                warn!("dropping notification ({} bytes): {e}", payload.len());
                return Err(e);
            }
        };
        Ok(self.process_frame(&frame, hooks).1)
    }

    /// Resolve and apply an already decoded frame. Returns the resolved
    /// list alongside the diff.
    pub fn process_frame<K>(&mut self, frame: &Frame, hooks: &mut K) -> (Vec<ThreatRecord>, Diff<H>)
    where
        K: VisualHooks<Handle = H>,
    {
        self.valid_frames += 1;
        let resolved = self.resolver.resolve(frame);
        let diff = self.registry.apply(&resolved, hooks);
        (resolved, diff)
    }

    pub fn registry(&self) -> &ThreatRegistry<H> {
        &self.registry
    }

    pub fn resolver(&self) -> &ContinuationResolver {
        &self.resolver
    }

    pub fn projector(&self) -> &Projector {
        self.registry.projector()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HandleAllocator, VisualId};
    use crate::types::{RadarError, ThreatClass};

    fn monitor() -> ThreatMonitor<VisualId> {
        ThreatMonitor::new(Projector::default())
    }

    #[test]
    fn test_end_to_end_payload() {
        let mut m = monitor();
        let mut alloc = HandleAllocator::new();
        let diff = m.process(&[5, 1, 10, 60, 2, 40, 130], &mut alloc).unwrap();

        assert_eq!(m.resolver().last_sequence_id(), Some(5));
        assert_eq!(diff.added.len(), 2);
        let a = &diff.added[0];
        assert_eq!((a.number, a.distance, a.speed, a.class), (1, 10, 60, ThreatClass::Low));
        let b = &diff.added[1];
        assert_eq!((b.number, b.distance, b.speed, b.class), (2, 40, 130, ThreatClass::High));
    }

    #[test]
    fn test_split_report_keeps_first_half() {
        let mut m = monitor();
        let mut alloc = HandleAllocator::new();
        let mut first = vec![10u8];
        for n in 1..=6u8 {
            first.extend_from_slice(&[n, n * 10, 50]);
        }
        m.process(&first, &mut alloc).unwrap();

        let diff = m.process(&[12, 7, 100, 80, 8, 120, 90], &mut alloc).unwrap();
        assert!(diff.removed.is_empty());
        assert_eq!(diff.updated.len(), 6);
        assert_eq!(diff.added.len(), 2);
        assert_eq!(m.registry().len(), 8);
    }

    #[test]
    fn test_standalone_after_split_drops_missing() {
        let mut m = monitor();
        let mut alloc = HandleAllocator::new();
        m.process(&[10, 1, 10, 50, 2, 20, 50], &mut alloc).unwrap();
        m.process(&[12, 3, 30, 50], &mut alloc).unwrap();
        let diff = m.process(&[13, 3, 25, 50], &mut alloc).unwrap();

        assert_eq!(diff.removed, vec![1, 2]);
        assert_eq!(alloc.released, 2);
        assert_eq!(m.registry().len(), 1);
    }

    #[test]
    fn test_rejected_payload_leaves_state() {
        let mut m = monitor();
        let mut alloc = HandleAllocator::new();
        m.process(&[10, 1, 10, 50], &mut alloc).unwrap();

        let err = m.process(&[11, 1, 10], &mut alloc).unwrap_err();
        assert!(matches!(err, RadarError::MalformedFrame { len: 3 }));
        assert_eq!(m.resolver().last_sequence_id(), Some(10));
        assert_eq!(m.registry().len(), 1);
        assert_eq!(m.rejected_frames, 1);

        // Still a continuation of seq 10.
        let diff = m.process(&[12, 2, 20, 50], &mut alloc).unwrap();
        assert!(diff.removed.is_empty());
        assert_eq!(m.registry().len(), 2);
        assert_eq!(m.total_frames, 3);
        assert_eq!(m.valid_frames, 2);
    }

    #[test]
    fn test_empty_frame_clears_registry() {
        let mut m = monitor();
        let mut alloc = HandleAllocator::new();
        m.process(&[1, 1, 10, 50], &mut alloc).unwrap();
        let diff = m.process(&[2], &mut alloc).unwrap();
        assert_eq!(diff.removed, vec![1]);
        assert!(m.registry().is_empty());
    }

    #[test]
    fn test_process_frame_returns_resolved() {
        let mut m = monitor();
        let mut alloc = HandleAllocator::new();
        m.process_frame(&Frame::new(254, vec![ThreatRecord::new(1, 5, 5)]), &mut alloc);
        let (resolved, _) =
            m.process_frame(&Frame::new(0, vec![ThreatRecord::new(2, 6, 6)]), &mut alloc);
        assert_eq!(resolved.len(), 2);
    }
}
