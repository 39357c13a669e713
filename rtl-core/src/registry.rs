//! Live registry of visible threats with per-update diffs.
//!
//! Pure logic, no I/O. The consumer supplies a [`VisualHooks`] impl that
//! hands out a render handle for each new threat and takes it back when the
//! threat disappears. Everything else reaches the consumer through [`Diff`].
//!
//! ## Class freezing
//!
//! A view's [`ThreatClass`] is computed once, from the speed at first
//! sighting, and never recomputed. A vehicle first seen slow keeps its LOW
//! class even if it later accelerates past the HIGH threshold.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::projector::Projector;
use crate::types::{ThreatClass, ThreatRecord};

/// Consumer callbacks invoked while applying a resolved list.
pub trait VisualHooks {
    type Handle: Clone;

    /// Called once per newly tracked threat.
    fn acquire(&mut self, record: &ThreatRecord, position: f64, class: ThreatClass)
        -> Self::Handle;

    /// Called once per threat that left the registry.
    fn release(&mut self, handle: Self::Handle);
}

/// Registry entry for one tracked threat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatView<H> {
    pub number: u8,
    pub distance: u8,
    pub speed: u8,
    /// Fixed at creation, see module docs.
    pub class: ThreatClass,
    pub handle: H,
    /// Number of resolved lists this threat appeared in after its first.
    pub updates: u64,
}

/// Delta between two successive registry states.
///
/// `added` and `updated` follow the order of the resolved list; `removed`
/// is in ascending slot order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diff<H> {
    pub added: Vec<ThreatView<H>>,
    pub updated: Vec<ThreatView<H>>,
    pub removed: Vec<u8>,
}

impl<H> Default for Diff<H> {
    fn default() -> Self {
        Diff {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<H> Diff<H> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Tracks threat identity across resolved lists.
pub struct ThreatRegistry<H> {
    projector: Projector,
    threats: BTreeMap<u8, ThreatView<H>>,

    // Counters
    pub total_added: u64,
    pub total_removed: u64,
}

impl<H: Clone> ThreatRegistry<H> {
    pub fn new(projector: Projector) -> Self {
        ThreatRegistry {
            projector,
            threats: BTreeMap::new(),
            total_added: 0,
            total_removed: 0,
        }
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Apply one resolved list and return what changed.
    ///
    /// Removals are released before any new handle is acquired. A number
    /// listed twice is created by its first occurrence and updated by the
    /// second.
    pub fn apply<K>(&mut self, resolved: &[ThreatRecord], hooks: &mut K) -> Diff<H>
    where
        K: VisualHooks<Handle = H>,
    {
        let present: HashSet<u8> = resolved.iter().map(|t| t.number).collect();
        let mut diff = Diff::default();

        let gone: Vec<u8> = self
            .threats
            .keys()
            .filter(|n| !present.contains(n))
            .copied()
            .collect();
        for number in gone {
            if let Some(view) = self.threats.remove(&number) {
                hooks.release(view.handle);
                diff.removed.push(number);
                self.total_removed += 1;
            }
        }

        for record in resolved {
            if let Some(view) = self.threats.get_mut(&record.number) {
                view.distance = record.distance;
                view.speed = record.speed;
                view.updates += 1;
                diff.updated.push(view.clone());
                continue;
            }

            let class = self.projector.classify(record.speed);
            let position = self.projector.position(record.distance);
            let handle = hooks.acquire(record, position, class);
            let view = ThreatView {
                number: record.number,
                distance: record.distance,
                speed: record.speed,
                class,
                handle,
                updates: 0,
            };
            diff.added.push(view.clone());
            self.threats.insert(record.number, view);
            self.total_added += 1;
        }

        diff
    }

    pub fn get(&self, number: u8) -> Option<&ThreatView<H>> {
        self.threats.get(&number)
    }

    /// Tracked threats in slot order.
    pub fn views(&self) -> impl Iterator<Item = &ThreatView<H>> {
        self.threats.values()
    }

    pub fn len(&self) -> usize {
        self.threats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threats.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
