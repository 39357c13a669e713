//! Renderer interface and the scene that drives it from registry diffs.
//!
//! The decode side applies resolved lists with a [`HandleAllocator`], ships
//! the resulting `Diff<VisualId>` elsewhere, and the display replays it into
//! a [`Scene`] at its own pace.

use std::collections::HashMap;

use serde::Serialize;

use crate::projector::Projector;
use crate::registry::{Diff, VisualHooks};
use crate::types::{ThreatClass, ThreatRecord};

/// Display collaborator.
pub trait Renderer {
    type Handle;

    fn create_visual(&mut self, number: u8, position: f64, class: ThreatClass) -> Self::Handle;
    fn update_visual(&mut self, handle: &Self::Handle, position: f64);
    fn destroy_visual(&mut self, handle: Self::Handle);

    /// Called once a batch of changes has been applied.
    fn present(&mut self) {}
}

// ---------------------------------------------------------------------------
// Handles and scene
// ---------------------------------------------------------------------------

/// Opaque visual id handed out by [`HandleAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VisualId(pub u32);

/// Hands out sequential [`VisualId`]s and keeps count of releases.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: u32,
    pub live: usize,
    pub released: u64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        HandleAllocator::default()
    }
}

impl VisualHooks for HandleAllocator {
    type Handle = VisualId;

    fn acquire(&mut self, _record: &ThreatRecord, _position: f64, _class: ThreatClass) -> VisualId {
        let id = VisualId(self.next);
        self.next = self.next.wrapping_add(1);
        self.live += 1;
        id
    }

    fn release(&mut self, _handle: VisualId) {
        self.live = self.live.saturating_sub(1);
        self.released += 1;
    }
}

/// Renderer-side mirror of the registry, fed by deferred diffs.
pub struct Scene<R: Renderer> {
    renderer: R,
    projector: Projector,
    visuals: HashMap<VisualId, R::Handle>,
    by_number: HashMap<u8, VisualId>,
}

impl<R: Renderer> Scene<R> {
    pub fn new(renderer: R, projector: Projector) -> Self {
        Scene {
            renderer,
            projector,
            visuals: HashMap::new(),
            by_number: HashMap::new(),
        }
    }

    /// Replay one diff: removals, then updates, then additions.
    pub fn apply(&mut self, diff: &Diff<VisualId>) {
        for number in &diff.removed {
            if let Some(id) = self.by_number.remove(number) {
                if let Some(handle) = self.visuals.remove(&id) {
                    self.renderer.destroy_visual(handle);
                }
            }
        }

        for view in &diff.updated {
            if let Some(handle) = self.visuals.get(&view.handle) {
                self.renderer
                    .update_visual(handle, self.projector.position(view.distance));
            }
        }

        for view in &diff.added {
            let position = self.projector.position(view.distance);
            let handle = self.renderer.create_visual(view.number, position, view.class);
            self.visuals.insert(view.handle, handle);
            self.by_number.insert(view.number, view.handle);
        }
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Tear down every visual still on screen.
    pub fn clear(&mut self) {
        self.by_number.clear();
        for (_, handle) in self.visuals.drain() {
            self.renderer.destroy_visual(handle);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
