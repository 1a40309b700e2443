//! The VM's all-objects table.
//!
//! Each entry pairs an RC header with an optional body. The body is dropped
//! when the deferred-release drain deallocates the object; the header stays
//! behind until the last weak reference is released, so weak reads can
//! observe `is_dead` without touching freed payload. Fully drained entries
//! are recycled through a free list.

use crate::object::{ObjBody, ObjKind, kind_name};
use crate::stats::MemoryStats;
use swive_core::value::ObjId;
use tracing::trace;

#[derive(Debug)]
pub struct Header {
    pub kind: ObjKind,
    pub strong: i32,
    pub weak: i32,
    pub has_creator_ref: bool,
    pub is_dead: bool,
    pub tracked_size: usize,
}

#[derive(Debug)]
struct Entry {
    header: Header,
    body: Option<ObjBody>,
}

#[derive(Debug, Default)]
pub struct Heap {
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    pub stats: MemoryStats,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::default()
    }

    /// Links a fresh object into the table. Objects are born with the
    /// creator reference: strong count 1 and the adopt flag set.
    pub fn allocate(&mut self, body: ObjBody) -> ObjId {
        let size = body.memory_size();
        let header = Header {
            kind: body.kind(),
            strong: 1,
            weak: 0,
            has_creator_ref: true,
            is_dead: false,
            tracked_size: size,
        };
        let entry = Entry {
            header,
            body: Some(body),
        };

        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot as usize] = Some(entry);
                ObjId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                ObjId((self.entries.len() - 1) as u32)
            }
        };

        self.stats.total_allocated += size;
        self.stats.current_objects += 1;
        if self.stats.current_objects > self.stats.peak_objects {
            self.stats.peak_objects = self.stats.current_objects;
        }
        trace!(id = id.0, kind = kind_name(self.header(id).kind), size, "allocate");
        id
    }

    fn entry(&self, id: ObjId) -> &Entry {
        self.entries[id.0 as usize]
            .as_ref()
            .expect("heap entry accessed after recycle")
    }

    fn entry_mut(&mut self, id: ObjId) -> &mut Entry {
        self.entries[id.0 as usize]
            .as_mut()
            .expect("heap entry accessed after recycle")
    }

    pub fn header(&self, id: ObjId) -> &Header {
        &self.entry(id).header
    }

    pub fn header_mut(&mut self, id: ObjId) -> &mut Header {
        &mut self.entry_mut(id).header
    }

    pub fn kind(&self, id: ObjId) -> ObjKind {
        self.entry(id).header.kind
    }

    /// Recycled entries read as dead.
    pub fn is_dead(&self, id: ObjId) -> bool {
        match self.entries.get(id.0 as usize).and_then(|e| e.as_ref()) {
            Some(entry) => entry.header.is_dead,
            None => true,
        }
    }

    /// Body access; `None` once the object has been deallocated or its
    /// slot recycled.
    pub fn body(&self, id: ObjId) -> Option<&ObjBody> {
        self.entries
            .get(id.0 as usize)
            .and_then(|e| e.as_ref())
            .and_then(|e| e.body.as_ref())
    }

    pub fn body_mut(&mut self, id: ObjId) -> Option<&mut ObjBody> {
        self.entries
            .get_mut(id.0 as usize)
            .and_then(|e| e.as_mut())
            .and_then(|e| e.body.as_mut())
    }

    /// Re-measures an object after growth and charges the delta, so the
    /// statistics stay close to actual retention.
    pub fn recharge(&mut self, id: ObjId) {
        let new_size = match &self.entry(id).body {
            Some(body) => body.memory_size(),
            None => return,
        };
        let old_size = self.entry_mut(id).header.tracked_size;
        if new_size > old_size {
            self.stats.total_allocated += new_size - old_size;
        }
        self.entry_mut(id).header.tracked_size = new_size;
    }

    /// Drops the body, records the freed size, and recycles the slot when
    /// no weak references remain.
    pub fn free_body(&mut self, id: ObjId) {
        let entry = self.entry_mut(id);
        if entry.body.take().is_some() {
            let size = entry.header.tracked_size;
            self.stats.total_freed += size;
            self.stats.current_objects -= 1;
            trace!(id = id.0, size, "deallocate");
        }
        self.maybe_recycle(id);
    }

    /// Recycles a dead, body-less, weak-free entry.
    pub fn maybe_recycle(&mut self, id: ObjId) {
        let entry = match &self.entries[id.0 as usize] {
            Some(e) => e,
            None => return,
        };
        if entry.header.is_dead && entry.body.is_none() && entry.header.weak <= 0 {
            self.entries[id.0 as usize] = None;
            self.free.push(id.0);
        }
    }

    /// Ids of all entries that still hold a body, used by VM teardown.
    pub fn live_ids(&self) -> Vec<ObjId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.as_ref().is_some_and(|e| e.body.is_some()))
            .map(|(i, _)| ObjId(i as u32))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.stats.current_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_charges_stats_and_sets_creator_ref() {
        let mut heap = Heap::new();
        let id = heap.allocate(ObjBody::Str("hi".to_string()));
        let header = heap.header(id);
        assert_eq!(header.strong, 1);
        assert!(header.has_creator_ref);
        assert!(!header.is_dead);
        assert_eq!(heap.stats.current_objects, 1);
        assert!(heap.stats.total_allocated > 0);
    }

    #[test]
    fn free_body_records_freed_size() {
        let mut heap = Heap::new();
        let id = heap.allocate(ObjBody::Str("hello world".to_string()));
        let allocated = heap.stats.total_allocated;
        heap.header_mut(id).is_dead = true;
        heap.free_body(id);
        assert_eq!(heap.stats.total_freed, allocated);
        assert_eq!(heap.stats.current_objects, 0);
    }

    #[test]
    fn entry_with_weak_refs_survives_free_body() {
        let mut heap = Heap::new();
        let id = heap.allocate(ObjBody::Str("x".to_string()));
        heap.header_mut(id).weak = 1;
        heap.header_mut(id).is_dead = true;
        heap.free_body(id);
        // header still observable
        assert!(heap.is_dead(id));
        assert!(heap.body(id).is_none());
        // releasing the weak ref recycles the slot
        heap.header_mut(id).weak = 0;
        heap.maybe_recycle(id);
        let next = heap.allocate(ObjBody::Str("y".to_string()));
        assert_eq!(next, id);
    }

    #[test]
    fn peak_objects_tracks_high_water_mark() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjBody::Str("a".to_string()));
        let _b = heap.allocate(ObjBody::Str("b".to_string()));
        heap.header_mut(a).is_dead = true;
        heap.free_body(a);
        let _c = heap.allocate(ObjBody::Str("c".to_string()));
        assert_eq!(heap.stats.peak_objects, 2);
    }
}
