//! Body table.
//!
//! Slot arena owning every body (simple and collection). Handles carry a
//! generation so a freed and reused slot never aliases an old handle.
//! Iteration order is slot order, which keeps stepping deterministic.

use crate::body::{BodyHandle, RigidBody};
use crate::error::PhysicsError;

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    body: Option<RigidBody>,
}

/// Arena of rigid bodies addressed by [`BodyHandle`]
#[derive(Clone, Debug, Default)]
pub struct BodySet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl BodySet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live bodies
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no body is live
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a body and return its handle
    pub fn insert(&mut self, mut body: RigidBody) -> BodyHandle {
        let index = if let Some(index) = self.free.pop() {
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                body: None,
            });
            (self.slots.len() - 1) as u32
        };
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let handle = BodyHandle::new(index, slot.generation);
        body.handle = handle;
        slot.body = Some(body);
        self.len += 1;
        handle
    }

    /// Remove a body, freeing its slot
    pub fn remove(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let body = slot.body.take()?;
        self.free.push(handle.index());
        self.len -= 1;
        Some(body)
    }

    /// True when `handle` refers to a live body
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Shared access
    #[must_use]
    pub fn get(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.body.as_ref()
    }

    /// Exclusive access
    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.body.as_mut()
    }

    /// Shared access or a typed error
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale or foreign handles.
    pub fn try_get(&self, handle: BodyHandle) -> Result<&RigidBody, PhysicsError> {
        self.get(handle).ok_or(PhysicsError::InvalidBodyHandle {
            index: handle.index(),
            count: self.slots.len(),
        })
    }

    /// Exclusive access or a typed error
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale or foreign handles.
    pub fn try_get_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, PhysicsError> {
        let count = self.slots.len();
        self.get_mut(handle).ok_or(PhysicsError::InvalidBodyHandle {
            index: handle.index(),
            count,
        })
    }

    /// Exclusive access to two distinct bodies at once
    pub fn pair_mut(
        &mut self,
        a: BodyHandle,
        b: BodyHandle,
    ) -> Option<(&mut RigidBody, &mut RigidBody)> {
        if a.index() == b.index() || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        let (first, second) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };
        Some((first.body.as_mut()?, second.body.as_mut()?))
    }

    /// Owning collection of `handle`, or `handle` itself
    #[inline]
    #[must_use]
    pub fn root_of(&self, handle: BodyHandle) -> BodyHandle {
        self.get(handle).and_then(RigidBody::parent).unwrap_or(handle)
    }

    /// Iterate live bodies in slot order
    pub fn iter(&self) -> impl Iterator<Item = &RigidBody> + '_ {
        self.slots.iter().filter_map(|s| s.body.as_ref())
    }

    /// Iterate live bodies mutably in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> + '_ {
        self.slots.iter_mut().filter_map(|s| s.body.as_mut())
    }

    /// Handles of bodies without a parent, in slot order
    pub fn top_level_into(&self, out: &mut Vec<BodyHandle>) {
        out.clear();
        out.extend(self.iter().filter(|b| b.parent().is_none()).map(RigidBody::handle));
    }
}

impl core::ops::Index<BodyHandle> for BodySet {
    type Output = RigidBody;

    fn index(&self, handle: BodyHandle) -> &RigidBody {
        match self.get(handle) {
            Some(body) => body,
            None => panic!("stale body handle {handle:?}"),
        }
    }
}

impl core::ops::IndexMut<BodyHandle> for BodySet {
    fn index_mut(&mut self, handle: BodyHandle) -> &mut RigidBody {
        match self.get_mut(handle) {
            Some(body) => body,
            None => panic!("stale body handle {handle:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyBuilder;

    fn ball() -> RigidBody {
        BodyBuilder::sphere(0.5).build().unwrap()
    }

    #[test]
    fn test_insert_get_remove() {
        let mut set = BodySet::new();
        let a = set.insert(ball());
        let b = set.insert(ball());
        assert_eq!(set.len(), 2);
        assert_eq!(set[a].handle(), a);
        assert!(set.remove(a).is_some());
        assert!(set.get(a).is_none());
        assert!(set.contains(b));
    }

    #[test]
    fn test_generation_guards_reuse() {
        let mut set = BodySet::new();
        let a = set.insert(ball());
        set.remove(a);
        let c = set.insert(ball());
        assert_eq!(a.index(), c.index(), "Slot reused");
        assert!(set.get(a).is_none(), "Old handle stays dead");
        assert!(matches!(
            set.try_get(a),
            Err(PhysicsError::InvalidBodyHandle { .. })
        ));
    }

    #[test]
    fn test_pair_mut() {
        let mut set = BodySet::new();
        let a = set.insert(ball());
        let b = set.insert(ball());
        let (ba, bb) = set.pair_mut(b, a).unwrap();
        assert_eq!(ba.handle(), b);
        assert_eq!(bb.handle(), a);
        assert!(set.pair_mut(a, a).is_none());
    }
}
