//! Warm-Start Cache
//!
//! Carries accumulated impulses (lambdas) from one step to the next, keyed by
//! the unordered pair of stable primitive identities. Keys never depend on
//! allocation identity, so two identical runs warm start identically.
//!
//! # Features
//!
//! - **Deterministic keys**: sorted `(leaf body, primitive index)` pairs
//! - **Stale guard**: an entry is only used when the live contact acts on the
//!   same constrained bodies as the cached one
//! - **Rebuilt every step**: the cache holds exactly last step's contacts

use indexmap::IndexMap;

use crate::body::BodyHandle;
use crate::contact::{Contact, PrimitivePairKey, ROWS_PER_CONTACT};

/// Cached solution of one contact
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachedImpulse {
    /// First recorded body when cached
    pub body_a: BodyHandle,
    /// First constrained body when cached
    pub constrained_a: BodyHandle,
    /// Second constrained body when cached
    pub constrained_b: BodyHandle,
    /// Accumulated impulse per row
    pub lambda: [f64; ROWS_PER_CONTACT],
}

/// Primitive-pair keyed impulse cache
#[derive(Clone, Debug, Default)]
pub struct ContactCache {
    entries: IndexMap<PrimitivePairKey, CachedImpulse>,
}

impl ContactCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached contacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached impulses for `contact`, if present and still acting on the
    /// same constrained bodies
    #[must_use]
    pub fn lookup(&self, contact: &Contact) -> Option<[f64; ROWS_PER_CONTACT]> {
        let cached = self.entries.get(&contact.key)?;
        let same = (cached.constrained_a == contact.constrained_a
            && cached.constrained_b == contact.constrained_b)
            || (cached.constrained_a == contact.constrained_b
                && cached.constrained_b == contact.constrained_a);
        if !same {
            return None;
        }
        // Swapped recorded order negates the normal, which maps the tangent
        // basis (t1, t2) to (-t1, t2). Rows act on swapped bodies too, so only
        // the second tangent impulse changes sign.
        if cached.body_a != contact.body_a {
            return Some([cached.lambda[0], cached.lambda[1], -cached.lambda[2]]);
        }
        Some(cached.lambda)
    }

    /// Replace the cache with this step's solved contacts
    pub fn rebuild(&mut self, contacts: &[Contact]) {
        self.entries.clear();
        for c in contacts {
            self.entries.insert(
                c.key,
                CachedImpulse {
                    body_a: c.body_a,
                    constrained_a: c.constrained_a,
                    constrained_b: c.constrained_b,
                    lambda: c.lambda,
                },
            );
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
