//! Opaque solver-body handles

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque handle referencing a body owned by the external solver.
///
/// The pager never dereferences a handle itself; it only passes handles
/// back to the solver to query positions. A handle whose body has been
/// destroyed externally is purged from the paging tables, never used.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyHandle(pub u64);

impl BodyHandle {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyHandle({})", self.0)
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
