//! Paging bodies
//!
//! A paging body is an entity whose position drives tile residency: tiles
//! within its required radius must be loaded, tiles within its preload
//! radius should be prefetched.

use strata_core::{BodyHandle, Result, StrataError};

/// One registered body with its load radii. Invariant:
/// `0 <= required_radius <= preload_radius`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PagingBody {
    pub handle: BodyHandle,
    pub required_radius: f32,
    pub preload_radius: f32,
}

impl PagingBody {
    pub fn new(handle: BodyHandle, required_radius: f32, preload_radius: f32) -> Result<Self> {
        if required_radius < 0.0 || required_radius > preload_radius {
            return Err(StrataError::InvalidLoadRadii {
                required: required_radius,
                preload: preload_radius,
            });
        }
        Ok(Self {
            handle,
            required_radius,
            preload_radius,
        })
    }
}

/// The set of bodies registered with a pager.
#[derive(Default)]
pub struct PagingBodies {
    bodies: Vec<PagingBody>,
}

impl PagingBodies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body, or update its radii if the handle is already
    /// registered. Rejects `required > preload` at the door.
    pub fn add(&mut self, handle: BodyHandle, required: f32, preload: f32) -> Result<()> {
        let body = PagingBody::new(handle, required, preload)?;
        match self.bodies.iter_mut().find(|b| b.handle == handle) {
            Some(existing) => *existing = body,
            None => self.bodies.push(body),
        }
        Ok(())
    }

    /// Unregister a body. Removing an unknown handle is a logged no-op.
    pub fn remove(&mut self, handle: BodyHandle) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|b| b.handle != handle);
        if self.bodies.len() == before {
            log::warn!("removed body {handle} was not registered with the pager");
            return false;
        }
        true
    }

    /// Update the radii of a registered body. Updating an unknown handle
    /// is a logged no-op, never an implicit registration.
    pub fn set_radii(&mut self, handle: BodyHandle, required: f32, preload: f32) -> Result<bool> {
        let body = PagingBody::new(handle, required, preload)?;
        match self.bodies.iter_mut().find(|b| b.handle == handle) {
            Some(existing) => {
                *existing = body;
                Ok(true)
            }
            None => {
                log::warn!("set radii for body {handle} that is not registered with the pager");
                Ok(false)
            }
        }
    }

    /// Radii of a registered body, `(required, preload)`.
    pub fn radii(&self, handle: BodyHandle) -> Option<(f32, f32)> {
        self.bodies
            .iter()
            .find(|b| b.handle == handle)
            .map(|b| (b.required_radius, b.preload_radius))
    }

    /// Drop bodies whose referenced solver body no longer exists. The
    /// dangling handles are logged and never dereferenced.
    pub fn purge_dangling(&mut self, known: impl Fn(BodyHandle) -> bool) {
        self.bodies.retain(|b| {
            let alive = known(b.handle);
            if !alive {
                log::warn!("paging body {} no longer exists in the solver, purged", b.handle);
            }
            alive
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &PagingBody> {
        self.bodies.iter()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
