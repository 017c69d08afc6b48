//! The backing store facade

use std::collections::{HashMap, HashSet};

use strata_core::{Index2, Result, StrataError};

use crate::cell::BackingCell;
use crate::grid::HeightGrid;

/// A rectangular patch of samples inside one backing cell, in cell-local
/// indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PatchRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A single sample at (x, y).
    pub const fn single(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            width: 1,
            height: 1,
        }
    }
}

/// Rectangular height-patch read/write over a collection of backing
/// cells, each independently addressable.
///
/// Writes are deferred: a store batches them, but a queued write must be
/// visible to the next `read_patch` of the same cell and is applied to
/// the permanent grids on `flush`. Cells may be virtual from the caller's
/// perspective (streamed in later); `is_materialized` reports this rather
/// than blocking.
pub trait BackingStore: Send {
    /// Samples per cell edge, uniform across all cells of the store.
    fn cell_resolution(&self) -> u32;

    /// True if the cell coordinate is part of this store's extent at all.
    fn has_cell(&self, cell: Index2) -> bool;

    /// True once the cell's height data is available for reading.
    fn is_materialized(&self, cell: Index2) -> bool;

    /// Read a rectangle of heights, row-major. Queued writes against the
    /// same cell are applied first.
    fn read_patch(&mut self, cell: Index2, rect: PatchRect) -> Result<Vec<f32>>;

    /// Queue a rectangle of heights to be written. The rectangle is
    /// validated eagerly; an out-of-bounds request writes nothing.
    fn write_patch_deferred(&mut self, cell: Index2, rect: PatchRect, heights: &[f32])
        -> Result<()>;

    /// Apply all queued writes in arrival order.
    fn flush(&mut self);
}

struct PendingWrite {
    cell: Index2,
    rect: PatchRect,
    heights: Vec<f32>,
}

/// A `BackingStore` holding all cells in memory.
///
/// Cells can be inserted as virtual and materialized later, which models
/// disk-streamed storage in tests and standalone use.
pub struct InMemoryBackingStore {
    resolution: u32,
    cells: HashMap<Index2, BackingCell>,
    materialized: HashSet<Index2>,
    pending: Vec<PendingWrite>,
}

impl InMemoryBackingStore {
    pub fn new(resolution: u32) -> Result<Self> {
        if resolution < 2 {
            return Err(StrataError::Config(format!(
                "cell resolution must be at least 2, got {resolution}"
            )));
        }
        Ok(Self {
            resolution,
            cells: HashMap::new(),
            materialized: HashSet::new(),
            pending: Vec::new(),
        })
    }

    /// Insert a cell that is immediately readable.
    pub fn insert_cell(&mut self, coord: Index2, grid: HeightGrid) -> Result<()> {
        self.insert_virtual_cell(coord, grid)?;
        self.materialized.insert(coord);
        Ok(())
    }

    /// Insert a cell that exists but is not yet materialized.
    pub fn insert_virtual_cell(&mut self, coord: Index2, grid: HeightGrid) -> Result<()> {
        let cell = BackingCell::new(grid)?;
        if cell.resolution() != self.resolution {
            return Err(StrataError::Config(format!(
                "cell {} resolution {} does not match store resolution {}",
                coord,
                cell.resolution(),
                self.resolution
            )));
        }
        self.cells.insert(coord, cell);
        Ok(())
    }

    /// Mark a previously inserted cell as materialized.
    pub fn materialize(&mut self, coord: Index2) -> Result<()> {
        if !self.cells.contains_key(&coord) {
            return Err(StrataError::UnknownCell {
                x: coord.x,
                y: coord.y,
            });
        }
        self.materialized.insert(coord);
        Ok(())
    }

    /// Number of queued writes not yet applied.
    pub fn pending_write_count(&self) -> usize {
        self.pending.len()
    }

    /// Direct read of one permanent height sample, bypassing the pending
    /// queue. Test and inspection helper.
    pub fn raw_height(&self, cell: Index2, x: u32, y: u32) -> Option<f32> {
        self.cells.get(&cell).map(|c| c.grid().get(x, y))
    }

    fn check_rect(&self, cell: Index2, rect: PatchRect) -> Result<()> {
        let end_x = rect.x.checked_add(rect.width);
        let end_y = rect.y.checked_add(rect.height);
        let in_bounds = match (end_x, end_y) {
            (Some(ex), Some(ey)) => {
                rect.width > 0 && rect.height > 0 && ex <= self.resolution && ey <= self.resolution
            }
            _ => false,
        };
        if !in_bounds {
            return Err(StrataError::PatchOutOfBounds {
                cell_x: cell.x,
                cell_y: cell.y,
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                resolution: self.resolution,
            });
        }
        Ok(())
    }

    fn apply_write(cells: &mut HashMap<Index2, BackingCell>, write: &PendingWrite) {
        if let Some(cell) = cells.get_mut(&write.cell) {
            let grid = cell.grid_mut();
            for dy in 0..write.rect.height {
                for dx in 0..write.rect.width {
                    let h = write.heights[(dy * write.rect.width + dx) as usize];
                    grid.set(write.rect.x + dx, write.rect.y + dy, h);
                }
            }
        }
    }
}

impl BackingStore for InMemoryBackingStore {
    fn cell_resolution(&self) -> u32 {
        self.resolution
    }

    fn has_cell(&self, cell: Index2) -> bool {
        self.cells.contains_key(&cell)
    }

    fn is_materialized(&self, cell: Index2) -> bool {
        self.materialized.contains(&cell)
    }

    fn read_patch(&mut self, cell: Index2, rect: PatchRect) -> Result<Vec<f32>> {
        self.check_rect(cell, rect)?;
        if !self.cells.contains_key(&cell) {
            return Err(StrataError::UnknownCell {
                x: cell.x,
                y: cell.y,
            });
        }
        if !self.materialized.contains(&cell) {
            return Err(StrataError::Config(format!(
                "read from unmaterialized cell {cell}"
            )));
        }

        // Queued writes against this cell become visible on read.
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].cell == cell {
                let write = self.pending.remove(i);
                Self::apply_write(&mut self.cells, &write);
            } else {
                i += 1;
            }
        }

        let grid = self.cells[&cell].grid();
        let mut heights = Vec::with_capacity((rect.width * rect.height) as usize);
        for dy in 0..rect.height {
            for dx in 0..rect.width {
                heights.push(grid.get(rect.x + dx, rect.y + dy));
            }
        }
        Ok(heights)
    }

    fn write_patch_deferred(
        &mut self,
        cell: Index2,
        rect: PatchRect,
        heights: &[f32],
    ) -> Result<()> {
        self.check_rect(cell, rect)?;
        if !self.cells.contains_key(&cell) {
            return Err(StrataError::UnknownCell {
                x: cell.x,
                y: cell.y,
            });
        }
        if heights.len() != (rect.width * rect.height) as usize {
            return Err(StrataError::Config(format!(
                "patch data length {} does not match rect [{}, {}]",
                heights.len(),
                rect.width,
                rect.height
            )));
        }

        self.pending.push(PendingWrite {
            cell,
            rect,
            heights: heights.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) {
        for write in std::mem::take(&mut self.pending) {
            Self::apply_write(&mut self.cells, &write);
        }
    }
}
