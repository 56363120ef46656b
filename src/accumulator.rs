//! Sinogram accumulator: one flat array of 16-bit counters.
//!
//! The layout planner decides where each region lives; the accumulator only
//! owns the storage and hands out region slices. Counters wrap modulo 2^16,
//! so an increment followed by a decrement of the same cell always cancels,
//! which is what net-trues subtraction relies on.

use crate::error::ConfigError;
use crate::layout::{Region, RegionLayout, COUNTER_BYTES};

/// Signed 16-bit counter.
pub type Counter = i16;

/// Flat counter array sized by a [`RegionLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    cells: Vec<Counter>,
}

impl Accumulator {
    /// Allocate a zeroed accumulator for `layout`.
    ///
    /// The reservation is fallible so an oversized histogram is reported
    /// instead of aborting the process.
    pub fn allocate(layout: &RegionLayout) -> Result<Self, ConfigError> {
        let len = layout.total_counters();
        let bytes = len * COUNTER_BYTES;
        let len = usize::try_from(len).map_err(|_| ConfigError::AllocationFailed { bytes })?;

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| ConfigError::AllocationFailed { bytes })?;
        cells.resize(len, 0);
        Ok(Self { cells })
    }

    /// Number of counters.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the accumulator holds no counters.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Add one to a cell. Out-of-range cells are ignored.
    #[inline]
    pub fn increment(&mut self, cell: usize) {
        if let Some(c) = self.cells.get_mut(cell) {
            *c = c.wrapping_add(1);
        }
    }

    /// Subtract one from a cell. Out-of-range cells are ignored.
    #[inline]
    pub fn decrement(&mut self, cell: usize) {
        if let Some(c) = self.cells.get_mut(cell) {
            *c = c.wrapping_sub(1);
        }
    }

    /// Value of a cell.
    pub fn get(&self, cell: usize) -> Option<Counter> {
        self.cells.get(cell).copied()
    }

    /// Counters of one region.
    pub fn region(&self, layout: &RegionLayout, region: Region) -> &[Counter] {
        let range = layout.range(region);
        self.cells.get(range).unwrap_or(&[])
    }

    /// All counters.
    pub fn as_slice(&self) -> &[Counter] {
        &self.cells
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        self.cells.fill(0);
    }

    /// Sum of a region, for statistics and tests.
    pub fn region_sum(&self, layout: &RegionLayout, region: Region) -> i64 {
        self.region(layout, region)
            .iter()
            .map(|c| i64::from(*c))
            .sum()
    }
}
