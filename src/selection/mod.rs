//! Selection model: ordered items plus one clamped cursor.
//!
//! Every operation is O(1), does no I/O, and returns whether the index
//! changed so the caller knows when to notify the visibility sink.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::core::config::Orientation;
use crate::snapshot::Item;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionModel {
    items: Vec<Item>,
    index: Option<usize>,
    orientation: Orientation,
    columns: usize,
}

impl SelectionModel {
    /// `columns` is floored at 1.
    #[must_use]
    pub fn new(orientation: Orientation, columns: usize) -> Self {
        Self {
            items: Vec::new(),
            index: None,
            orientation,
            columns: columns.max(1),
        }
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    #[must_use]
    pub const fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub fn current(&self) -> Option<&Item> {
        self.index.and_then(|i| self.items.get(i))
    }

    /// Replace the list wholesale, re-clamping the cursor.
    pub fn set_items(&mut self, items: Vec<Item>) -> bool {
        let before = self.index;
        self.items = items;
        self.index = match (self.items.len(), before) {
            (0, _) => None,
            (_, None) => Some(0),
            (len, Some(i)) => Some(i.min(len - 1)),
        };
        self.index != before
    }

    /// Step along a single row or column. Linear orientation only.
    pub fn move_linear(&mut self, delta: isize) -> bool {
        if self.orientation != Orientation::Linear {
            return false;
        }
        self.step_clamped(delta)
    }

    /// Step within the grid. Horizontal moves stay in the current row and a
    /// target past the last item is rejected.
    pub fn move_grid(&mut self, dx: isize, dy: isize) -> bool {
        if self.orientation != Orientation::Grid {
            return false;
        }
        let Some(current) = self.index else {
            return false;
        };
        let cols = self.columns as isize;
        let row = current as isize / cols;
        let col = current as isize % cols;

        let new_col = col + dx;
        if !(0..cols).contains(&new_col) {
            return false;
        }
        let new_row = row + dy;
        if new_row < 0 {
            return false;
        }
        let target = new_row * cols + new_col;
        if target >= self.items.len() as isize {
            return false;
        }
        self.set_index(target as usize)
    }

    /// Pointer selection. Out-of-range indices are ignored.
    pub fn select_index_direct(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.set_index(index)
    }

    /// Move to the first item matching `pred`; no match leaves the cursor alone.
    pub fn select_where<P>(&mut self, pred: P) -> bool
    where
        P: Fn(&Item) -> bool,
    {
        match self.items.iter().position(pred) {
            Some(i) => self.set_index(i),
            None => false,
        }
    }

    /// Wheel input: linear steps in either orientation, clamped at the ends.
    pub fn move_by_wheel(&mut self, steps: isize) -> bool {
        self.step_clamped(steps)
    }

    /// Change the grid width. The index is kept; only its row/column shift.
    pub fn set_columns(&mut self, columns: usize) -> bool {
        self.columns = columns.max(1);
        false
    }

    fn step_clamped(&mut self, delta: isize) -> bool {
        let Some(current) = self.index else {
            return false;
        };
        let last = self.items.len() as isize - 1;
        let target = (current as isize).saturating_add(delta).clamp(0, last);
        self.set_index(target as usize)
    }

    fn set_index(&mut self, index: usize) -> bool {
        let changed = self.index != Some(index);
        self.index = Some(index);
        changed
    }
}
