//! Pattern storage: `[pattern][track][step]` cells.

use crate::{DEFAULT_VELOCITY, MAX_PATTERNS, MAX_TRACKS, STEPS_PER_PATTERN};

/// A single step of one track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    /// Whether the step fires.
    pub active: bool,
    /// Velocity (0-127).
    pub velocity: u8,
}

impl Cell {
    /// An inactive cell at default velocity.
    pub const fn empty() -> Self {
        Self {
            active: false,
            velocity: DEFAULT_VELOCITY,
        }
    }

    pub const fn on(velocity: u8) -> Self {
        Self { active: true, velocity }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

type PatternCells = [[Cell; STEPS_PER_PATTERN]; MAX_TRACKS];

/// All stored patterns.
///
/// Every accessor is bounds-checked: reads outside the table return
/// [`Cell::empty`], writes outside it are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternBank {
    cells: [PatternCells; MAX_PATTERNS],
}

impl Default for PatternBank {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternBank {
    /// An empty bank: every cell inactive at default velocity.
    pub const fn new() -> Self {
        Self {
            cells: [[[Cell::empty(); STEPS_PER_PATTERN]; MAX_TRACKS]; MAX_PATTERNS],
        }
    }

    /// A bank with three factory grooves in patterns 0-2.
    ///
    /// Track layout: 0 kick, 1 snare, 2 closed hat, 3 open hat, 4 clap, 5 rim.
    pub fn with_demo_grooves() -> Self {
        let mut bank = Self::new();

        // 808 basic with accents
        for (step, vel) in [(0, 127), (4, 100), (8, 127), (12, 90)] {
            bank.set(0, 0, step, Cell::on(vel));
        }
        for (step, vel) in [(4, 127), (6, 60), (12, 127), (14, 70)] {
            bank.set(0, 1, step, Cell::on(vel));
        }
        for step in 0..STEPS_PER_PATTERN {
            let vel = match step {
                s if s % 4 == 0 => 110,
                s if s % 2 == 0 => 85,
                _ => 65,
            };
            bank.set(0, 2, step, Cell::on(vel));
        }
        for (step, vel) in [(2, 90), (6, 100), (10, 80), (14, 95)] {
            bank.set(0, 3, step, Cell::on(vel));
        }
        for step in [4, 12] {
            bank.set(0, 4, step, Cell::on(110));
        }
        for (step, vel) in [(3, 80), (7, 70), (11, 90), (15, 75)] {
            bank.set(0, 5, step, Cell::on(vel));
        }

        // Tresillo 3-3-2
        for (step, vel) in [(0, 127), (3, 100), (6, 120), (8, 110), (11, 95), (14, 115)] {
            bank.set(1, 0, step, Cell::on(vel));
        }
        for (step, vel) in [(0, 110), (3, 100), (6, 90), (10, 105), (12, 95)] {
            bank.set(1, 1, step, Cell::on(vel));
        }
        for step in (0..STEPS_PER_PATTERN).step_by(3) {
            let vel = if step % 6 == 0 { 100 } else { 75 };
            bank.set(1, 2, step, Cell::on(vel));
        }

        // Breakbeat shuffle
        for (step, vel) in [(0, 127), (2, 70), (5, 95), (7, 85), (10, 100), (13, 75), (15, 90)] {
            bank.set(2, 0, step, Cell::on(vel));
        }
        for (step, vel) in [(3, 60), (4, 127), (11, 65), (12, 127)] {
            bank.set(2, 1, step, Cell::on(vel));
        }
        for step in (0..STEPS_PER_PATTERN).step_by(2) {
            let vel = if step % 4 == 0 { 100 } else { 70 };
            bank.set(2, 2, step, Cell::on(vel));
            bank.set(2, 2, step + 1, Cell::on(50));
        }
        for (step, vel) in [(6, 95), (14, 100)] {
            bank.set(2, 3, step, Cell::on(vel));
        }

        bank
    }

    /// Read a cell; out-of-range indices give an empty cell.
    pub fn get(&self, pattern: usize, track: usize, step: usize) -> Cell {
        self.cells
            .get(pattern)
            .and_then(|p| p.get(track))
            .and_then(|t| t.get(step))
            .copied()
            .unwrap_or_default()
    }

    /// Mutable access to a cell, if the indices are valid.
    pub fn get_mut(&mut self, pattern: usize, track: usize, step: usize) -> Option<&mut Cell> {
        self.cells
            .get_mut(pattern)
            .and_then(|p| p.get_mut(track))
            .and_then(|t| t.get_mut(step))
    }

    /// Write a cell; ignored when out of range.
    pub fn set(&mut self, pattern: usize, track: usize, step: usize, cell: Cell) {
        if let Some(slot) = self.get_mut(pattern, track, step) {
            *slot = cell;
        }
    }

    /// Reset every cell of a pattern to inactive / default velocity.
    pub fn clear_pattern(&mut self, pattern: usize) {
        if let Some(p) = self.cells.get_mut(pattern) {
            *p = [[Cell::empty(); STEPS_PER_PATTERN]; MAX_TRACKS];
        }
    }

    /// Deactivate every step of one track in a pattern, keeping velocities.
    pub fn clear_track(&mut self, pattern: usize, track: usize) {
        if let Some(t) = self.cells.get_mut(pattern).and_then(|p| p.get_mut(track)) {
            for cell in t.iter_mut() {
                cell.active = false;
            }
        }
    }

    /// Copy all cells of `src` into `dst`. No-op on invalid indices.
    pub fn copy_pattern(&mut self, src: usize, dst: usize) {
        if src >= MAX_PATTERNS || dst >= MAX_PATTERNS {
            return;
        }
        self.cells[dst] = self.cells[src];
    }

    /// Number of active cells in a pattern.
    pub fn active_count(&self, pattern: usize) -> usize {
        self.cells
            .get(pattern)
            .map(|p| p.iter().flatten().filter(|c| c.active).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bank_is_empty() {
        let bank = PatternBank::new();
        for p in 0..MAX_PATTERNS {
            assert_eq!(bank.active_count(p), 0);
        }
        assert_eq!(bank.get(3, 2, 1), Cell::empty());
    }

    #[test]
    fn out_of_range_read_returns_default() {
        let bank = PatternBank::with_demo_grooves();
        assert_eq!(bank.get(MAX_PATTERNS, 0, 0), Cell::empty());
        assert_eq!(bank.get(0, MAX_TRACKS, 0), Cell::empty());
        assert_eq!(bank.get(0, 0, STEPS_PER_PATTERN), Cell::empty());
    }

    #[test]
    fn out_of_range_write_is_ignored() {
        let mut bank = PatternBank::new();
        bank.set(0, MAX_TRACKS, 0, Cell::on(10));
        bank.set(MAX_PATTERNS, 0, 0, Cell::on(10));
        assert_eq!(bank, PatternBank::new());
    }

    #[test]
    fn clear_track_keeps_velocity() {
        let mut bank = PatternBank::new();
        bank.set(0, 1, 5, Cell::on(42));
        bank.clear_track(0, 1);
        assert_eq!(bank.get(0, 1, 5), Cell { active: false, velocity: 42 });
    }

    #[test]
    fn copy_is_a_snapshot() {
        let mut bank = PatternBank::with_demo_grooves();
        bank.copy_pattern(0, 7);
        bank.set(0, 0, 1, Cell::on(3));
        assert_eq!(bank.get(7, 0, 1), Cell::empty());
        assert_eq!(bank.get(7, 0, 0), Cell::on(127));
    }

    #[test]
    fn demo_grooves_fill_first_three_patterns() {
        let bank = PatternBank::with_demo_grooves();
        assert!(bank.active_count(0) > 0);
        assert!(bank.active_count(1) > 0);
        assert!(bank.active_count(2) > 0);
        assert_eq!(bank.active_count(3), 0);
        // 16 closed hats in the basic groove, accented on the beat
        assert_eq!(bank.get(0, 2, 0).velocity, 110);
        assert_eq!(bank.get(0, 2, 2).velocity, 85);
        assert_eq!(bank.get(0, 2, 3).velocity, 65);
    }
}
