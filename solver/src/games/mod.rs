//! Game-rule modules shipped with the engine.

pub mod column_race;

pub use column_race::{ColumnRace, RaceRules, RaceState};
