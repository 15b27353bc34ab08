pub mod local;

pub use local::{OutputDir, TempSlot};
