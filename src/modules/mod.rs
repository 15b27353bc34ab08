pub mod download;
pub mod queue;
