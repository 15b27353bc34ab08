pub mod process;
pub mod storage;
