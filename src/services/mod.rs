pub mod delivery;
pub mod jobs;
pub mod queue;
pub mod storage;
