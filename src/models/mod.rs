pub mod artifact;
pub mod item;
pub mod job;
pub mod message;
