//! Promotional image pipeline
//!
//! Jobs of product rows are stored in PostgreSQL and announced on a Redis
//! queue. The worker renders each row onto a template background, stores
//! the JPEG in S3-compatible storage and, on request, pushes the finished
//! artifacts to a named FTP target.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod render;
pub mod services;
pub mod worker;
