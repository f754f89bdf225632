//! Application layer: caching repositories and background prewarm.

pub mod daily;
pub mod error;
pub mod prewarm;
pub mod repos;
pub mod repository;
