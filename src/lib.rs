//! Read-through entity cache for reporting repositories, with relaxed-isolation
//! read interception for the backing store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod sql;
