//! Domain records served through the cache.

pub mod entities;

pub use entities::{Country, Currency, DailyAction, Game, WhiteLabel};
