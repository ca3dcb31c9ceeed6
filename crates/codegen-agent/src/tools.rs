//! Tool sets the agent can be equipped with
pub mod database;
pub mod postgres;
pub mod snapshot;
