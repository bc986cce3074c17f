//! Test doubles for pcwjobs: an in-memory job store with failure
//! injection and scripted runners that record how they were driven.

mod runner;
mod store;

pub use runner::{RunStats, RunnerMode, TestRunner};
pub use store::{InMemoryJobStore, StoreWrite};
