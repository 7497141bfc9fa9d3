pub mod config;
pub mod db;
pub mod models;
pub mod worker;

pub use worker::{ProcessError, WorkerPool, WorkerStats};
