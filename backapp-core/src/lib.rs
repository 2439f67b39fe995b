pub mod catalog;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod explorer;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod recorder;
pub mod scheduler;
pub mod selector;
pub mod service;
pub mod session;
pub mod transfer;

pub use error::{
    BackupError, ConnectionError, Result, SchedulingError, SelectionError, SessionError,
    TransferError,
};
