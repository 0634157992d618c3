//! Engine-level errors.

use crate::history::HistoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("history store unavailable: {0}")]
    History(#[from] HistoryError),
    #[error("live tracker worker has stopped")]
    WorkerGone,
    #[error("failed to spawn live tracker worker: {0}")]
    Spawn(#[source] std::io::Error),
}
