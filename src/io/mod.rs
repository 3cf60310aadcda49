//! Results persistence: CSV tables under `results/tables` and JSON model
//! snapshots under `results/models`.

pub mod artifact;
pub mod export;
