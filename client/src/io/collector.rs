//! Delivery of harvested flags to the farm server.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::types::FlagRecord;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request to farm server failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("farm server answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Destination for batches of flags.
///
/// A failed delivery must leave the caller free to retry the same batch.
pub trait Collector {
    fn deliver(&self, batch: &[FlagRecord]) -> Result<(), DeliveryError>;
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    fn deliver(&self, batch: &[FlagRecord]) -> Result<(), DeliveryError> {
        (**self).deliver(batch)
    }
}

/// One `/api/post_flags` entry.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PostedFlag<'a> {
    pub flag: &'a str,
    pub sploit: &'a str,
    pub team: &'a str,
}

/// Tag every record in `batch` with the submitting sploit's name.
pub fn post_payload<'a>(batch: &'a [FlagRecord], sploit: &'a str) -> Vec<PostedFlag<'a>> {
    batch
        .iter()
        .map(|record| PostedFlag {
            flag: &record.flag,
            sploit,
            team: &record.team,
        })
        .collect()
}
