use std::time::Duration;

use serde::Serialize;

use crate::constants::OUTPUT_HEADERS;
use crate::error::BatchError;
use crate::npi::lookup_npi;
use crate::registry::RegistryClient;
use crate::sheet::{Book, Sheet};

/// Condensed per-row record of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchLogEntry {
    pub npi: String,
    pub provider_name: String,
    pub primary_practice_address: String,
    pub status: String,
    pub error: String,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub book: Book,
    pub log: Vec<BatchLogEntry>,
}

impl BatchOutcome {
    pub fn failed_count(&self) -> usize {
        self.log.iter().filter(|e| !e.error.is_empty()).count()
    }
}

/// Looks up every identifier in column A of the book's target sheet and writes
/// the results beside it. Other sheets are carried through untouched.
pub async fn run_batch(
    registry: &RegistryClient,
    mut book: Book,
    delay: Duration,
) -> Result<BatchOutcome, BatchError> {
    let rows = book.target().identifier_rows();
    let log = process_batch(registry, book.target_mut(), &rows, delay).await?;
    Ok(BatchOutcome { book, log })
}

/// Processes `rows` strictly in order, one registry request at a time, with
/// `delay` between successive requests.
///
/// Lookup failures are recorded in the row and never abort the batch.
pub async fn process_batch(
    registry: &RegistryClient,
    sheet: &mut Sheet,
    rows: &[(usize, String)],
    delay: Duration,
) -> Result<Vec<BatchLogEntry>, BatchError> {
    if rows.is_empty() {
        return Err(BatchError::NoInput);
    }

    for (col, title) in OUTPUT_HEADERS.iter().enumerate() {
        sheet.set(1, col + 1, *title);
    }

    tracing::info!("Processing batch of {} NPIs", rows.len());
    let mut log = Vec::with_capacity(rows.len());
    for (i, (row, npi)) in rows.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let info = lookup_npi(registry, npi).await;
        sheet.set(*row, 1, npi.as_str());
        for (offset, value) in info.columns().into_iter().enumerate() {
            sheet.set(*row, offset + 2, value);
        }
        tracing::debug!(row, npi = npi.as_str(), error = info.error.as_str(), "row done");

        log.push(BatchLogEntry {
            npi: npi.clone(),
            provider_name: info.provider_name,
            primary_practice_address: info.primary_practice_address,
            status: info.status,
            error: info.error,
        });
    }

    let failed = log.iter().filter(|e| !e.error.is_empty()).count();
    tracing::info!(
        "Batch done: processed={} ok={} failed={}",
        log.len(),
        log.len() - failed,
        failed
    );
    Ok(log)
}
