//! Master input loading.

use std::path::Path;

use tracing::info;

use officefinder_shared::{CompanyRecord, OfficeFinderError, Result};

use crate::columns::{NAME_ALIASES, WEBSITE_ALIASES, find_column, is_reserved};

/// Load the ordered master sequence of companies from a CSV file.
///
/// The header must contain a name column (`Name`, `Company`, ...). A website
/// column is optional. Every other non-reserved column is kept in
/// [`CompanyRecord::extra`] so it can be carried into the ledger.
pub fn load_master(path: &Path) -> Result<Vec<CompanyRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", path.display())))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", path.display())))?
        .iter()
        .map(str::to_string)
        .collect();

    let name_idx = find_column(&headers, NAME_ALIASES).ok_or_else(|| {
        OfficeFinderError::validation(format!(
            "{}: no company name column (expected one of: Name, Company, Company Name)",
            path.display()
        ))
    })?;
    let website_idx = find_column(&headers, WEBSITE_ALIASES);

    let extra_columns: Vec<usize> = (0..headers.len())
        .filter(|&i| i != name_idx && Some(i) != website_idx && !is_reserved(&headers[i]))
        .collect();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", path.display())))?;

        let name = record.get(name_idx).unwrap_or_default().to_string();
        if name.is_empty() {
            // +2: one for the header line, one for 1-based numbering.
            return Err(OfficeFinderError::validation(format!(
                "{}: line {} has an empty company name",
                path.display(),
                row + 2
            )));
        }

        let website = website_idx
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string();

        let extra = extra_columns
            .iter()
            .map(|&i| {
                (
                    headers[i].clone(),
                    record.get(i).unwrap_or_default().to_string(),
                )
            })
            .collect();

        records.push(CompanyRecord {
            name,
            website,
            extra,
        });
    }

    info!(count = records.len(), path = %path.display(), "loaded master input");
    Ok(records)
}
