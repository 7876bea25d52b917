//! The persistent results ledger.
//!
//! The ledger is a CSV file holding one row per processed company, in master
//! order. Its row count doubles as the resume offset for the next run. Writes
//! go through a temporary file in the same directory and are renamed into
//! place, so an interrupted run never leaves a truncated ledger behind.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use officefinder_shared::{
    ADDRESS_NOT_FOUND, AddressResult, CompanyRecord, OfficeFinderError, RATE_LIMITED, Resolution,
    Result, SourceStage,
};

use crate::columns::{
    ADDRESS_COLUMN, DETAIL_COLUMN, NAME_ALIASES, NAME_COLUMN, RESOLVED_AT_COLUMN, RESULT_COLUMNS,
    SOURCE_STAGE_COLUMN, STATUS_COLUMN, WEBSITE_ALIASES, WEBSITE_COLUMN, find_column, is_reserved,
};

/// Address text written by older runs when an API quota was hit.
const LEGACY_RATE_LIMIT: &str = "API_LIMIT_REACHED";

/// One processed company as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub company: CompanyRecord,
    pub result: AddressResult,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Entry stamped with the current time.
    pub fn new(company: CompanyRecord, result: AddressResult) -> Self {
        Self {
            company,
            result,
            resolved_at: Some(Utc::now()),
        }
    }
}

/// In-memory view of the ledger file.
///
/// Rows are kept as raw strings so columns this crate does not know about
/// survive a rewrite untouched.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Ledger {
    /// Read the ledger at `path`. A missing file is an empty ledger.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!("no ledger yet");
            return Ok(Self {
                path,
                headers: Vec::new(),
                rows: Vec::new(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", path.display())))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", path.display())))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", path.display())))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(rows = rows.len(), columns = headers.len(), "ledger loaded");
        Ok(Self {
            path,
            headers,
            rows,
        })
    }

    /// Number of processed records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Master position where the next run starts.
    ///
    /// A non-empty ledger resumes right after its last row. An empty or
    /// missing ledger starts at `default_skip`.
    pub fn resume_offset(&self, default_skip: usize) -> usize {
        if self.rows.is_empty() {
            default_skip
        } else {
            self.rows.len()
        }
    }

    /// Typed view of every row.
    ///
    /// Rows written before the `status` column existed are interpreted from
    /// their address text (see [`interpret_legacy`]).
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let name_idx = find_column(&self.headers, NAME_ALIASES).ok_or_else(|| {
            OfficeFinderError::ledger(format!(
                "{}: no company name column",
                self.path.display()
            ))
        })?;
        let website_idx = find_column(&self.headers, WEBSITE_ALIASES);
        let address_idx = find_column(&self.headers, &[ADDRESS_COLUMN]);
        let status_idx = find_column(&self.headers, &[STATUS_COLUMN]);
        let stage_idx = find_column(&self.headers, &[SOURCE_STAGE_COLUMN]);
        let detail_idx = find_column(&self.headers, &[DETAIL_COLUMN]);
        let resolved_idx = find_column(&self.headers, &[RESOLVED_AT_COLUMN]);

        let extra_columns: Vec<usize> = (0..self.headers.len())
            .filter(|&i| !is_reserved(&self.headers[i]))
            .collect();

        let entries = self
            .rows
            .iter()
            .map(|row| {
                let cell = |idx: Option<usize>| {
                    idx.and_then(|i| row.get(i))
                        .map(String::as_str)
                        .unwrap_or_default()
                };

                let company = CompanyRecord {
                    name: cell(Some(name_idx)).to_string(),
                    website: cell(website_idx).to_string(),
                    extra: extra_columns
                        .iter()
                        .map(|&i| (self.headers[i].clone(), cell(Some(i)).to_string()))
                        .collect(),
                };

                let resolution = interpret(cell(status_idx), cell(address_idx), cell(detail_idx));
                let source_stage =
                    SourceStage::from_column(cell(stage_idx)).unwrap_or(SourceStage::Search);
                let resolved_at = DateTime::parse_from_rfc3339(cell(resolved_idx))
                    .ok()
                    .map(|t| t.with_timezone(&Utc));

                LedgerEntry {
                    company,
                    result: AddressResult::new(resolution, source_stage),
                    resolved_at,
                }
            })
            .collect();

        Ok(entries)
    }

    /// Append `entries` after the existing rows and rewrite the file.
    ///
    /// The header becomes the union of the existing header and every column
    /// the new entries need. Older rows are padded with empty cells.
    #[instrument(skip_all, fields(path = %self.path.display(), new_rows = entries.len()))]
    pub fn append(&mut self, entries: &[LedgerEntry]) -> Result<()> {
        if entries.is_empty() {
            debug!("nothing to append");
            return Ok(());
        }

        let mut headers = self.headers.clone();
        let widest = self.rows.iter().map(Vec::len).max().unwrap_or_default();
        if widest > headers.len() {
            warn!(
                header = headers.len(),
                widest,
                "ledger rows wider than header, naming the unlabelled columns"
            );
            while headers.len() < widest {
                headers.push(format!("column_{}", headers.len() + 1));
            }
        }
        let name_idx = column_or_insert(&mut headers, NAME_ALIASES, NAME_COLUMN);
        let website_idx = column_or_insert(&mut headers, WEBSITE_ALIASES, WEBSITE_COLUMN);
        for entry in entries {
            for (label, _) in &entry.company.extra {
                let key = label.trim().to_lowercase();
                column_or_insert(&mut headers, &[key.as_str()], label);
            }
        }
        let result_idx: Vec<usize> = RESULT_COLUMNS
            .iter()
            .map(|&col| column_or_insert(&mut headers, &[col], col))
            .collect();

        let mut rows = self.rows.clone();
        for row in &mut rows {
            row.resize(headers.len(), String::new());
        }

        for entry in entries {
            let mut row = vec![String::new(); headers.len()];
            row[name_idx] = entry.company.name.clone();
            row[website_idx] = entry.company.website.clone();
            for (label, value) in &entry.company.extra {
                let key = label.trim().to_lowercase();
                if let Some(i) = find_column(&headers, &[key.as_str()]) {
                    row[i] = value.clone();
                }
            }
            for (idx, value) in result_idx.iter().zip(result_cells(entry)) {
                row[*idx] = value;
            }
            rows.push(row);
        }

        write_atomic(&self.path, &headers, &rows)?;

        info!(total_rows = rows.len(), "ledger written");
        self.headers = headers;
        self.rows = rows;
        Ok(())
    }
}

/// Resume offset for the ledger at `path`.
///
/// See [`Ledger::resume_offset`].
pub fn load_resume_offset(path: &Path, default_skip: usize) -> Result<usize> {
    Ok(Ledger::open(path)?.resume_offset(default_skip))
}

/// Interpret a row from its `status` column, falling back to the address text.
fn interpret(status: &str, address: &str, detail: &str) -> Resolution {
    match status.trim() {
        "found" if !address.trim().is_empty() => Resolution::Found {
            address: address.trim().to_string(),
        },
        "found" | "not_found" => Resolution::NotFound,
        "rate_limited" => Resolution::RateLimited,
        "failed" => Resolution::Failed {
            reason: detail.to_string(),
        },
        _ => interpret_legacy(address),
    }
}

/// Interpret a row that only carries free-form address text.
///
/// Older ledgers stored outcomes in the address column itself: an address,
/// a "not found" phrase, `API_LIMIT_REACHED`, or `Error: ...`.
pub fn interpret_legacy(address: &str) -> Resolution {
    let text = address.trim();
    let lower = text.to_lowercase();

    if text.is_empty()
        || text == ADDRESS_NOT_FOUND
        || lower.contains("address not found")
        || lower.contains("no address found")
    {
        return Resolution::NotFound;
    }
    if text == LEGACY_RATE_LIMIT || text == RATE_LIMITED {
        return Resolution::RateLimited;
    }
    for prefix in ["Error:", "failed:"] {
        if let Some(reason) = text.strip_prefix(prefix) {
            return Resolution::Failed {
                reason: reason.trim().to_string(),
            };
        }
    }
    Resolution::Found {
        address: text.to_string(),
    }
}

/// Cells for [`RESULT_COLUMNS`]. A failure keeps its reason in `detail` and
/// leaves `address` empty.
fn result_cells(entry: &LedgerEntry) -> [String; 5] {
    let resolution = &entry.result.resolution;
    let (address, detail) = match resolution {
        Resolution::Failed { reason } => (String::new(), reason.clone()),
        other => (other.to_string(), String::new()),
    };
    [
        address,
        resolution.status().to_string(),
        entry.result.source_stage.as_str().to_string(),
        detail,
        entry
            .resolved_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
    ]
}

fn column_or_insert(headers: &mut Vec<String>, aliases: &[&str], label: &str) -> usize {
    find_column(headers, aliases).unwrap_or_else(|| {
        headers.push(label.to_string());
        headers.len() - 1
    })
}

fn write_atomic(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OfficeFinderError::io(parent, e))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut writer = csv::Writer::from_path(&tmp)
        .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", tmp.display())))?;
    writer
        .write_record(headers)
        .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", tmp.display())))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| OfficeFinderError::ledger(format!("{}: {e}", tmp.display())))?;
    }
    writer.flush().map_err(|e| OfficeFinderError::io(&tmp, e))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|e| OfficeFinderError::io(path, e))
}
