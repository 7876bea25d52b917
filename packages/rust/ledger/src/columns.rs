//! Column names shared by the master input and the ledger.

/// Header labels accepted for the company name column.
pub(crate) const NAME_ALIASES: &[&str] = &["name", "company", "company name", "business name"];

/// Header labels accepted for the website column.
pub(crate) const WEBSITE_ALIASES: &[&str] = &["website", "url", "homepage"];

/// Labels written for name/website when the ledger has no such column yet.
pub(crate) const NAME_COLUMN: &str = "Name";
pub(crate) const WEBSITE_COLUMN: &str = "Website";

pub(crate) const ADDRESS_COLUMN: &str = "address";
pub(crate) const STATUS_COLUMN: &str = "status";
pub(crate) const SOURCE_STAGE_COLUMN: &str = "source_stage";
pub(crate) const DETAIL_COLUMN: &str = "detail";
pub(crate) const RESOLVED_AT_COLUMN: &str = "resolved_at";

/// Columns owned by the resolver, appended after the input columns.
pub(crate) const RESULT_COLUMNS: &[&str] = &[
    ADDRESS_COLUMN,
    STATUS_COLUMN,
    SOURCE_STAGE_COLUMN,
    DETAIL_COLUMN,
    RESOLVED_AT_COLUMN,
];

/// Index of the first header matching any alias, case-insensitively.
pub(crate) fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().to_lowercase();
        aliases.iter().any(|a| h == *a)
    })
}

pub(crate) fn is_reserved(header: &str) -> bool {
    let h = header.trim().to_lowercase();
    NAME_ALIASES.contains(&h.as_str())
        || WEBSITE_ALIASES.contains(&h.as_str())
        || RESULT_COLUMNS.contains(&h.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_aliases_case_insensitively() {
        let headers: Vec<String> = vec!["Company Name".into(), "URL".into(), "Sector".into()];
        assert_eq!(find_column(&headers, NAME_ALIASES), Some(0));
        assert_eq!(find_column(&headers, WEBSITE_ALIASES), Some(1));
        assert_eq!(find_column(&headers, &[STATUS_COLUMN]), None);
    }

    #[test]
    fn reserved_columns() {
        assert!(is_reserved("Name"));
        assert!(is_reserved("Address"));
        assert!(!is_reserved("Sector"));
    }
}
