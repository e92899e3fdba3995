//! Period selectors and folder resolution
//!
//! A run is requested either by month (`2024-01`, `January_2024`) or by back
//! content batch (`3`, `03`, `batch-3`, `Batch_03`, `medRxiv_Batch_03`). Every
//! spelling of the same period resolves to the same [`FolderReference`].
//!
//! Months from December 2018 onward live under `Current_Content/<Month>_<Year>/`.
//! Older content is only organised by batch number, so a month before the
//! cutoff cannot be resolved and the caller must name the batch instead.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::app::models::{ContentEra, FolderReference, Server};
use crate::constants::folder;
use crate::errors::{ConfigError, ConfigResult};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// One period after selector expansion
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodRequest {
    Month { year: i32, month: u32 },
    Batch(String),
}

impl std::fmt::Display for PeriodRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodRequest::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            PeriodRequest::Batch(label) => f.write_str(label),
        }
    }
}

/// Resolve a month or batch selector for `server`
///
/// Exactly one of `month` and `batch` must be supplied.
///
/// # Errors
///
/// Returns `ConfigError` for ambiguous selectors, malformed input, and months
/// before the current-content cutoff.
pub fn resolve_folder(
    month: Option<&str>,
    batch: Option<&str>,
    server: Server,
) -> ConfigResult<FolderReference> {
    match (month, batch) {
        (Some(month), None) => {
            let (year, month) = parse_month(month)?;
            resolve_month(year, month, server)
        }
        (None, Some(batch)) => resolve_batch(&normalize_batch(batch)?, server),
        _ => Err(ConfigError::AmbiguousSelector),
    }
}

/// Resolve an already expanded period request
pub fn resolve_period(request: &PeriodRequest, server: Server) -> ConfigResult<FolderReference> {
    match request {
        PeriodRequest::Month { year, month } => resolve_month(*year, *month, server),
        PeriodRequest::Batch(label) => resolve_batch(&normalize_batch(label)?, server),
    }
}

fn resolve_month(year: i32, month: u32, server: Server) -> ConfigResult<FolderReference> {
    if !is_current_content(year, month) {
        return Err(ConfigError::BackContentMonth {
            month: format!("{:04}-{:02}", year, month),
        });
    }

    let label = month_label(year, month)?;
    Ok(FolderReference {
        server,
        era: ContentEra::Current,
        prefix: format!("{}/{}/", folder::CURRENT_CONTENT_ROOT, label),
        batch_label: label,
    })
}

fn resolve_batch(label: &str, server: Server) -> ConfigResult<FolderReference> {
    // A server-qualified label names its own server
    let server = Server::strip_prefix(label)
        .map(|(qualified, _)| qualified)
        .unwrap_or(server);

    Ok(FolderReference {
        server,
        era: ContentEra::Back,
        batch_label: label.to_string(),
        prefix: format!("{}/{}/", folder::BACK_CONTENT_ROOT, label),
    })
}

/// Whether a month falls at or after the December 2018 cutoff
pub fn is_current_content(year: i32, month: u32) -> bool {
    (year, month) >= (folder::CUTOFF_YEAR, folder::CUTOFF_MONTH)
}

/// `Month_Year` label for a month, e.g. `January_2024`
pub fn month_label(year: i32, month: u32) -> ConfigResult<String> {
    let name = month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .ok_or_else(|| ConfigError::InvalidMonth {
            input: format!("{}-{}", year, month),
        })?;
    Ok(format!("{}_{}", name, year))
}

/// Parse `YYYY-MM` or `Name_YYYY` into `(year, month)`
pub fn parse_month(input: &str) -> ConfigResult<(i32, u32)> {
    let trimmed = input.trim();
    let invalid = || ConfigError::InvalidMonth {
        input: input.to_string(),
    };

    if let Some((year, month)) = trimmed.split_once('-') {
        let year = parse_year(year).ok_or_else(invalid)?;
        if month.is_empty() || month.len() > 2 || !month.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        return Ok((year, month));
    }

    if let Some((name, year)) = trimmed.split_once('_') {
        let year = parse_year(year).ok_or_else(invalid)?;
        let month = month_from_name(name).ok_or_else(invalid)?;
        return Ok((year, month));
    }

    Err(invalid())
}

fn parse_year(input: &str) -> Option<i32> {
    if input.len() == 4 && input.bytes().all(|b| b.is_ascii_digit()) {
        input.parse().ok()
    } else {
        None
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|candidate| {
            candidate.eq_ignore_ascii_case(name)
                || (name.len() == 3 && candidate[..3].eq_ignore_ascii_case(name))
        })
        .map(|idx| idx as u32 + 1)
}

/// Normalize any accepted batch spelling to `Batch_NN` or `<Server>_Batch_NN`
///
/// Normalization is idempotent: feeding the output back in returns it unchanged.
///
/// # Errors
///
/// Returns `ConfigError::InvalidBatch` for non-numeric or non-positive batches.
pub fn normalize_batch(input: &str) -> ConfigResult<String> {
    let invalid = || ConfigError::InvalidBatch {
        input: input.to_string(),
    };

    let mut rest = input.trim();
    let server = match Server::strip_prefix(rest) {
        Some((server, remainder)) => {
            rest = remainder.trim_start_matches(is_separator);
            Some(server)
        }
        None => None,
    };

    if let Some(head) = rest.get(..5) {
        if head.eq_ignore_ascii_case("batch") {
            rest = rest[5..].trim_start_matches(is_separator);
        }
    }

    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let number: u32 = rest.parse().map_err(|_| invalid())?;
    if number == 0 {
        return Err(invalid());
    }

    Ok(batch_label(number, server))
}

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | ' ')
}

/// Label for a batch number, optionally qualified by server
pub fn batch_label(number: u32, server: Option<Server>) -> String {
    let base = format!(
        "Batch_{:0width$}",
        number,
        width = folder::BATCH_PAD_WIDTH
    );
    match server {
        Some(server) => format!("{}_{}", server.canonical_name(), base),
        None => base,
    }
}

/// Expand a `--month` selector: single month, comma list, or `YYYY-*`
///
/// A wildcard covers the months of that year at or after the cutoff and not
/// after `today`. Explicit months are kept as given so that a pre-cutoff month
/// still reaches the resolver and produces its guidance error.
pub fn expand_month_selector(input: &str, today: NaiveDate) -> ConfigResult<Vec<PeriodRequest>> {
    let mut periods = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(year) = part.strip_suffix("-*") {
            let year = parse_year(year).ok_or_else(|| ConfigError::InvalidMonth {
                input: part.to_string(),
            })?;
            for month in 1..=12 {
                let in_range = is_current_content(year, month)
                    && (year, month) <= (today.year(), today.month());
                if in_range {
                    push_unique(&mut periods, PeriodRequest::Month { year, month });
                }
            }
        } else {
            let (year, month) = parse_month(part)?;
            push_unique(&mut periods, PeriodRequest::Month { year, month });
        }
    }

    if periods.is_empty() {
        return Err(ConfigError::EmptySelection {
            input: input.to_string(),
        });
    }
    Ok(periods)
}

/// Expand a `--batch` selector: single batch, `N-M` range, or comma list
pub fn expand_batch_selector(input: &str) -> ConfigResult<Vec<PeriodRequest>> {
    let mut periods = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match numeric_range(part) {
            Some((start, end)) => {
                if start == 0 || start > end {
                    return Err(ConfigError::InvalidBatch {
                        input: part.to_string(),
                    });
                }
                for number in start..=end {
                    push_unique(&mut periods, PeriodRequest::Batch(batch_label(number, None)));
                }
            }
            None => push_unique(&mut periods, PeriodRequest::Batch(normalize_batch(part)?)),
        }
    }

    if periods.is_empty() {
        return Err(ConfigError::EmptySelection {
            input: input.to_string(),
        });
    }
    Ok(periods)
}

/// `N-M` where both sides are bare integers; `batch-3` is not a range
fn numeric_range(part: &str) -> Option<(u32, u32)> {
    let (start, end) = part.split_once('-')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if digits(start) && digits(end) {
        Some((start.parse().ok()?, end.parse().ok()?))
    } else {
        None
    }
}

fn push_unique(periods: &mut Vec<PeriodRequest>, period: PeriodRequest) {
    if !periods.contains(&period) {
        periods.push(period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_month_spellings_resolve_identically() {
        let a = resolve_folder(Some("2024-01"), None, Server::Biorxiv).unwrap();
        let b = resolve_folder(Some("January_2024"), None, Server::Biorxiv).unwrap();
        let c = resolve_folder(Some("january_2024"), None, Server::Biorxiv).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.era, ContentEra::Current);
        assert_eq!(a.batch_label, "January_2024");
        assert_eq!(a.prefix, "Current_Content/January_2024/");
    }

    #[test]
    fn test_cutoff_boundary() {
        let december = resolve_folder(Some("2018-12"), None, Server::Biorxiv).unwrap();
        assert_eq!(december.era, ContentEra::Current);
        assert_eq!(december.batch_label, "December_2018");

        for month in ["2018-11", "2017-06", "November_2018"] {
            let err = resolve_folder(Some(month), None, Server::Biorxiv).unwrap_err();
            assert!(matches!(err, ConfigError::BackContentMonth { .. }));
        }
    }

    #[test]
    fn test_every_month_after_cutoff_is_current() {
        for year in 2018..=2030 {
            for month in 1..=12 {
                let result = resolve_period(&PeriodRequest::Month { year, month }, Server::Biorxiv);
                if is_current_content(year, month) {
                    assert_eq!(result.unwrap().era, ContentEra::Current);
                } else {
                    assert!(result.is_err());
                }
            }
        }
    }

    #[test]
    fn test_ambiguous_selectors() {
        assert!(matches!(
            resolve_folder(None, None, Server::Biorxiv),
            Err(ConfigError::AmbiguousSelector)
        ));
        assert!(matches!(
            resolve_folder(Some("2024-01"), Some("1"), Server::Biorxiv),
            Err(ConfigError::AmbiguousSelector)
        ));
    }

    #[test]
    fn test_invalid_months() {
        for input in ["2024-13", "2024-00", "24-01", "2024/01", "Jan2024", "Smarch_2024", ""] {
            assert!(
                matches!(parse_month(input), Err(ConfigError::InvalidMonth { .. })),
                "{input} should be rejected"
            );
        }
        assert_eq!(parse_month("Feb_2020").unwrap(), (2020, 2));
    }

    #[test]
    fn test_normalize_batch_spellings() {
        for input in ["1", "01", "001", "batch-1", "Batch_01", "BATCH 1", "batch_001"] {
            assert_eq!(normalize_batch(input).unwrap(), "Batch_01", "input {input}");
        }
        assert_eq!(normalize_batch("12").unwrap(), "Batch_12");
        assert_eq!(normalize_batch("123").unwrap(), "Batch_123");
        assert_eq!(
            normalize_batch("medrxiv-batch-3").unwrap(),
            "medRxiv_Batch_03"
        );
    }

    #[test]
    fn test_normalize_batch_is_idempotent() {
        for input in ["7", "batch-12", "medRxiv_Batch_3", "bioRxiv_Batch_100"] {
            let once = normalize_batch(input).unwrap();
            assert_eq!(normalize_batch(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_invalid_batches() {
        for input in ["0", "Batch_00", "-1", "abc", "batch-", "", "1.5"] {
            assert!(
                matches!(normalize_batch(input), Err(ConfigError::InvalidBatch { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_batch_always_back_content() {
        let folder = resolve_folder(None, Some("batch-4"), Server::Biorxiv).unwrap();
        assert_eq!(folder.era, ContentEra::Back);
        assert_eq!(folder.prefix, "Back_Content/Batch_04/");

        let qualified = resolve_folder(None, Some("medRxiv_Batch_2"), Server::Biorxiv).unwrap();
        assert_eq!(qualified.server, Server::Medrxiv);
        assert_eq!(qualified.batch_label, "medRxiv_Batch_02");
    }

    #[test]
    fn test_expand_month_wildcard() {
        let periods = expand_month_selector("2024-*", today()).unwrap();
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0], PeriodRequest::Month { year: 2024, month: 1 });

        let periods = expand_month_selector("2018-*", today()).unwrap();
        assert_eq!(periods, vec![PeriodRequest::Month { year: 2018, month: 12 }]);

        assert!(matches!(
            expand_month_selector("2030-*", today()),
            Err(ConfigError::EmptySelection { .. })
        ));
    }

    #[test]
    fn test_expand_month_list_dedupes() {
        let periods = expand_month_selector("2024-01, January_2024,2024-02", today()).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[1].to_string(), "2024-02");
    }

    #[test]
    fn test_expand_batch_ranges_and_lists() {
        let periods = expand_batch_selector("1-3,batch-5,03").unwrap();
        let labels: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
        assert_eq!(labels, vec!["Batch_01", "Batch_02", "Batch_03", "Batch_05"]);

        assert!(expand_batch_selector("5-2").is_err());
        assert!(expand_batch_selector("0-2").is_err());
        assert!(expand_batch_selector(" , ").is_err());
    }
}
