use crate::types::WorkflowRecord;
use regex::Regex;
use tracing::warn;

/// Name selector for workflow records. A pattern that is not a valid regular
/// expression is matched as a literal substring.
#[derive(Debug, Clone)]
pub enum NameMatcher {
    Regex(Regex),
    Literal(String),
}

impl NameMatcher {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => Self::Regex(re),
            Err(e) => {
                warn!(pattern, error = %e, "invalid DAG name pattern, matching literally");
                Self::Literal(pattern.to_string())
            }
        }
    }

    /// Unanchored: the pattern may match anywhere in the name.
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(name),
            Self::Literal(text) => name.contains(text.as_str()),
        }
    }
}

/// Keep the records whose id matches `name_pattern`, in their original order.
/// An empty pattern keeps everything.
pub fn filter_records(records: Vec<WorkflowRecord>, name_pattern: &str) -> Vec<WorkflowRecord> {
    let matcher = NameMatcher::new(name_pattern);
    records
        .into_iter()
        .filter(|r| matcher.is_match(&r.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(ids: &[&str]) -> Vec<WorkflowRecord> {
        ids.iter()
            .map(|id| WorkflowRecord {
                id: id.to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn ids(records: &[WorkflowRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn prefix_pattern_keeps_matching_ids_in_order() {
        let kept = filter_records(records(&["ml_train", "etl_daily", "etl_hourly"]), "^etl_");
        assert_eq!(ids(&kept), ["etl_daily", "etl_hourly"]);
    }

    #[test]
    fn match_is_unanchored() {
        let kept = filter_records(records(&["etl_daily", "daily_report", "weekly"]), "daily");
        assert_eq!(ids(&kept), ["etl_daily", "daily_report"]);
    }

    #[test]
    fn empty_pattern_keeps_everything() {
        let kept = filter_records(records(&["a", "b"]), "");
        assert_eq!(ids(&kept), ["a", "b"]);
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(filter_records(records(&["a", "b"]), "zzz").is_empty());
    }

    #[test]
    fn invalid_regex_is_matched_literally() {
        let matcher = NameMatcher::new("etl_(daily");
        assert!(matches!(matcher, NameMatcher::Literal(_)));
        let kept = filter_records(records(&["etl_(daily)", "etl_daily"]), "etl_(daily");
        assert_eq!(ids(&kept), ["etl_(daily)"]);
    }
}
