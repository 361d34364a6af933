//! Recovery of the DAG list from a workflow CLI response.
//!
//! The proxy answers with `{"stderr": "<b64>", "stdout": "<b64>"}`. Decoded
//! stdout is the CLI's console output: log lines, warnings and banners may
//! surround the JSON array we want, so the array is located by scanning
//! rather than by parsing the whole stream.

use crate::error::{DppError, Result};
use crate::types::WorkflowRecord;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer};

const DAG_KEY: &str = "\"dag_id\"";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CliResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stderr: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stdout: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

impl CliResponse {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DppError::Upstream(format!("workflow CLI response is not an envelope: {e}")))
    }

    pub fn decoded_stdout(&self) -> Result<String> {
        decode_stream("stdout", &self.stdout)
    }

    pub fn decoded_stderr(&self) -> Result<String> {
        decode_stream("stderr", &self.stderr)
    }
}

/// Base64-decode one stream; invalid UTF-8 is replaced, not rejected.
pub fn decode_stream(name: &str, encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| DppError::Upstream(format!("{name} is not valid base64: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Locate the first JSON array of DAG objects embedded in `text`.
///
/// A candidate starts at `[` followed (whitespace aside) by `{` and the
/// `"dag_id"` key. It ends at the bracket that closes it, with string
/// literals skipped. Candidates that never close or fail to parse are
/// passed over.
pub fn find_dag_list(text: &str) -> Option<&str> {
    first_dag_list(text).map(|(slice, _)| slice)
}

/// Parse the first DAG list found in `text`.
pub fn parse_dag_list(text: &str) -> Result<Vec<WorkflowRecord>> {
    match first_dag_list(text) {
        Some((_, records)) => Ok(records),
        None => Err(DppError::NoStructuredOutput(format!(
            "no DAG list in {} bytes of command output",
            text.len()
        ))),
    }
}

/// Envelope body straight to records.
pub fn extract_records(raw: &str) -> Result<Vec<WorkflowRecord>> {
    let response = CliResponse::parse(raw)?;
    let stdout = response.decoded_stdout()?;
    parse_dag_list(&stdout)
}

fn first_dag_list(text: &str) -> Option<(&str, Vec<WorkflowRecord>)> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(offset) = text[from..].find('[') {
        let start = from + offset;
        from = start + 1;
        if !opens_dag_list(&text[start + 1..]) {
            continue;
        }
        let Some(end) = closing_bracket(bytes, start) else {
            continue;
        };
        let candidate = &text[start..=end];
        if let Ok(records) = serde_json::from_str::<Vec<WorkflowRecord>>(candidate) {
            return Some((candidate, records));
        }
    }
    None
}

fn opens_dag_list(rest: &str) -> bool {
    rest.trim_start()
        .strip_prefix('{')
        .map(|after| after.trim_start().starts_with(DAG_KEY))
        .unwrap_or(false)
}

/// Index of the `]` balancing the `[` at `start`.
fn closing_bracket(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (b == b']').then_some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(stdout: &str, stderr: &str) -> String {
        serde_json::json!({
            "stdout": STANDARD.encode(stdout),
            "stderr": STANDARD.encode(stderr),
        })
        .to_string()
    }

    const NOISY: &str = "\
[2024-05-01 10:00:00,000] {dagbag.py:500} INFO - Filling up the DagBag
WARNING: [deprecated] option used
[{\"dag_id\": \"etl_daily\", \"filepath\": \"etl.py\", \"owner\": \"data\", \"paused\": \"False\"}, \
{\"dag_id\": \"ml_train\", \"filepath\": \"ml.py\", \"owner\": \"ml\", \"paused\": \"True\"}]
done.
";

    #[test]
    fn extracts_records_surrounded_by_log_noise() {
        let records = extract_records(&envelope(NOISY, "some warning")).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["etl_daily", "ml_train"]);
        assert_eq!(records[0].paused, Some(false));
        assert_eq!(records[1].paused, Some(true));
        assert_eq!(records[1].owner, "ml");
    }

    #[test]
    fn compact_dag_list_is_extracted_from_envelope() {
        let stdout = r#"noise... [{"dag_id":"a"},{"dag_id":"b"}] more noise"#;
        let records = extract_records(&envelope(stdout, "")).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn brackets_inside_strings_do_not_end_the_island() {
        let text = r#"log [x] [{"dag_id": "a]b", "filepath": "dags/[weird]{}.py", "owner": "o\"q", "paused": false}] tail ]"#;
        let island = find_dag_list(text).unwrap();
        assert!(island.starts_with("[{\"dag_id\""));
        assert!(island.ends_with("false}]"));
        let records = parse_dag_list(text).unwrap();
        assert_eq!(records[0].id, "a]b");
        assert_eq!(records[0].filepath, "dags/[weird]{}.py");
        assert_eq!(records[0].owner, "o\"q");
    }

    #[test]
    fn nested_arrays_and_unknown_fields_are_tolerated() {
        let text = r#"[ { "dag_id": "x", "tags": [["a"], ["b"]], "next": {"k": [1]} } ]"#;
        let records = parse_dag_list(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "x");
        assert!(records[0].paused.is_none());
    }

    #[test]
    fn unparseable_candidate_is_skipped_for_a_later_one() {
        let text = "[{\"dag_id\": broken}]\n[{\"dag_id\": \"ok\"}]";
        let records = parse_dag_list(text).unwrap();
        assert_eq!(records[0].id, "ok");
    }

    #[test]
    fn empty_array_is_not_a_dag_list() {
        let raw = envelope("No data found\n[]\n", "");
        assert!(matches!(
            extract_records(&raw),
            Err(DppError::NoStructuredOutput(_))
        ));
    }

    #[test]
    fn unterminated_island_yields_no_structured_output() {
        assert!(matches!(
            parse_dag_list("[{\"dag_id\": \"a\""),
            Err(DppError::NoStructuredOutput(_))
        ));
    }

    #[test]
    fn envelope_tolerates_missing_null_and_extra_fields() {
        let raw = r#"{"stdout": null, "exit_code": 0}"#;
        let resp = CliResponse::parse(raw).unwrap();
        assert_eq!(resp, CliResponse::default());
        assert_eq!(resp.decoded_stdout().unwrap(), "");
    }

    #[test]
    fn bad_envelope_and_bad_base64_are_upstream_errors() {
        assert!(matches!(
            extract_records("<html>502</html>"),
            Err(DppError::Upstream(_))
        ));
        let raw = r#"{"stdout": "***not base64***", "stderr": ""}"#;
        assert!(matches!(extract_records(raw), Err(DppError::Upstream(_))));
    }

    #[test]
    fn stderr_is_decoded_independently() {
        let resp = CliResponse::parse(&envelope("", "DeprecationWarning")).unwrap();
        assert_eq!(resp.decoded_stderr().unwrap(), "DeprecationWarning");
    }
}
