//! Baseline store: the persisted reference matrix
//!
//! # File format
//!
//! Plain text, one pair per line, in the matrix's insertion order:
//!
//! ```text
//! <srcHost>|<srcZone>-><tgtHost>|<tgtZone> : min=<num> max=<num> avg=<num> mdev=<num>
//! ```
//!
//! - `<num>` is a non-negative decimal in microseconds, or `N/A` when the
//!   statistic was unavailable.
//! - A pair that was deliberately not probed is written with `-` for all
//!   four fields.
//! - On load, `avg` is mandatory; any of `min`, `max`, `mdev` may be omitted
//!   (reduced form) and is then unavailable. Comparison anchors on `avg`
//!   when the extreme it needs is missing. Keys may appear in any order.
//! - Blank lines are ignored. When a pair appears twice the last line wins.
//!
//! Malformed lines are handled per [`BaselineStrictness`].

use crate::machine::MachineId;
use crate::matrix::ProbeMatrix;
use crate::sample::{LatencySample, Measurement, ProbeCell, NOT_PROBED_TOKEN};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// What to do with a line that does not match the grammar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStrictness {
    /// Skip the line and record a [`ParseWarning`]
    #[default]
    Lenient,
    /// Abort the load with a [`ParseError`]
    Strict,
}

/// Why a single baseline line was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LineError {
    #[error("expected '<host>|<zone>-><host>|<zone> : key=value ...'")]
    Shape,

    #[error("empty host or zone")]
    EmptyIdentity,

    #[error("field '{0}' is not of the form key=value")]
    MalformedField(String),

    #[error("unknown statistic '{0}'")]
    UnknownKey(String),

    #[error("statistic '{0}' given twice")]
    DuplicateKey(String),

    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("missing mandatory 'avg' statistic")]
    MissingAvg,

    #[error("not-probed marker '-' must be used for all four statistics")]
    PartialNotProbed,
}

/// Fatal parse failure in strict mode
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}:{line_number}: {reason}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub line_number: usize,
    pub reason: LineError,
}

/// Skipped line in lenient mode
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "baseline line {} skipped ({}): {}",
            self.line_number, self.reason, self.line
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("failed to read baseline file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write baseline file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^|]*)\|(.*?)->([^|]*)\|(.*?) : (.*)$").expect("baseline line regex is valid")
    })
}

/// Parse one non-empty baseline line into `(source, target, cell)`
pub fn parse_line(line: &str) -> Result<(MachineId, MachineId, ProbeCell), LineError> {
    let caps = line_regex().captures(line).ok_or(LineError::Shape)?;
    let source = MachineId::new(&caps[1], &caps[2]);
    let target = MachineId::new(&caps[3], &caps[4]);
    if [&source.host, &source.zone, &target.host, &target.zone]
        .iter()
        .any(|s| s.is_empty())
    {
        return Err(LineError::EmptyIdentity);
    }

    let mut fields: [Option<&str>; 4] = [None; 4];
    for field in caps[5].split_whitespace() {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| LineError::MalformedField(field.to_string()))?;
        let slot = match key {
            "min" => 0,
            "max" => 1,
            "avg" => 2,
            "mdev" => 3,
            _ => return Err(LineError::UnknownKey(key.to_string())),
        };
        if fields[slot].replace(value).is_some() {
            return Err(LineError::DuplicateKey(key.to_string()));
        }
    }

    let not_probed = fields
        .iter()
        .filter(|f| **f == Some(NOT_PROBED_TOKEN))
        .count();
    if not_probed == 4 {
        return Ok((source, target, ProbeCell::NotProbed));
    }
    if not_probed > 0 {
        return Err(LineError::PartialNotProbed);
    }

    let parse = |key: &str, value: Option<&str>| -> Result<Measurement, LineError> {
        match value {
            None => Ok(Measurement::Unavailable),
            Some(v) => v.parse().map_err(|_| LineError::InvalidValue {
                key: key.to_string(),
                value: v.to_string(),
            }),
        }
    };

    if fields[2].is_none() {
        return Err(LineError::MissingAvg);
    }
    let sample = LatencySample {
        min: parse("min", fields[0])?,
        max: parse("max", fields[1])?,
        avg: parse("avg", fields[2])?,
        mdev: parse("mdev", fields[3])?,
    };
    Ok((source, target, ProbeCell::Measured(sample)))
}

/// Historical reference matrix with a total lookup
#[derive(Debug, Clone, Default)]
pub struct BaselineStore {
    matrix: ProbeMatrix,
    warnings: Vec<ParseWarning>,
}

impl BaselineStore {
    /// Store with no data: every lookup yields the unavailable sample
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_matrix(matrix: ProbeMatrix) -> Self {
        Self {
            matrix,
            warnings: Vec::new(),
        }
    }

    /// Read and parse a baseline file
    pub fn load<P: AsRef<Path>>(
        path: P,
        strictness: BaselineStrictness,
    ) -> Result<Self, BaselineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BaselineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::parse(&text, path, strictness)?;
        tracing::info!(
            path = %path.display(),
            pairs = store.matrix.len(),
            skipped = store.warnings.len(),
            "Loaded baseline"
        );
        Ok(store)
    }

    /// Parse baseline text; `origin` only labels errors and warnings
    pub fn parse(
        text: &str,
        origin: &Path,
        strictness: BaselineStrictness,
    ) -> Result<Self, ParseError> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut warnings = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let line_number = idx + 1;

            match parse_line(line) {
                Ok((source, target, cell)) => {
                    if !seen.insert((source.clone(), target.clone())) {
                        tracing::warn!(line_number, %source, %target, "Duplicate baseline pair, last line wins");
                        warnings.push(ParseWarning {
                            line_number,
                            line: line.to_string(),
                            reason: "duplicate pair replaces an earlier line".to_string(),
                        });
                    }
                    entries.push((source, target, cell));
                }
                Err(reason) => match strictness {
                    BaselineStrictness::Strict => {
                        return Err(ParseError {
                            path: origin.to_path_buf(),
                            line_number,
                            reason,
                        });
                    }
                    BaselineStrictness::Lenient => {
                        tracing::warn!(
                            path = %origin.display(),
                            line_number,
                            %reason,
                            "Skipping malformed baseline line"
                        );
                        warnings.push(ParseWarning {
                            line_number,
                            line: line.to_string(),
                            reason: reason.to_string(),
                        });
                    }
                },
            }
        }

        Ok(Self {
            matrix: entries.into_iter().collect(),
            warnings,
        })
    }

    /// Historical sample for a pair; unavailable when the pair is unknown
    pub fn lookup(&self, source: &MachineId, target: &MachineId) -> LatencySample {
        self.matrix
            .get(source, target)
            .map(ProbeCell::sample)
            .unwrap_or(LatencySample::UNAVAILABLE)
    }

    pub fn matrix(&self) -> &ProbeMatrix {
        &self.matrix
    }

    /// Lines skipped during a lenient load
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

/// Render a matrix in baseline grammar, one line per pair
pub fn serialize(matrix: &ProbeMatrix) -> String {
    let mut out = String::new();
    for (source, target, cell) in matrix.iter() {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{}->{} : {}", source, target, cell);
    }
    out
}

/// Write a matrix as a baseline file, replacing any existing file
///
/// The content goes to a sibling temporary file first and is renamed into
/// place, so an interrupted write never leaves a truncated baseline.
pub fn save<P: AsRef<Path>>(matrix: &ProbeMatrix, path: P) -> Result<(), BaselineError> {
    let path = path.as_ref();
    let write_err = |source: io::Error| BaselineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serialize(matrix)).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;

    tracing::info!(path = %path.display(), pairs = matrix.len(), "Wrote baseline");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn m(host: &str, zone: &str) -> MachineId {
        MachineId::new(host, zone)
    }

    fn origin() -> PathBuf {
        PathBuf::from("ref.txt")
    }

    #[test]
    fn test_parse_full_line() {
        let (src, tgt, cell) =
            parse_line("db1|paris->db2|london : min=90 max=110 avg=100 mdev=4.5").unwrap();
        assert_eq!(src, m("db1", "paris"));
        assert_eq!(tgt, m("db2", "london"));
        assert_eq!(
            cell,
            ProbeCell::Measured(LatencySample::from_micros(90.0, 100.0, 110.0, 4.5))
        );
    }

    #[test]
    fn test_parse_reduced_form() {
        let (_, _, cell) = parse_line("a|x->b|y : avg=250").unwrap();
        let sample = cell.sample();
        assert_eq!(sample.avg, Measurement::Available(250.0));
        assert_eq!(sample.min, Measurement::Unavailable);
        assert_eq!(sample.max, Measurement::Unavailable);
        assert_eq!(sample.mdev, Measurement::Unavailable);
    }

    #[test]
    fn test_parse_unavailable_and_not_probed() {
        let (_, _, cell) = parse_line("a|x->b|y : min=N/A max=N/A avg=N/A mdev=N/A").unwrap();
        assert_eq!(cell, ProbeCell::Measured(LatencySample::UNAVAILABLE));

        let (_, _, cell) = parse_line("a|x->a|x : min=- max=- avg=- mdev=-").unwrap();
        assert_eq!(cell, ProbeCell::NotProbed);
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(parse_line("garbage"), Err(LineError::Shape));
        assert_eq!(parse_line("|x->b|y : avg=1"), Err(LineError::EmptyIdentity));
        assert_eq!(
            parse_line("a|x->b|y : min=1 max=2"),
            Err(LineError::MissingAvg)
        );
        assert_eq!(
            parse_line("a|x->b|y : avg=fast"),
            Err(LineError::InvalidValue {
                key: "avg".into(),
                value: "fast".into()
            })
        );
        assert_eq!(
            parse_line("a|x->b|y : avg=1 p99=4"),
            Err(LineError::UnknownKey("p99".into()))
        );
        assert_eq!(
            parse_line("a|x->b|y : avg=1 avg=2"),
            Err(LineError::DuplicateKey("avg".into()))
        );
        assert_eq!(
            parse_line("a|x->b|y : avg=1 min"),
            Err(LineError::MalformedField("min".into()))
        );
        assert_eq!(
            parse_line("a|x->b|y : min=- max=- avg=3 mdev=-"),
            Err(LineError::PartialNotProbed)
        );
    }

    #[test]
    fn test_lenient_skips_and_collects_warnings() {
        let text = "a|x->b|y : min=1 max=3 avg=2 mdev=0.5\n\nnonsense\nb|y->a|x : avg=7\n";
        let store = BaselineStore::parse(text, &origin(), BaselineStrictness::Lenient).unwrap();

        assert_eq!(store.matrix().len(), 2);
        assert_eq!(store.warnings().len(), 1);
        assert_eq!(store.warnings()[0].line_number, 3);
        assert_eq!(store.warnings()[0].line, "nonsense");
    }

    #[test]
    fn test_strict_aborts_with_location() {
        let text = "a|x->b|y : avg=2\nnonsense\n";
        let err = BaselineStore::parse(text, &origin(), BaselineStrictness::Strict).unwrap_err();
        assert_eq!(err.line_number, 2);
        assert_eq!(err.reason, LineError::Shape);
        assert!(err.to_string().starts_with("ref.txt:2:"));
    }

    #[test]
    fn test_lookup_is_total() {
        let store = BaselineStore::parse(
            "a|x->b|y : avg=2\na|x->a|x : min=- max=- avg=- mdev=-\n",
            &origin(),
            BaselineStrictness::Strict,
        )
        .unwrap();

        assert_eq!(store.lookup(&m("a", "x"), &m("b", "y")).avg, Measurement::Available(2.0));
        assert!(store.lookup(&m("b", "y"), &m("a", "x")).is_unavailable());
        assert!(store.lookup(&m("a", "x"), &m("a", "x")).is_unavailable());
        assert!(store.lookup(&m("zz", "x"), &m("a", "x")).is_unavailable());
        // Same host, other zone: distinct key
        assert!(store.lookup(&m("a", "other"), &m("b", "y")).is_unavailable());
        assert_eq!(store.matrix().len(), 2);

        assert!(BaselineStore::empty().lookup(&m("a", "x"), &m("b", "y")).is_unavailable());
    }

    #[test]
    fn test_duplicate_pair_last_wins() {
        let text = "a|x->b|y : avg=2\na|x->b|y : avg=9\n";
        let store = BaselineStore::parse(text, &origin(), BaselineStrictness::Strict).unwrap();
        assert_eq!(store.lookup(&m("a", "x"), &m("b", "y")).avg, Measurement::Available(9.0));
        assert_eq!(store.warnings().len(), 1);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "a|x->b|y : min=1 max=3 avg=2 mdev=0.5\r\n";
        let store = BaselineStore::parse(text, &origin(), BaselineStrictness::Strict).unwrap();
        assert_eq!(store.lookup(&m("a", "x"), &m("b", "y")).mdev, Measurement::Available(0.5));
    }

    #[test]
    fn test_save_then_load_preserves_order_and_values() {
        let matrix: ProbeMatrix = vec![
            (m("b", "y"), m("a", "x"), ProbeCell::Measured(LatencySample::from_micros(1.25, 2.5, 3.75, 0.125))),
            (m("b", "y"), m("b", "y"), ProbeCell::NotProbed),
            (m("a", "x"), m("b", "y"), ProbeCell::Measured(LatencySample::UNAVAILABLE)),
        ]
        .into_iter()
        .collect();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rtt.ref");
        save(&matrix, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first, "b|y->a|x : min=1.25 max=3.75 avg=2.5 mdev=0.125");

        let loaded = BaselineStore::load(&path, BaselineStrictness::Strict).unwrap();
        assert_eq!(loaded.matrix(), &matrix);
        assert!(!dir.path().join("rtt.ref.tmp").exists());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = BaselineStore::load("/nonexistent/rtt.ref", BaselineStrictness::Lenient)
            .unwrap_err();
        assert!(matches!(err, BaselineError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/rtt.ref"));
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let err = save(&ProbeMatrix::new(), "/nonexistent/dir/rtt.ref").unwrap_err();
        assert!(matches!(err, BaselineError::Write { .. }));
    }
}
