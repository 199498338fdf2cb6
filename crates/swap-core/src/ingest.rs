//! Classification and gold ingestion.
//!
//! Raw classification records carry `user_id`, `user_name`,
//! `subject_ids`, `annotations` and `classification_id`. They arrive either
//! as a project CSV export (every cell text, annotations as quoted JSON) or
//! as JSON Lines from the live stream (ids as numbers or strings,
//! annotations as JSON text or structured values), so the parser accepts
//! both.
//!
//! Record-level failures come back as [`ParseError`]; [`ingest_csv`] and
//! [`ingest_jsonl`] log and skip them so one bad record never stops a
//! stream.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use serde_json::{Map, Value};
use swap_common::{AnnotationConfig, ClassificationId, SubjectId, UserId};
use thiserror::Error;

use crate::logging::{event_names, Stage};
use crate::log_event;
use crate::model::{Classification, Gold, Vote};
use crate::swap::Swap;

/// Why a single record could not be normalised.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("record is not valid UTF-8: {0}")]
    Encoding(#[source] std::str::Utf8Error),

    #[error("record is not valid CSV: {0}")]
    Csv(#[source] csv::Error),

    #[error("record is not valid JSON: {0}")]
    RecordJson(#[source] serde_json::Error),

    #[error("annotations are not valid JSON: {0}")]
    AnnotationJson(#[source] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("task {task} not found in annotations")]
    TaskNotFound { task: String },

    #[error("annotation value has no element `{step}` on path `{key}`")]
    BadValuePath { key: String, step: String },

    #[error("annotation value {0} is neither a true nor a false value")]
    UnknownValue(String),
}

impl From<ParseError> for swap_common::Error {
    fn from(err: ParseError) -> Self {
        swap_common::Error::MalformedRecord(err.to_string())
    }
}

/// Turns an annotation payload into a vote.
#[derive(Debug, Clone)]
pub struct AnnotationParser {
    config: AnnotationConfig,
}

impl AnnotationParser {
    pub fn new(config: AnnotationConfig) -> Self {
        Self { config }
    }

    pub fn parse(&self, annotations: &Value) -> Result<Vote, ParseError> {
        let decoded;
        let annotations = match annotations {
            Value::String(text) => {
                decoded = serde_json::from_str::<Value>(text).map_err(ParseError::AnnotationJson)?;
                &decoded
            }
            other => other,
        };
        let annotation = self.find_task(annotations)?;
        let value = annotation
            .get("value")
            .ok_or(ParseError::MissingField("value"))?;
        self.parse_value(value)
    }

    /// Locate this task's annotation in either the keyed or the list layout.
    fn find_task<'a>(&self, annotations: &'a Value) -> Result<&'a Value, ParseError> {
        let task = &self.config.task;
        let found = match annotations {
            Value::Object(map) => map.get(task).and_then(|entries| match entries {
                Value::Array(items) => items.first(),
                other => Some(other),
            }),
            Value::Array(items) => items
                .iter()
                .find(|a| a.get("task").and_then(Value::as_str) == Some(task.as_str())),
            _ => None,
        };
        found.ok_or_else(|| ParseError::TaskNotFound { task: task.clone() })
    }

    fn parse_value(&self, value: &Value) -> Result<Vote, ParseError> {
        let value = match &self.config.value_key {
            Some(key) => navigate(value, key, &self.config.value_separator)?,
            None => value,
        };

        // any mark at all means the volunteer saw something real
        match value {
            Value::Array(items) => Ok(Vote::from_bool(!items.is_empty())),
            Value::String(s) => Ok(Vote::from_bool(!s.is_empty())),
            Value::Object(map) => Ok(Vote::from_bool(!map.is_empty())),
            scalar => {
                if self.config.true_values.contains(scalar) {
                    Ok(Vote::Real)
                } else if self.config.false_values.contains(scalar) {
                    Ok(Vote::Bogus)
                } else {
                    Err(ParseError::UnknownValue(scalar.to_string()))
                }
            }
        }
    }
}

fn navigate<'a>(value: &'a Value, key: &str, separator: &str) -> Result<&'a Value, ParseError> {
    let mut item = value;
    for step in key.split(separator) {
        let next = match item {
            Value::Array(items) => step.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(map) => map.get(step),
            _ => None,
        };
        item = next.ok_or_else(|| ParseError::BadValuePath {
            key: key.to_string(),
            step: step.to_string(),
        })?;
    }
    Ok(item)
}

/// A normalised record plus the display name it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub classification: Classification,
    pub user_name: Option<String>,
}

/// Normalises raw classification records.
#[derive(Debug, Clone)]
pub struct ClassificationParser {
    annotation: AnnotationParser,
}

impl ClassificationParser {
    pub fn new(config: &AnnotationConfig) -> Self {
        Self {
            annotation: AnnotationParser::new(config.clone()),
        }
    }

    /// Parse one JSON Lines entry.
    pub fn parse_line(&self, line: &str) -> Result<ParsedRecord, ParseError> {
        let record: Value = serde_json::from_str(line).map_err(ParseError::RecordJson)?;
        self.parse(&record)
    }

    /// Parse one row of a CSV export against its header.
    pub fn parse_row(
        &self,
        headers: &StringRecord,
        row: &ByteRecord,
    ) -> Result<ParsedRecord, ParseError> {
        let mut record = Map::with_capacity(headers.len());
        for (name, cell) in headers.iter().zip(row.iter()) {
            let cell = std::str::from_utf8(cell).map_err(ParseError::Encoding)?;
            record.insert(name.to_string(), Value::String(cell.to_string()));
        }
        self.parse(&Value::Object(record))
    }

    pub fn parse(&self, record: &Value) -> Result<ParsedRecord, ParseError> {
        let user_name = record
            .get("user_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        // anonymous volunteers have no id and are tracked by name
        let user = match record.get("user_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(value) => Some(UserId::Id(integer_field("user_id", value)?)),
        };
        let user = match (user, &user_name) {
            (Some(id), _) => id,
            (None, Some(name)) => UserId::Name(name.clone()),
            (None, None) => return Err(ParseError::MissingField("user_id")),
        };

        let subject = record
            .get("subject_ids")
            .ok_or(ParseError::MissingField("subject_ids"))
            .and_then(|v| integer_field("subject_ids", v))?;
        let id = record
            .get("classification_id")
            .ok_or(ParseError::MissingField("classification_id"))
            .and_then(|v| integer_field("classification_id", v))?;
        let annotations = record
            .get("annotations")
            .ok_or(ParseError::MissingField("annotations"))?;
        let vote = self.annotation.parse(annotations)?;

        Ok(ParsedRecord {
            classification: Classification {
                user,
                subject: SubjectId(subject),
                vote,
                id: ClassificationId(id),
            },
            user_name,
        })
    }
}

fn integer_field(field: &'static str, value: &Value) -> Result<u64, ParseError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Layout of a classification dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Project export, one classification per row with a header.
    Csv,
    /// One JSON record per line.
    Jsonl,
}

impl InputFormat {
    /// `.csv` files are exports; anything else is read as JSON Lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => InputFormat::Csv,
            _ => InputFormat::Jsonl,
        }
    }
}

impl std::str::FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "jsonl" | "json" => Ok(InputFormat::Jsonl),
            _ => Err(format!("unknown input format: {}", s)),
        }
    }
}

/// Tally of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Non-blank lines or rows read.
    pub records: usize,
    pub ingested: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Feed a classification dump of either layout into the estimator.
pub fn ingest_records<R: Read>(
    swap: &mut Swap,
    parser: &ClassificationParser,
    format: InputFormat,
    reader: R,
) -> swap_common::Result<IngestStats> {
    match format {
        InputFormat::Csv => ingest_csv(swap, parser, reader),
        InputFormat::Jsonl => ingest_jsonl(swap, parser, BufReader::new(reader)),
    }
}

/// Feed a JSON Lines stream into the estimator.
///
/// Only read failures are errors; malformed records, including lines that
/// are not UTF-8, are logged and counted as skipped.
pub fn ingest_jsonl<R: BufRead>(
    swap: &mut Swap,
    parser: &ClassificationParser,
    reader: R,
) -> swap_common::Result<IngestStats> {
    let mut stats = IngestStats::default();
    ingest_started(swap, InputFormat::Jsonl);

    for (lineno, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let parsed = match std::str::from_utf8(&line) {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => parser.parse_line(text),
            Err(err) => Err(ParseError::Encoding(err)),
        };
        ingest_parsed(swap, &mut stats, lineno as u64 + 1, parsed);
    }

    ingest_finished(swap, &stats);
    Ok(stats)
}

/// Feed a CSV classification export into the estimator.
///
/// Columns are matched by header name; extra columns are ignored. Rows that
/// fail to parse are logged and skipped, read failures are errors.
pub fn ingest_csv<R: Read>(
    swap: &mut Swap,
    parser: &ClassificationParser,
    reader: R,
) -> swap_common::Result<IngestStats> {
    let mut stats = IngestStats::default();
    ingest_started(swap, InputFormat::Csv);

    let mut rows = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rows.headers().map_err(csv_error)?.clone();
    let mut row = ByteRecord::new();
    loop {
        let line = rows.position().line();
        match rows.read_byte_record(&mut row) {
            Ok(false) => break,
            Ok(true) => {
                let line = row.position().map_or(line, |pos| pos.line());
                let parsed = parser.parse_row(&headers, &row);
                ingest_parsed(swap, &mut stats, line, parsed);
            }
            Err(err) if err.is_io_error() => return Err(csv_error(err)),
            Err(err) => ingest_parsed(swap, &mut stats, line, Err(ParseError::Csv(err))),
        }
    }

    ingest_finished(swap, &stats);
    Ok(stats)
}

fn ingest_parsed(
    swap: &mut Swap,
    stats: &mut IngestStats,
    line: u64,
    parsed: Result<ParsedRecord, ParseError>,
) {
    stats.records += 1;
    match parsed {
        Ok(ParsedRecord {
            classification,
            user_name,
        }) => {
            let user = classification.user.clone();
            if swap.ingest(classification) {
                stats.ingested += 1;
                if let Some(name) = user_name {
                    swap.name_user(&user, &name);
                }
            } else {
                stats.duplicates += 1;
            }
        }
        Err(err) => {
            stats.skipped += 1;
            log_event!(
                swap.ctx,
                WARN,
                event_names::INGEST_RECORD_SKIPPED,
                Stage::Ingest,
                "skipping malformed classification",
                line = line,
                error = tracing::field::display(&err)
            );
        }
    }
}

fn ingest_started(swap: &Swap, format: InputFormat) {
    log_event!(
        swap.ctx,
        INFO,
        event_names::INGEST_STARTED,
        Stage::Ingest,
        "ingesting classifications",
        format = tracing::field::debug(format)
    );
}

fn ingest_finished(swap: &Swap, stats: &IngestStats) {
    log_event!(
        swap.ctx,
        INFO,
        event_names::INGEST_FINISHED,
        Stage::Ingest,
        "ingestion finished",
        records = stats.records,
        ingested = stats.ingested,
        duplicates = stats.duplicates,
        skipped = stats.skipped
    );
}

/// Read a two-column `subject,gold` CSV with a header row.
///
/// Column order follows the header and cells may be quoted. Gold must be
/// `0` or `1`; any other value fails the whole file.
pub fn parse_golds<R: Read>(reader: R) -> swap_common::Result<Vec<(SubjectId, Gold)>> {
    let mut rows = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = rows.headers().map_err(csv_error)?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (subject_col, gold_col) = match (find("subject"), find("gold")) {
        (Some(s), Some(g)) => (s, g),
        _ => {
            return Err(swap_common::Error::Ingest(format!(
                "gold file header must name `subject` and `gold` columns, got `{}`",
                headers.iter().collect::<Vec<_>>().join(",")
            )))
        }
    };

    let mut golds = Vec::new();
    for row in rows.records() {
        let row = row.map_err(csv_error)?;
        let cell = |i: usize| row.get(i).unwrap_or("");
        let subject = cell(subject_col).parse::<u64>().map_err(|_| {
            swap_common::Error::MalformedRecord(format!(
                "line {}: invalid subject id `{}`",
                row.position().map_or(0, |pos| pos.line()),
                cell(subject_col)
            ))
        })?;
        let gold = match cell(gold_col) {
            "0" => Gold::Bogus,
            "1" => Gold::Real,
            other => {
                return Err(swap_common::Error::InvalidGold {
                    subject: subject.to_string(),
                    value: other.to_string(),
                })
            }
        };
        golds.push((SubjectId(subject), gold));
    }
    Ok(golds)
}

fn csv_error(err: csv::Error) -> swap_common::Error {
    if err.is_io_error() {
        swap_common::Error::Io(err.into())
    } else {
        swap_common::Error::MalformedRecord(err.to_string())
    }
}
