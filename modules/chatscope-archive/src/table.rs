//! Persisted chat tables: one `# attrs:` JSON header line, then a fully
//! quoted CSV body.
//!
//! ```text
//! # attrs: {"title":"…","upload_at":"2024/05/01/21:00","url":"…","video_id":"…"}
//! "chat","second","minute","emotion"
//! "こんにちは","12","0","喜び"
//! ```
//!
//! Quotes inside a field are written `\"` and backslashes `\\`. Files without
//! the header line are read with empty metadata.

use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::debug;

use chatscope_common::{ChatRecord, ChatTable, PipelineError, Result, RunMetadata};

/// Prefix of the metadata header line.
pub const ATTRS_MARKER: &str = "# attrs: ";

const COL_CHAT: &str = "chat";
const COL_SECOND: &str = "second";
const COL_MINUTE: &str = "minute";
const COL_EMOTION: &str = "emotion";

/// Write `table` to `path`, replacing any existing file.
///
/// The bytes go to a temporary file in the same directory which is renamed
/// over `path` only after a successful flush, so readers never observe a
/// partially written table.
pub fn write_table(path: &Path, table: &ChatTable) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".chatscope-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    encode_table(tmp.as_file_mut(), table)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PipelineError::Io(e.error))?;

    debug!(
        path = %path.display(),
        records = table.records.len(),
        labeled = table.is_labeled(),
        "Wrote chat table"
    );
    Ok(())
}

/// Read a table written by [`write_table`], or a legacy file without header.
pub fn read_table(path: &Path) -> Result<ChatTable> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8(bytes).map_err(|_| {
        PipelineError::Format(format!("{} is not valid UTF-8", path.display()))
    })?;
    decode_table(&content)
}

pub fn encode_table<W: Write>(mut out: W, table: &ChatTable) -> Result<()> {
    let attrs = serde_json::to_string(&table.metadata)?;
    writeln!(out, "{ATTRS_MARKER}{attrs}")?;

    let labeled = table.is_labeled();
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .double_quote(false)
        .escape(b'\\')
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);

    if labeled {
        writer
            .write_record([COL_CHAT, COL_SECOND, COL_MINUTE, COL_EMOTION])
            .map_err(csv_error)?;
    } else {
        writer
            .write_record([COL_CHAT, COL_SECOND, COL_MINUTE])
            .map_err(csv_error)?;
    }

    for record in &table.records {
        let chat = escape_backslashes(&record.text);
        let second = record.offset_seconds.to_string();
        let minute = record.minute().to_string();
        if labeled {
            let emotion = escape_backslashes(record.emotion.as_deref().unwrap_or(""));
            writer
                .write_record([
                    chat.as_str(),
                    second.as_str(),
                    minute.as_str(),
                    emotion.as_str(),
                ])
                .map_err(csv_error)?;
        } else {
            writer
                .write_record([chat.as_str(), second.as_str(), minute.as_str()])
                .map_err(csv_error)?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn decode_table(content: &str) -> Result<ChatTable> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let (metadata, body) = match content.strip_prefix(ATTRS_MARKER) {
        Some(rest) => {
            let (line, body) = rest.split_once('\n').unwrap_or((rest, ""));
            let metadata: RunMetadata = serde_json::from_str(line.trim_end_matches('\r'))
                .map_err(|e| PipelineError::Format(format!("invalid attrs header: {e}")))?;
            (metadata, body)
        }
        None => (RunMetadata::default(), content),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .double_quote(true)
        .escape(Some(b'\\'))
        .from_reader(body.as_bytes());

    let columns = Columns::locate(reader.headers().map_err(csv_error)?)?;

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.map_err(csv_error)?;
        records.push(columns.parse_row(&row, idx + 1)?);
    }

    Ok(ChatTable::new(metadata, records))
}

/// Column positions, looked up by name so column order does not matter.
struct Columns {
    chat: usize,
    second: usize,
    minute: usize,
    emotion: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| PipelineError::Format(format!("missing column `{name}`")))
        };

        let columns = Self {
            chat: require(COL_CHAT)?,
            second: require(COL_SECOND)?,
            minute: require(COL_MINUTE)?,
            emotion: find(COL_EMOTION),
        };

        let expected = 3 + usize::from(columns.emotion.is_some());
        if headers.len() != expected {
            let names: Vec<&str> = headers.iter().collect();
            return Err(PipelineError::Format(format!(
                "unexpected columns: {}",
                names.join(",")
            )));
        }
        Ok(columns)
    }

    fn parse_row(&self, row: &StringRecord, line: usize) -> Result<ChatRecord> {
        let field = |idx: usize| row.get(idx).unwrap_or("");

        let offset_seconds = parse_seconds(field(self.second)).ok_or_else(|| {
            PipelineError::Format(format!(
                "row {line}: invalid second {:?}",
                field(self.second)
            ))
        })?;
        let record = ChatRecord::new(field(self.chat), offset_seconds);

        let minute: u64 = field(self.minute).trim().parse().map_err(|_| {
            PipelineError::Format(format!(
                "row {line}: invalid minute {:?}",
                field(self.minute)
            ))
        })?;
        if minute != record.minute() {
            return Err(PipelineError::Format(format!(
                "row {line}: minute {minute} does not match second {offset_seconds}"
            )));
        }

        let emotion = self
            .emotion
            .map(field)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Ok(ChatRecord { emotion, ..record })
    }
}

/// Whole seconds. Fractional values from older exports are floored.
fn parse_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    let secs: f64 = raw.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs.floor() as u64)
    } else {
        None
    }
}

/// The csv writer escapes quotes but not the escape character itself.
fn escape_backslashes(field: &str) -> String {
    field.replace('\\', "\\\\")
}

fn csv_error(err: csv::Error) -> PipelineError {
    if !err.is_io_error() {
        return PipelineError::Format(err.to_string());
    }
    match err.into_kind() {
        csv::ErrorKind::Io(io) => PipelineError::Io(io),
        _ => PipelineError::Format("csv I/O error".into()),
    }
}
