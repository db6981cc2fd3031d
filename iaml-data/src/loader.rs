use std::fs::File;
use std::io::Read;
use std::path::Path;

use iaml_core::calculations::dates::parse_local_date;
use iaml_core::{Block, BlockId, CatalogError, Format, Program, ProgramCatalog, SessionRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading catalog or session data.
#[derive(Debug, Error)]
pub enum CatalogLoaderError {
    #[error("Failed to open '{path}': {message}")]
    Io { path: String, message: String },

    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Line {line}: {message}")]
    InvalidRow { line: usize, message: String },

    #[error("Program '{program}' has conflicting values for '{field}'")]
    InconsistentProgram {
        program: String,
        field: &'static str,
    },

    #[error("Invalid catalog: {0}")]
    Catalog(#[from] CatalogError),
}

impl From<csv::Error> for CatalogLoaderError {
    fn from(err: csv::Error) -> Self {
        CatalogLoaderError::CsvParse(err.to_string())
    }
}

fn open(path: &Path) -> Result<File, CatalogLoaderError> {
    File::open(path).map_err(|e| CatalogLoaderError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

// Header is line 1.
fn line_of(index: usize) -> usize {
    index + 2
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// A single row of the catalog CSV file.
///
/// Programs sold only as a whole have one row with the block columns empty.
/// Block-capable programs have one row per block, repeating the program
/// columns:
/// - `program`: canonical program name
/// - `slug`: URL slug
/// - `code`: single letter used in registration codes (may be empty)
/// - `full_price`: price of the whole program
/// - `block`: block id, e.g. `Block 1` or `1`
/// - `block_title`, `block_price`: block details
/// - `start_offset`, `end_offset`: inclusive day offsets from the session start
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogRecord {
    pub program: String,
    pub slug: String,
    pub code: Option<String>,
    pub full_price: Decimal,
    pub block: Option<String>,
    pub block_title: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    pub block_price: Option<Decimal>,
    pub start_offset: Option<u32>,
    pub end_offset: Option<u32>,
}

/// Loader for program catalogs from CSV files.
pub struct CatalogLoader;

impl CatalogLoader {
    /// Parse raw catalog rows from a CSV reader.
    pub fn parse_records<R: Read>(reader: R) -> Result<Vec<CatalogRecord>, CatalogLoaderError> {
        let mut csv_reader = self::reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: CatalogRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Parse and validate a catalog from a CSV reader.
    ///
    /// Rows for the same program are merged in file order. The resulting
    /// catalog is checked with [`ProgramCatalog::new`].
    pub fn parse<R: Read>(reader: R) -> Result<ProgramCatalog, CatalogLoaderError> {
        let records = Self::parse_records(reader)?;
        Self::build(&records)
    }

    pub fn from_path(path: &Path) -> Result<ProgramCatalog, CatalogLoaderError> {
        Self::parse(open(path)?)
    }

    pub fn build(records: &[CatalogRecord]) -> Result<ProgramCatalog, CatalogLoaderError> {
        let mut programs: Vec<Program> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let line = line_of(index);
            let code = parse_code(record.code.as_deref(), line)?;

            let position = programs
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(&record.program));
            let program = match position {
                Some(i) => {
                    let existing = &mut programs[i];
                    if !existing.slug.eq_ignore_ascii_case(&record.slug) {
                        return Err(inconsistent(record, "slug"));
                    }
                    if existing.code != code {
                        return Err(inconsistent(record, "code"));
                    }
                    if existing.full_price != record.full_price {
                        return Err(inconsistent(record, "full_price"));
                    }
                    existing
                }
                None => {
                    programs.push(Program {
                        name: record.program.clone(),
                        slug: record.slug.clone(),
                        code,
                        full_price: record.full_price,
                        blocks: Vec::new(),
                    });
                    let last = programs.len() - 1;
                    &mut programs[last]
                }
            };

            if let Some(block) = parse_block(record, line)? {
                program.blocks.push(block);
            }
        }

        Ok(ProgramCatalog::new(programs)?)
    }
}

fn inconsistent(
    record: &CatalogRecord,
    field: &'static str,
) -> CatalogLoaderError {
    CatalogLoaderError::InconsistentProgram {
        program: record.program.clone(),
        field,
    }
}

fn parse_code(
    raw: Option<&str>,
    line: usize,
) -> Result<Option<char>, CatalogLoaderError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(Some(c.to_ascii_uppercase())),
        _ => Err(CatalogLoaderError::InvalidRow {
            line,
            message: format!("program code must be a single letter, got '{raw}'"),
        }),
    }
}

fn parse_block(
    record: &CatalogRecord,
    line: usize,
) -> Result<Option<Block>, CatalogLoaderError> {
    let Some(raw) = record.block.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let invalid = |message: String| CatalogLoaderError::InvalidRow { line, message };

    let id = BlockId::parse(raw).ok_or_else(|| invalid(format!("invalid block id '{raw}'")))?;
    let price = record
        .block_price
        .ok_or_else(|| invalid(format!("{id} has no block_price")))?;
    let start_offset = record
        .start_offset
        .ok_or_else(|| invalid(format!("{id} has no start_offset")))?;
    let end_offset = record
        .end_offset
        .ok_or_else(|| invalid(format!("{id} has no end_offset")))?;

    Ok(Some(Block {
        id,
        title: record.block_title.clone().unwrap_or_else(|| id.to_string()),
        price,
        start_offset,
        end_offset,
    }))
}

/// A single row of the sessions CSV file. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionRow {
    pub id: String,
    pub program: Option<String>,
    pub format: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub venue: Option<String>,
}

/// Loader for session fixtures from CSV files.
pub struct SessionLoader;

impl SessionLoader {
    pub fn parse<R: Read>(reader: R) -> Result<Vec<SessionRecord>, CatalogLoaderError> {
        let mut csv_reader = self::reader(reader);
        let mut sessions: Vec<SessionRecord> = Vec::new();

        for (index, result) in csv_reader.deserialize().enumerate() {
            let row: SessionRow = result?;
            let session = session_from_row(row, line_of(index))?;
            if sessions.iter().any(|s| s.id == session.id) {
                return Err(CatalogLoaderError::InvalidRow {
                    line: line_of(index),
                    message: format!("duplicate session id '{}'", session.id),
                });
            }
            sessions.push(session);
        }

        Ok(sessions)
    }

    pub fn from_path(path: &Path) -> Result<Vec<SessionRecord>, CatalogLoaderError> {
        Self::parse(open(path)?)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn session_from_row(
    row: SessionRow,
    line: usize,
) -> Result<SessionRecord, CatalogLoaderError> {
    let invalid = |message: String| CatalogLoaderError::InvalidRow { line, message };

    if row.id.trim().is_empty() {
        return Err(invalid("session id is empty".to_string()));
    }

    let format = match non_empty(row.format) {
        Some(raw) => Some(Format::parse(&raw).ok_or_else(|| invalid(format!("unknown format '{raw}'")))?),
        None => None,
    };
    let date = |raw: Option<String>| -> Result<_, CatalogLoaderError> {
        non_empty(raw)
            .map(|s| parse_local_date(&s).map_err(|e| invalid(e.to_string())))
            .transpose()
    };

    Ok(SessionRecord {
        id: row.id,
        program: non_empty(row.program),
        format,
        start_date: date(row.start_date)?,
        end_date: date(row.end_date)?,
        city: non_empty(row.city),
        state: non_empty(row.state),
        venue: non_empty(row.venue),
    })
}
