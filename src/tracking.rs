use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::config::{Config, TrackingColumns};
use crate::docx::table::{self, CellStyle};
use crate::docx::xml::Element;
use crate::docx::Docx;
use crate::error::CaseError;
use crate::layout;
use crate::models::{Outcome, ReportRow, StudentRecord, TrackingEntry};
use crate::report::{self, ReportTable};
use crate::sheet::Workbook;

/// Date text as written to the table: `dd/mm/YYYY` plus the hour when known,
/// or the raw cell text when the date could not be parsed.
pub fn date_text(row: &ReportRow) -> String {
    match row.date {
        Some(date) => {
            let day = date.format("%d/%m/%Y").to_string();
            if row.hour.trim().is_empty() {
                day
            } else {
                format!("{day} {}", row.hour.trim())
            }
        }
        None => row.date_text.trim().to_string(),
    }
}

pub fn entry_from_row(row: &ReportRow, outcome: Outcome, tutor: &str) -> TrackingEntry {
    TrackingEntry {
        date: date_text(row),
        topic: row.topic.trim().to_string(),
        situation: row.situation.trim().to_string(),
        outcome: outcome.recorded().label().to_string(),
        tutor: tutor.trim().to_string(),
    }
}

/// True when some row already holds the entry's (date, topic) pair.
pub fn contains_entry(tbl: &Element, entry: &TrackingEntry, cols: &TrackingColumns) -> bool {
    (0..table::row_count(tbl)).any(|row| {
        table::cell_text(tbl, row, cols.date).as_deref() == Some(entry.date.as_str())
            && table::cell_text(tbl, row, cols.topic).as_deref() == Some(entry.topic.as_str())
    })
}

fn first_blank_row(tbl: &Element, cols: &TrackingColumns) -> Option<usize> {
    (0..table::row_count(tbl)).find(|&row| {
        table::cell_text(tbl, row, cols.topic)
            .map(|topic| topic.is_empty())
            .unwrap_or(false)
    })
}

/// Writes `entry` into the table unless its (date, topic) pair is already
/// present, in which case nothing changes and `false` is returned.
///
/// The entry goes into the first row whose topic cell is empty. A `N/A`
/// entry is inserted as a new row before that blank row instead. Without a
/// blank row a new one is appended.
pub fn append_entry(
    tbl: &mut Element,
    entry: &TrackingEntry,
    outcome: Outcome,
    cols: &TrackingColumns,
    style: CellStyle,
) -> anyhow::Result<bool> {
    if contains_entry(tbl, entry, cols) {
        return Ok(false);
    }

    let index = match first_blank_row(tbl, cols) {
        Some(blank) if outcome == Outcome::NotApplicable => table::insert_blank_before(tbl, blank),
        Some(blank) => Some(blank),
        None => table::append_blank(tbl),
    }
    .ok_or_else(|| anyhow!("tracking table has no rows to extend"))?;

    let row = table::row_mut(tbl, index).ok_or_else(|| anyhow!("tracking row {index} vanished"))?;
    for (col, text) in [
        (cols.date, &entry.date),
        (cols.topic, &entry.topic),
        (cols.situation, &entry.situation),
        (cols.outcome, &entry.outcome),
        (cols.tutor, &entry.tutor),
    ] {
        if !table::set_cell_text(row, col, text, style) {
            return Err(anyhow!("tracking row {index} has no column {col}"));
        }
    }
    Ok(true)
}

fn tracking_document(root: &Path, student: &StudentRecord, config: &Config) -> anyhow::Result<PathBuf> {
    let folder = layout::working_folder(root, student)?;
    layout::find_document(
        &folder,
        &config.prefixes.tracking,
        &student.full_name,
        "tracking document",
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyLog {
    pub document: PathBuf,
    pub entry: TrackingEntry,
    pub inserted: bool,
}

/// Logs the student's latest entry from one report sheet.
pub fn log_weekly(
    root: &Path,
    student: &StudentRecord,
    report: &ReportTable,
    outcome: Outcome,
    tutor: &str,
    config: &Config,
) -> anyhow::Result<WeeklyLog> {
    let document = tracking_document(root, student, config)?;
    let row = report::most_recent_for(report, &student.full_name)?;
    let entry = entry_from_row(row, outcome, tutor);

    let mut docx = Docx::open(&document)?;
    let inserted = append_entry(
        docx.first_table_mut()?,
        &entry,
        outcome,
        &config.tracking_columns,
        CellStyle::from_points(config.font_size_pt),
    )?;
    if inserted {
        docx.save()?;
        tracing::info!(student = %student.id, date = %entry.date, topic = %entry.topic, "session logged");
    } else {
        tracing::info!(student = %student.id, date = %entry.date, topic = %entry.topic, "entry already logged");
    }

    Ok(WeeklyLog {
        document,
        entry,
        inserted,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedLog {
    pub document: PathBuf,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped_sheets: Vec<String>,
}

/// Logs the student's latest entry from every report sheet of `workbook`,
/// saving the document once at the end when anything was inserted.
pub fn consolidate_student(
    root: &Path,
    student: &StudentRecord,
    workbook: &Workbook,
    tutor: &str,
    config: &Config,
) -> anyhow::Result<ConsolidatedLog> {
    let document = tracking_document(root, student, config)?;
    let mut docx = Docx::open(&document)?;
    let style = CellStyle::from_points(config.font_size_pt);
    let mut log = ConsolidatedLog {
        document,
        ..ConsolidatedLog::default()
    };

    for grid in workbook.sheets() {
        let table = match report::read_report(grid, &config.report_layout) {
            Ok(table) => table,
            Err(err) if matches!(err.downcast_ref::<CaseError>(), Some(CaseError::MissingColumns { .. })) => {
                tracing::debug!(sheet = %grid.name, "not a report sheet");
                log.skipped_sheets.push(grid.name.clone());
                continue;
            }
            Err(err) => return Err(err),
        };
        let row = match report::most_recent_for(&table, &student.full_name) {
            Ok(row) => row,
            Err(err) if matches!(err.downcast_ref::<CaseError>(), Some(CaseError::StudentNotInReport { .. })) => {
                tracing::debug!(sheet = %grid.name, student = %student.id, "student not in sheet");
                log.skipped_sheets.push(grid.name.clone());
                continue;
            }
            Err(err) => return Err(err),
        };

        let entry = entry_from_row(row, Outcome::Attended, tutor);
        if append_entry(docx.first_table_mut()?, &entry, Outcome::Attended, &config.tracking_columns, style)? {
            log.inserted += 1;
        } else {
            log.duplicates += 1;
        }
    }

    if log.inserted > 0 {
        docx.save()?;
    }
    tracing::info!(
        student = %student.id,
        inserted = log.inserted,
        duplicates = log.duplicates,
        skipped = log.skipped_sheets.len(),
        "consolidated report logged"
    );
    Ok(log)
}
