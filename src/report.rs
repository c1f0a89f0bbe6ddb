use crate::config::ReportLayout;
use crate::error::CaseError;
use crate::models::ReportRow;
use crate::sheet::{Cell, Grid};

const SAMPLE_NAMES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ReportTable {
    pub rows: Vec<ReportRow>,
}

fn position(columns: &[String], exact: &[&str], partial: &[&str]) -> Option<usize> {
    let lower: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    lower
        .iter()
        .position(|c| exact.contains(&c.as_str()))
        .or_else(|| {
            lower
                .iter()
                .position(|c| partial.iter().any(|needle| c.contains(needle)))
        })
}

/// Reads the report table whose header sits at `layout.header_row` between
/// `layout.first_column` and `layout.last_column`.
pub fn read_report(grid: &Grid, layout: &ReportLayout) -> anyhow::Result<ReportTable> {
    let span: Vec<usize> = (layout.first_column..=layout.last_column).collect();
    let columns: Vec<String> = span
        .iter()
        .map(|&col| grid.get(layout.header_row, col).to_text())
        .collect();

    let name_col = columns.iter().position(|c| c.to_lowercase() == "nombre");
    let surname_col = columns
        .iter()
        .position(|c| matches!(c.to_lowercase().as_str(), "apellidos" | "apellido"));
    let (Some(name_col), Some(surname_col)) = (name_col, surname_col) else {
        return Err(CaseError::MissingColumns {
            sheet: grid.name.clone(),
            detected: columns.join(", "),
        }
        .into());
    };

    let date_col = position(&columns, &["fecha de atención"], &["fecha"]);
    let topic_col = position(&columns, &["tema o asunto tratado"], &["tema", "asunto"]);
    let situation_col = position(&columns, &["situación del alumno"], &["situac"]);
    let hour_col = position(&columns, &["hora"], &[]);

    let mut rows = Vec::new();
    for row in layout.header_row + 1..grid.height() {
        let cells: Vec<&Cell> = span.iter().map(|&col| grid.get(row, col)).collect();
        if cells.iter().all(|cell| cell.is_blank()) {
            continue;
        }
        let text = |col: Option<usize>| col.map(|c| cells[c].to_clean_text()).unwrap_or_default();
        let full_name = format!(
            "{} {}",
            cells[name_col].to_clean_text(),
            cells[surname_col].to_clean_text()
        )
        .trim()
        .to_string();
        rows.push(ReportRow {
            full_name,
            date: date_col.and_then(|c| cells[c].as_datetime()),
            date_text: text(date_col),
            hour: text(hour_col),
            topic: text(topic_col),
            situation: text(situation_col),
        });
    }

    tracing::debug!(sheet = %grid.name, rows = rows.len(), "report sheet read");
    Ok(ReportTable { rows })
}

fn normalize(name: &str) -> String {
    name.trim().to_uppercase()
}

/// The entry for `target` (case-insensitive, trimmed) with the latest date.
/// Undated entries rank before dated ones; among equal dates the later row wins.
pub fn most_recent_for<'a>(table: &'a ReportTable, target: &str) -> anyhow::Result<&'a ReportRow> {
    let wanted = normalize(target);
    let mut best: Option<&ReportRow> = None;
    for row in table.rows.iter().filter(|row| normalize(&row.full_name) == wanted) {
        match best {
            Some(current) if row.date < current.date => {}
            _ => best = Some(row),
        }
    }

    best.ok_or_else(|| {
        let mut sample: Vec<&str> = Vec::new();
        for row in &table.rows {
            if !row.full_name.is_empty() && !sample.contains(&row.full_name.as_str()) {
                sample.push(&row.full_name);
            }
            if sample.len() == SAMPLE_NAMES {
                break;
            }
        }
        CaseError::StudentNotInReport {
            target: target.to_string(),
            sample: sample.join(", "),
        }
        .into()
    })
}
