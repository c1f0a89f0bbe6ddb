use std::path::Path;

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::CaseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Text form of the cell; whole numbers drop their decimal part and
    /// pure times print as `HH:MM:SS`.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.trim().to_string(),
            Cell::Number(value) => format_number(*value),
            Cell::Bool(value) => if *value { "True" } else { "False" }.to_string(),
            Cell::DateTime(value) => {
                if value.date() == excel_epoch() {
                    value.format("%H:%M:%S").to_string()
                } else if value.time().num_seconds_from_midnight() == 0 {
                    value.format("%Y-%m-%d").to_string()
                } else {
                    value.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }

    /// Text with the spreadsheet placeholder `nan` treated as blank.
    pub fn to_clean_text(&self) -> String {
        clean_text(&self.to_text())
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(value) => Some(*value),
            Cell::Text(text) => parse_datetime(text),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.to_clean_text().is_empty()
    }
}

pub fn clean_text(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Converts an Excel serial day number (1900 date system) to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    excel_epoch()
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::days(days) + Duration::seconds(seconds))
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d/%m/%Y %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Some(value);
        }
    }
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
    for format in DATE_FORMATS {
        if let Ok(value) = NaiveDate::parse_from_str(text, format) {
            return value.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn from_data(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::String(text) => Cell::Text(text.clone()),
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(value) => excel_serial_to_datetime(value.as_f64())
            .map(Cell::DateTime)
            .unwrap_or(Cell::Number(value.as_f64())),
        Data::DateTimeIso(text) => parse_datetime(text)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(text.clone())),
        Data::DurationIso(text) => Cell::Text(text.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub name: String,
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn from_rows(name: &str, rows: Vec<Vec<Cell>>) -> Self {
        Grid {
            name: name.to_string(),
            rows,
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(EMPTY)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|row| row.as_slice())
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

fn read_csv(path: &Path) -> anyhow::Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to parse {}", path.display()))?;
        rows.push(
            record
                .iter()
                .map(|value| {
                    if value.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(value.to_string())
                    }
                })
                .collect(),
        );
    }
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Grid::from_rows(&name, rows))
}

/// Zero-based index of the weekly sheet in a multi-sheet report workbook.
pub const WEEKLY_SHEET: usize = 2;

/// An opened spreadsheet file, one [`Grid`] per sheet. CSV files open as a
/// single sheet.
pub struct Workbook {
    sheets: Vec<Grid>,
}

impl Workbook {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(CaseError::MissingSource(path.display().to_string()).into());
        }
        if is_csv(path) {
            return Ok(Workbook {
                sheets: vec![read_csv(path)?],
            });
        }

        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("failed to open spreadsheet {}", path.display()))?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .with_context(|| format!("failed to read sheet '{name}' of {}", path.display()))?;
            let (start_row, start_col) = range.start().unwrap_or((0, 0));
            let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
            for row in range.rows() {
                let mut cells = vec![Cell::Empty; start_col as usize];
                cells.extend(row.iter().map(from_data));
                rows.push(cells);
            }
            sheets.push(Grid::from_rows(&name, rows));
        }
        tracing::debug!(path = %path.display(), sheets = sheets.len(), "workbook opened");
        Ok(Workbook { sheets })
    }

    pub fn from_sheets(sheets: Vec<Grid>) -> Self {
        Workbook { sheets }
    }

    pub fn sheets(&self) -> &[Grid] {
        &self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Grid> {
        self.sheets.get(index)
    }

    pub fn first(&self) -> Option<&Grid> {
        self.sheets.first()
    }

    /// The weekly report sheet: `requested` when given, otherwise the only
    /// sheet of a single-sheet workbook or [`WEEKLY_SHEET`].
    pub fn weekly_sheet(&self, requested: Option<usize>) -> Option<&Grid> {
        match requested {
            Some(index) => self.sheet(index),
            None if self.sheets.len() == 1 => self.first(),
            None => self.sheet(WEEKLY_SHEET),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn whole_numbers_render_without_decimals() {
        assert_eq!(Cell::Number(123.0).to_text(), "123");
        assert_eq!(Cell::Number(8.75).to_text(), "8.75");
        assert_eq!(Cell::Text("  nan ".to_string()).to_clean_text(), "");
    }

    #[test]
    fn excel_serials_convert_to_dates_and_times() {
        let date = excel_serial_to_datetime(45292.0).unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2024-01-01");

        let time = excel_serial_to_datetime(0.5).unwrap();
        assert_eq!(Cell::DateTime(time).to_text(), "12:00:00");
    }

    #[test]
    fn parses_common_date_spellings() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-03-01"), Some(expected));
        assert_eq!(parse_datetime("01/03/2024"), Some(expected));
        assert_eq!(parse_datetime("pendiente"), None);
    }

    #[test]
    fn csv_files_load_as_single_sheet() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "Nombre completo,Matrícula\nAna Lopez,123\n,\n")?;

        let workbook = Workbook::open(&path)?;
        let grid = workbook.first().unwrap();
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.get(1, 0).to_text(), "Ana Lopez");
        assert!(grid.get(2, 1).is_blank());
        assert_eq!(grid.get(40, 40), &Cell::Empty);
        Ok(())
    }

    #[test]
    fn weekly_sheet_falls_back_to_the_only_sheet() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("semana.csv");
        std::fs::write(&path, "Nombre,Apellidos\nAna,Lopez\n")?;
        let single = Workbook::open(&path)?;
        assert_eq!(single.weekly_sheet(None).map(|g| g.name.as_str()), Some("semana"));
        assert!(single.weekly_sheet(Some(2)).is_none());

        let names = ["Portada", "Resumen", "Semana 3", "Semana 4"];
        let many = Workbook::from_sheets(
            names
                .iter()
                .map(|name| Grid::from_rows(name, Vec::new()))
                .collect(),
        );
        assert_eq!(many.weekly_sheet(None).map(|g| g.name.as_str()), Some("Semana 3"));
        assert_eq!(many.weekly_sheet(Some(3)).map(|g| g.name.as_str()), Some("Semana 4"));
        Ok(())
    }

    #[test]
    fn missing_file_is_a_missing_source() {
        let err = Workbook::open(Path::new("/nonexistent/roster.xlsx"))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<CaseError>(),
            Some(CaseError::MissingSource(_))
        ));
    }
}
