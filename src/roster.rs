use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::error::CaseError;
use crate::models::{Roster, StudentRecord};
use crate::sheet::{clean_text, Grid, Workbook};

const NAME_COLUMN: &str = "Nombre completo";

/// Reads the roster from the first sheet of `path` and drops rows without a name.
pub fn load_roster(path: &Path) -> anyhow::Result<Roster> {
    let workbook = Workbook::open(path)?;
    let grid = workbook
        .first()
        .ok_or_else(|| CaseError::MissingSource(format!("{} has no sheets", path.display())))?;
    let students = students_from_grid(grid)
        .with_context(|| format!("failed to read roster {}", path.display()))?;

    if students.is_empty() {
        return Err(CaseError::NoValidRows {
            path: path.to_path_buf(),
        }
        .into());
    }

    tracing::info!(path = %path.display(), students = students.len(), "roster loaded");
    Ok(Roster {
        source: path.to_path_buf(),
        students,
    })
}

pub fn students_from_grid(grid: &Grid) -> anyhow::Result<Vec<StudentRecord>> {
    let mut rows = grid.rows();
    let header: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(|cell| cell.to_text()).collect())
        .unwrap_or_default();
    if !header.iter().any(|name| name == NAME_COLUMN) {
        return Err(CaseError::MissingColumns {
            sheet: grid.name.clone(),
            detected: header.join(", "),
        }
        .into());
    }

    let mut students = Vec::new();
    for cells in rows {
        let mut values = BTreeMap::new();
        for (index, name) in header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let value = cells
                .get(index)
                .map(|cell| cell.to_clean_text())
                .unwrap_or_default();
            values.insert(name.clone(), value);
        }
        let student = student_from_values(values);
        if student.full_name.is_empty() {
            continue;
        }
        students.push(student);
    }
    Ok(students)
}

fn student_from_values(mut values: BTreeMap<String, String>) -> StudentRecord {
    let mut take = |column: &str| values.remove(column).map(|v| clean_text(&v)).unwrap_or_default();
    let full_name = take(NAME_COLUMN);
    let id = take("Matrícula");
    let program = take("Programa");
    let period = take("Período");
    let day = take("Dia");
    let start_time = take("Hora inicio");
    let end_time = take("Hora final");
    let intervention_area = take("Área de intervención");
    let age = take("Edad");
    let semester = take("Semestre");
    let skills = take("Habilidades");
    let group = take("Grupo");
    let supervisor = take("Titular/Director");
    let situation = take("Situación");
    let average = take("Promedio Anterior");
    StudentRecord {
        full_name,
        id,
        program,
        period,
        day,
        start_time,
        end_time,
        intervention_area,
        age,
        semester,
        skills,
        group,
        supervisor,
        situation,
        average,
        extra: values,
    }
}

/// Students whose trimmed ID is in `ids`, in roster order. `all` selects everyone.
pub fn select<'a>(roster: &'a Roster, ids: &[String], all: bool) -> anyhow::Result<Vec<&'a StudentRecord>> {
    if all {
        return Ok(roster.students.iter().collect());
    }
    if ids.is_empty() {
        return Err(CaseError::NoSelection.into());
    }
    let wanted: Vec<&str> = ids.iter().map(|id| id.trim()).collect();
    let selected: Vec<&StudentRecord> = roster
        .students
        .iter()
        .filter(|student| wanted.contains(&student.id.trim()))
        .collect();
    for id in &wanted {
        if !selected.iter().any(|student| student.id.trim() == *id) {
            tracing::warn!(student = %id, "student id not found in roster");
        }
    }
    if selected.is_empty() {
        return Err(CaseError::NoSelection.into());
    }
    Ok(selected)
}

pub fn write_snapshot(roster: &Roster, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let bytes = rmp_serde::to_vec_named(roster).context("failed to encode roster snapshot")?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    tracing::debug!(path = %path.display(), "roster snapshot written");
    Ok(())
}

pub fn read_snapshot(path: &Path) -> anyhow::Result<Roster> {
    if !path.is_file() {
        return Err(CaseError::MissingSource(format!(
            "no roster snapshot at {}; run `case-files roster load <FILE>` first",
            path.display()
        ))
        .into());
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let roster = rmp_serde::from_slice(&bytes)
        .with_context(|| format!("snapshot {} is corrupt", path.display()))?;
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Cell;
    use tempfile::TempDir;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn sample_grid() -> Grid {
        Grid::from_rows(
            "Alumnos",
            vec![
                vec![
                    text("Nombre completo"),
                    text("Matrícula"),
                    text("Programa"),
                    text("Período"),
                    text("Tutor previo"),
                ],
                vec![text("Ana Lopez"), Cell::Number(123.0), text("BUNLA"), text("2024-2"), text("x")],
                vec![text("nan"), Cell::Number(124.0), text("LIC"), text("2024-2"), Cell::Empty],
                vec![Cell::Empty, Cell::Number(125.0), text("LIC"), text("2024-2"), Cell::Empty],
                vec![text("Bruno Diaz"), text(" 126 "), text("LIC"), text("nan"), Cell::Empty],
            ],
        )
    }

    #[test]
    fn drops_rows_with_blank_or_nan_names() -> anyhow::Result<()> {
        let students = students_from_grid(&sample_grid())?;
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].full_name, "Ana Lopez");
        assert_eq!(students[0].id, "123");
        assert_eq!(students[0].extra.get("Tutor previo").map(String::as_str), Some("x"));
        assert_eq!(students[1].id, "126");
        assert_eq!(students[1].period, "");
        Ok(())
    }

    #[test]
    fn missing_name_column_reports_detected_headers() {
        let grid = Grid::from_rows("Hoja1", vec![vec![text("Nombre"), text("ID")]]);
        let err = students_from_grid(&grid).unwrap_err();
        match err.downcast_ref::<CaseError>() {
            Some(CaseError::MissingColumns { detected, .. }) => assert_eq!(detected, "Nombre, ID"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn roster_without_valid_rows_fails() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("vacio.csv");
        std::fs::write(&path, "Nombre completo,Matrícula\nnan,1\n ,2\n")?;
        let err = load_roster(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaseError>(),
            Some(CaseError::NoValidRows { .. })
        ));
        Ok(())
    }

    #[test]
    fn snapshot_restores_the_loaded_roster() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let csv_path = dir.path().join("alumnos.csv");
        std::fs::write(
            &csv_path,
            "Nombre completo,Matrícula,Programa,Período\nAna Lopez,123,BUNLA,2024-2\nBruno Diaz,126,LIC,2024-2\n",
        )?;
        let roster = load_roster(&csv_path)?;

        let snapshot = dir.path().join("state").join("roster.snapshot");
        write_snapshot(&roster, &snapshot)?;
        let restored = read_snapshot(&snapshot)?;
        assert_eq!(restored.students, roster.students);
        assert_eq!(restored.source, csv_path);
        Ok(())
    }

    #[test]
    fn selection_filters_by_trimmed_id_in_roster_order() -> anyhow::Result<()> {
        let roster = Roster {
            source: "alumnos.csv".into(),
            students: students_from_grid(&sample_grid())?,
        };
        let selected = select(&roster, &["126".to_string(), " 123".to_string()], false)?;
        let ids: Vec<&str> = selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["123", "126"]);

        assert_eq!(select(&roster, &[], true)?.len(), 2);
        assert!(select(&roster, &[], false).is_err());
        assert!(select(&roster, &["999".to_string()], false).is_err());
        Ok(())
    }
}
