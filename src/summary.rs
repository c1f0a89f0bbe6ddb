use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::models::{StudentResult, StudentStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn tally(results: &[StudentResult]) -> Tally {
    let mut counts = Tally::default();
    for result in results {
        match result.status {
            StudentStatus::Done(_) => counts.done += 1,
            StudentStatus::Skipped(_) => counts.skipped += 1,
            StudentStatus::Failed(_) => counts.failed += 1,
        }
    }
    counts
}

fn status_parts(status: &StudentStatus) -> (&'static str, &String) {
    match status {
        StudentStatus::Done(detail) => ("ok", detail),
        StudentStatus::Skipped(detail) => ("skipped", detail),
        StudentStatus::Failed(detail) => ("failed", detail),
    }
}

fn status_line(result: &StudentResult) -> String {
    let (label, detail) = status_parts(&result.status);
    format!(
        "{} {} [{}]: {}",
        result.student_id, result.student_name, label, detail
    )
}

/// Plain lines for the terminal, one per student, then the totals.
pub fn console_lines(results: &[StudentResult]) -> Vec<String> {
    let counts = tally(results);
    let mut lines: Vec<String> = results.iter().map(status_line).collect();
    lines.push(format!(
        "{} ok, {} skipped, {} failed.",
        counts.done, counts.skipped, counts.failed
    ));
    lines
}

pub fn build_summary(command: &str, generated_at: NaiveDateTime, results: &[StudentResult]) -> String {
    let counts = tally(results);
    let mut output = String::new();

    let _ = writeln!(output, "# Case Files Batch Summary");
    let _ = writeln!(
        output,
        "`{}` run on {}",
        command,
        generated_at.format("%d/%m/%Y %H:%M")
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} students: {} ok, {} skipped, {} failed",
        results.len(),
        counts.done,
        counts.skipped,
        counts.failed
    );

    let sections = [("Completed", "ok"), ("Skipped", "skipped"), ("Failed", "failed")];

    for (title, wanted) in sections {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {title}");
        let rows: Vec<(&StudentResult, &String)> = results
            .iter()
            .map(|r| (r, status_parts(&r.status)))
            .filter(|(_, (label, _))| *label == wanted)
            .map(|(r, (_, detail))| (r, detail))
            .collect();
        if rows.is_empty() {
            let _ = writeln!(output, "None.");
            continue;
        }
        for (result, detail) in rows {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                result.student_name, result.student_id, detail
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn result(id: &str, name: &str, status: StudentStatus) -> StudentResult {
        StudentResult {
            student_id: id.to_string(),
            student_name: name.to_string(),
            status,
        }
    }

    fn sample() -> Vec<StudentResult> {
        vec![
            result("123", "Ana Lopez", StudentStatus::Done("1 row inserted".to_string())),
            result("456", "Bruno Diaz", StudentStatus::Skipped("entry already logged".to_string())),
            result("789", "Carla Ruiz", StudentStatus::Done("1 row inserted".to_string())),
        ]
    }

    #[test]
    fn tally_counts_each_status() {
        let mut results = sample();
        results.push(result("1", "X", StudentStatus::Failed("locked".to_string())));
        assert_eq!(
            tally(&results),
            Tally {
                done: 2,
                skipped: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn console_lines_end_with_totals() {
        let lines = console_lines(&sample());
        assert_eq!(lines[1], "456 Bruno Diaz [skipped]: entry already logged");
        assert_eq!(lines.last().map(String::as_str), Some("2 ok, 1 skipped, 0 failed."));
    }

    #[test]
    fn markdown_groups_students_by_status() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let summary = build_summary("log", at, &sample());

        assert!(summary.starts_with("# Case Files Batch Summary\n`log` run on 01/03/2024 09:30\n"));
        assert!(summary.contains("3 students: 2 ok, 1 skipped, 0 failed"));
        assert!(summary.contains("## Completed\n- Ana Lopez (123): 1 row inserted\n- Carla Ruiz (789): 1 row inserted\n"));
        assert!(summary.contains("## Failed\nNone.\n"));
    }
}
