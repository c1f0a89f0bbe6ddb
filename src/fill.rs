use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};

use crate::docx::xml::{Element, Node};
use crate::docx::Docx;
use crate::layout;
use crate::models::StudentRecord;
use crate::sheet::clean_text;

/// Weekday names indexed from Monday = 0.
pub const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

pub const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Programs whose documents use the high-school fields.
pub const HIGH_SCHOOL_PROGRAMS: [&str; 3] = ["BUNLA", "BIUNLA", "BUNLAV"];

pub const UNDEFINED_MEETING: &str = "FECHA NO DEFINIDA";

pub fn weekday_index(day: &str) -> Option<usize> {
    let day = day.trim().to_lowercase();
    WEEKDAYS.iter().position(|name| *name == day)
}

fn month_name(date: &NaiveDateTime) -> &'static str {
    MONTHS[date.month0() as usize]
}

fn weekday_name(date: &NaiveDateTime) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_monday() as usize]
}

/// Normalizes a schedule cell to `HH:MM`. Accepts `H:M[:S]` text or a
/// spreadsheet day fraction; anything else becomes `00:00`.
pub fn format_time(value: &str) -> String {
    let value = value.trim();
    if value.contains(':') {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() >= 2 {
            return format!("{:0>2}:{:0>2}", parts[0].trim(), parts[1].trim());
        }
    }
    match value.parse::<f64>() {
        Ok(fraction) if fraction.is_finite() => {
            let hours_total = fraction * 24.0;
            let hours = hours_total.trunc() as i64;
            let minutes = ((hours_total - hours_total.trunc()) * 60.0).trunc() as i64;
            format!("{hours:02}:{minutes:02}")
        }
        _ => "00:00".to_string(),
    }
}

/// Banner for the next meeting on `day` at `start` ("HH:MM"), counted from
/// `now`. A meeting later today counts as today; one that already started
/// moves to next week. Unknown day names are treated as Monday.
pub fn next_meeting(day: &str, start: &str, now: NaiveDateTime) -> String {
    let day = clean_text(day);
    if day.is_empty() {
        return UNDEFINED_MEETING.to_string();
    }

    let mut parts = start.split(':');
    let hour = parts.next().and_then(|h| h.trim().parse::<u32>().ok());
    let minute = parts.next().and_then(|m| m.trim().parse::<u32>().ok());
    let start_time = match (hour, minute) {
        (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN),
        _ => NaiveTime::MIN,
    };

    let today = now.weekday().num_days_from_monday() as i64;
    let meeting = weekday_index(&day).unwrap_or(0) as i64;
    let days_ahead = if meeting < today || (meeting == today && start_time <= now.time()) {
        7 - (today - meeting)
    } else {
        meeting - today
    };
    let date = now + Duration::days(days_ahead);

    format!(
        "{} {} DE {} A LAS {}",
        day.to_uppercase(),
        date.day(),
        month_name(&date).to_uppercase(),
        start
    )
}

/// Placeholder token and replacement pairs for one student.
pub fn placeholders(student: &StudentRecord, tutor: &str, now: NaiveDateTime) -> Vec<(&'static str, String)> {
    let start = format_time(&student.start_time);
    let end = format_time(&student.end_time);
    let schedule = format!("{} {}-{}", student.day, start, end);

    let high_school = HIGH_SCHOOL_PROGRAMS.contains(&student.program.as_str());
    let (program, program_high_school, group) = if high_school {
        (String::new(), student.program.clone(), student.group.clone())
    } else {
        (student.program.clone(), String::new(), String::new())
    };

    let long_date = format!("{:02} de {} de {}", now.day(), month_name(&now), now.year());
    let banner = format!("{} {:02} de {}", weekday_name(&now), now.day(), month_name(&now)).to_uppercase();

    vec![
        ("{NOMBRE}", student.full_name.clone()),
        ("{NOMBREMAY}", student.full_name.to_uppercase()),
        ("{MATRICULA}", student.id.clone()),
        ("{PROGRAMA}", program),
        ("{PROGRAMABACH}", program_high_school),
        ("{GRUPO}", group),
        ("{TitularDir}", student.supervisor.clone()),
        ("{SITUACIÓN}", student.situation.clone()),
        ("{PERIODO}", student.period.clone()),
        ("{PROMEDIO}", student.average.clone()),
        ("{EDAD}", format!("{} años", student.age)),
        ("{AREA}", student.intervention_area.clone()),
        ("{TUTOR}", tutor.to_string()),
        ("{SEMESTRE}", student.semester.clone()),
        ("{HORARIO}", schedule),
        ("{HABILIDADES}", student.skills.clone()),
        ("{FECHA}", now.format("%d/%m/%Y").to_string()),
        ("{FECHALARGA}", long_date),
        ("{FECHADIASNANO}", banner),
        ("{HORAINICIO}", start.clone()),
        ("{HORAFINAL}", end),
        ("{DIAINICIO}", student.day.clone()),
        ("{PROXREUNION}", next_meeting(&student.day, &start, now)),
    ]
}

/// Replaces tokens inside each `w:t` of every run. A token split across
/// runs is left as is. Returns the number of replacements.
pub fn replace_tokens(root: &mut Element, tokens: &[(&str, String)]) -> usize {
    let mut replaced = 0;
    root.visit_mut(&mut |el: &mut Element| {
        if el.name != "w:t" {
            return;
        }
        for node in el.children.iter_mut() {
            let Node::Text(text) = node else { continue };
            for (token, value) in tokens {
                let count = text.matches(token).count();
                if count > 0 {
                    *text = text.replace(token, value);
                    replaced += count;
                }
            }
        }
    });
    replaced
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FillReport {
    pub updated: Vec<PathBuf>,
    pub unchanged: usize,
    pub failed: Vec<(PathBuf, String)>,
}

fn fill_document(path: &Path, tokens: &[(&str, String)]) -> anyhow::Result<bool> {
    let mut docx = Docx::open(path)?;
    let replaced = replace_tokens(docx.document_mut(), tokens);
    if replaced == 0 {
        return Ok(false);
    }
    docx.save()?;
    Ok(true)
}

/// Fills every document in the student's folder. Documents that fail are
/// recorded in the report and the rest are still processed.
pub fn fill_student(
    root: &Path,
    student: &StudentRecord,
    tutor: &str,
    now: NaiveDateTime,
) -> anyhow::Result<FillReport> {
    let folder = layout::student_folder(root, student);
    if !folder.is_dir() {
        return Err(crate::error::CaseError::artifact(
            &student.full_name,
            &format!("student folder {}", folder.display()),
        )
        .into());
    }

    let tokens = placeholders(student, tutor, now);
    let mut report = FillReport::default();
    for path in layout::documents_under(&folder) {
        match fill_document(&path, &tokens) {
            Ok(true) => {
                tracing::debug!(path = %path.display(), "placeholders replaced");
                report.updated.push(path);
            }
            Ok(false) => report.unchanged += 1,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "document skipped");
                report.failed.push((path, format!("{err:#}")));
            }
        }
    }
    tracing::info!(
        student = %student.id,
        updated = report.updated.len(),
        failed = report.failed.len(),
        "documents filled"
    );
    Ok(report)
}
