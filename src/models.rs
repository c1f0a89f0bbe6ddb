use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub full_name: String,
    pub id: String,
    pub program: String,
    pub period: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub intervention_area: String,
    pub age: String,
    pub semester: String,
    pub skills: String,
    pub group: String,
    pub supervisor: String,
    pub situation: String,
    pub average: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    pub source: PathBuf,
    pub students: Vec<StudentRecord>,
}

/// One attendance entry read from a report sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRow {
    pub full_name: String,
    pub date: Option<NaiveDateTime>,
    pub date_text: String,
    pub hour: String,
    pub topic: String,
    pub situation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Attended,
    Absent,
    NotApplicable,
    Homework,
    ExcusedAbsence,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Attended => "Sí",
            Outcome::Absent => "No",
            Outcome::NotApplicable => "N/A",
            Outcome::Homework => "Tarea",
            Outcome::ExcusedAbsence => "Falta justificada",
        }
    }

    /// Homework and excused absences count as attendance in the tracking table.
    pub fn recorded(self) -> Outcome {
        match self {
            Outcome::Homework | Outcome::ExcusedAbsence => Outcome::Attended,
            other => other,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "si" | "sí" | "yes" => Ok(Outcome::Attended),
            "no" => Ok(Outcome::Absent),
            "na" | "n/a" => Ok(Outcome::NotApplicable),
            "tarea" | "homework" => Ok(Outcome::Homework),
            "justificada" | "falta justificada" | "excused" => Ok(Outcome::ExcusedAbsence),
            other => Err(format!(
                "unknown outcome '{other}' (expected si, no, na, tarea, justificada)"
            )),
        }
    }
}

/// The five values written into one tracking-table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingEntry {
    pub date: String,
    pub topic: String,
    pub situation: String,
    pub outcome: String,
    pub tutor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StudentStatus {
    Done(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StudentResult {
    pub student_id: String,
    pub student_name: String,
    pub status: StudentStatus,
}
