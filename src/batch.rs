use crate::error::CaseError;
use crate::models::{StudentRecord, StudentResult, StudentStatus};

/// Runs `op` for every student. A missing folder or document skips the
/// student, any other error marks it failed; the batch always continues.
pub fn run_batch<F>(students: &[StudentRecord], mut op: F) -> Vec<StudentResult>
where
    F: FnMut(&StudentRecord) -> anyhow::Result<StudentStatus>,
{
    students
        .iter()
        .map(|student| {
            let status = match op(student) {
                Ok(status) => status,
                Err(err) => {
                    let message = format!("{err:#}");
                    tracing::warn!(student = %student.id, error = %message, "student not processed");
                    match err.downcast_ref::<CaseError>() {
                        Some(CaseError::MissingStudentArtifact { .. }) => StudentStatus::Skipped(message),
                        _ => StudentStatus::Failed(message),
                    }
                }
            };
            StudentResult {
                student_id: student.id.clone(),
                student_name: student.full_name.clone(),
                status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn student(id: &str, name: &str) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            full_name: name.to_string(),
            ..StudentRecord::default()
        }
    }

    #[test]
    fn errors_are_classified_and_the_batch_continues() {
        let students = vec![
            student("123", "Ana Lopez"),
            student("456", "Bruno Diaz"),
            student("789", "Carla Ruiz"),
        ];
        let mut seen = Vec::new();

        let results = run_batch(&students, |s| {
            seen.push(s.id.clone());
            match s.id.as_str() {
                "123" => Err(CaseError::artifact(&s.full_name, "student folder").into()),
                "456" => Err(CaseError::FileLocked {
                    path: PathBuf::from("5_Seguimiento.docx"),
                }
                .into()),
                _ => Ok(StudentStatus::Done("1 row inserted".to_string())),
            }
        });

        assert_eq!(seen, vec!["123", "456", "789"]);
        let ids: Vec<&str> = results.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["123", "456", "789"]);
        assert_eq!(
            results[0].status,
            StudentStatus::Skipped("student folder not found for Ana Lopez".to_string())
        );
        assert!(matches!(&results[1].status, StudentStatus::Failed(msg) if msg.contains("5_Seguimiento.docx")));
        assert_eq!(results[2].status, StudentStatus::Done("1 row inserted".to_string()));
        assert_eq!(results[2].student_name, "Carla Ruiz");
    }

    #[test]
    fn plain_errors_fail_the_student() {
        let results = run_batch(&[student("1", "X")], |_| Err(anyhow::anyhow!("disk full")));
        assert_eq!(results[0].status, StudentStatus::Failed("disk full".to_string()));
    }
}
