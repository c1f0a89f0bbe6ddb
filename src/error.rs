use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaseError {
    #[error("source not found or unreadable: {0}")]
    MissingSource(String),

    #[error("sheet '{sheet}' does not contain the expected columns 'Nombre' and 'Apellidos'. Detected columns: {detected}")]
    MissingColumns { sheet: String, detected: String },

    #[error("no report entries found for '{target}'. Some detected names: {sample}")]
    StudentNotInReport { target: String, sample: String },

    #[error("{what} not found for {student}")]
    MissingStudentArtifact { student: String, what: String },

    #[error("cannot write {}: the file is open in another program. Close it and try again", .path.display())]
    FileLocked { path: PathBuf },

    #[error("document {} contains no tables", .path.display())]
    NoTable { path: PathBuf },

    #[error("no students with a valid name were found in {}", .path.display())]
    NoValidRows { path: PathBuf },

    #[error("unknown tutor '{0}'. Run `case-files config show` to list tutors")]
    UnknownTutor(String),

    #[error("the inner folder prefix (text before '@') must not be empty")]
    EmptyPrefix,

    #[error("no students selected: pass --student <ID> or --all")]
    NoSelection,
}

impl CaseError {
    pub fn artifact(student: &str, what: &str) -> Self {
        CaseError::MissingStudentArtifact {
            student: student.to_string(),
            what: what.to_string(),
        }
    }
}

/// Maps a permission failure on `path` to `FileLocked`, leaving other IO errors intact.
pub fn locked_or_io(err: std::io::Error, path: &std::path::Path) -> anyhow::Error {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        CaseError::FileLocked {
            path: path.to_path_buf(),
        }
        .into()
    } else {
        anyhow::Error::new(err).context(format!("failed to access {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};
    use std::path::Path;

    #[test]
    fn permission_denied_reads_as_locked_file() {
        let path = Path::new("/casos/5_Seguimiento individual_AL.docx");
        let err = locked_or_io(IoError::from(ErrorKind::PermissionDenied), path);
        match err.downcast_ref::<CaseError>() {
            Some(CaseError::FileLocked { path: locked }) => assert_eq!(locked, path),
            other => panic!("expected FileLocked, got {other:?}"),
        }
        assert!(err.to_string().contains("open in another program"));
    }

    #[test]
    fn other_io_errors_keep_their_kind() {
        let path = Path::new("/casos/falta.docx");
        let err = locked_or_io(IoError::from(ErrorKind::NotFound), path);
        assert!(err.downcast_ref::<CaseError>().is_none());
        assert_eq!(
            err.downcast_ref::<IoError>().map(IoError::kind),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(err.to_string(), "failed to access /casos/falta.docx");
    }
}
