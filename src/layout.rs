use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CaseError;
use crate::models::StudentRecord;

/// First letter of every word, uppercased: "ana lopez" -> "AL".
pub fn initials(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .filter_map(|part| part.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// `{ID}_{NAME}_{PROGRAM}` with the name uppercased.
pub fn student_folder_name(id: &str, full_name: &str, program: &str) -> String {
    format!("{}_{}_{}", id.trim(), full_name.trim().to_uppercase(), program.trim())
}

pub fn inner_folder_name(prefix: &str, student: &StudentRecord) -> String {
    format!(
        "{}@{}_{}_{}_{}",
        prefix.trim(),
        student.period,
        student.id,
        initials(&student.full_name),
        student.program
    )
}

pub fn student_folder(root: &Path, student: &StudentRecord) -> PathBuf {
    root.join(student_folder_name(&student.id, &student.full_name, &student.program))
}

/// The folder a student's documents live in: the student folder itself, or its
/// only subfolder when there is exactly one.
pub fn working_folder(root: &Path, student: &StudentRecord) -> anyhow::Result<PathBuf> {
    let folder = student_folder(root, student);
    if !folder.is_dir() {
        return Err(CaseError::artifact(
            &student.full_name,
            &format!("student folder {}", folder.display()),
        )
        .into());
    }

    let subdirs: Vec<PathBuf> = std::fs::read_dir(&folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    if let [only] = subdirs.as_slice() {
        return Ok(only.clone());
    }
    Ok(folder)
}

fn file_name_of(entry: &walkdir::DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

fn is_docx(name: &str) -> bool {
    name.to_lowercase().ends_with(".docx")
}

/// All `.docx` files under `folder`, in sorted walk order.
pub fn documents_under(folder: &Path) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = file_name_of(entry);
            // Word lock files
            is_docx(&name) && !name.starts_with("~$")
        })
        .map(|entry| entry.into_path())
        .collect()
}

pub fn find_document(folder: &Path, prefix: &str, student: &str, what: &str) -> anyhow::Result<PathBuf> {
    documents_under(folder)
        .into_iter()
        .find(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().starts_with(prefix))
                .unwrap_or(false)
        })
        .ok_or_else(|| CaseError::artifact(student, &format!("{what} (a .docx starting with '{prefix}')")).into())
}

pub fn find_folder(folder: &Path, prefix: &str, student: &str, what: &str) -> anyhow::Result<PathBuf> {
    WalkDir::new(folder)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_dir() && file_name_of(entry).starts_with(prefix))
        .map(|entry| entry.into_path())
        .ok_or_else(|| CaseError::artifact(student, &format!("{what} (a folder starting with '{prefix}')")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn student() -> StudentRecord {
        StudentRecord {
            full_name: "Ana Lopez".to_string(),
            id: "123".to_string(),
            program: "BUNLA".to_string(),
            period: "2024-2".to_string(),
            ..StudentRecord::default()
        }
    }

    #[test]
    fn folder_name_is_deterministic() {
        assert_eq!(student_folder_name("123", "ANA LOPEZ", "BUNLA"), "123_ANA LOPEZ_BUNLA");
        assert_eq!(student_folder_name("123", "Ana Lopez", "BUNLA"), "123_ANA LOPEZ_BUNLA");
    }

    #[test]
    fn initials_take_first_letter_of_each_word() {
        assert_eq!(initials("ana  lopez garcía"), "ALG");
        assert_eq!(initials("élia núñez"), "ÉN");
        assert_eq!(initials(""), "");
    }

    #[test]
    fn inner_folder_uses_prefix_period_and_initials() {
        assert_eq!(inner_folder_name("tutor1", &student()), "tutor1@2024-2_123_AL_BUNLA");
    }

    #[test]
    fn working_folder_descends_into_single_subfolder() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let folder = root.path().join("123_ANA LOPEZ_BUNLA");
        let inner = folder.join("tutor1@2024-2_123_AL_BUNLA");
        std::fs::create_dir_all(&inner)?;
        assert_eq!(working_folder(root.path(), &student())?, inner);

        std::fs::create_dir_all(folder.join("otra"))?;
        assert_eq!(working_folder(root.path(), &student())?, folder);
        Ok(())
    }

    #[test]
    fn missing_student_folder_is_reported() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let err = working_folder(root.path(), &student()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaseError>(),
            Some(CaseError::MissingStudentArtifact { .. })
        ));
        Ok(())
    }

    #[test]
    fn finds_documents_and_folders_by_prefix() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let base = root.path();
        std::fs::create_dir_all(base.join("6_Evidencias_AL_BUNLA_2024-2"))?;
        std::fs::write(base.join("5_Seguimiento individual_AL.docx"), b"")?;
        std::fs::write(base.join("~$5_Seguimiento individual_AL.docx"), b"")?;
        std::fs::write(base.join("3_Entrevista extendida_AL.pdf"), b"")?;

        let tracking = find_document(base, "5_Seguimiento individual_", "Ana", "tracking document")?;
        assert!(tracking.ends_with("5_Seguimiento individual_AL.docx"));
        assert!(find_document(base, "3_Entrevista extendida_", "Ana", "interview document").is_err());

        let evidence = find_folder(base, "6_Evidencias_", "Ana", "evidence folder")?;
        assert!(evidence.ends_with("6_Evidencias_AL_BUNLA_2024-2"));
        Ok(())
    }
}
