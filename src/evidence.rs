use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{Rgb, RgbImage};

use crate::config::Config;
use crate::error::CaseError;
use crate::layout;
use crate::models::{Outcome, StudentRecord};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const BLANK_SIZE: u32 = 200;
const BLANK_ACTIVITY: &str = "BORRAR";

fn is_counted_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Number of `.jpg/.jpeg/.png` files directly in `folder`, plus one.
///
/// Filenames are not parsed, so a deleted or renamed file can lead to a
/// repeated session number.
pub fn next_session_number(folder: &Path) -> anyhow::Result<usize> {
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("failed to list evidence folder {}", folder.display()))?;
    let count = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_counted_image(path))
        .count();
    Ok(count + 1)
}

/// `Sesión{n}_{activity words joined by _}_{initials}{ext}`
pub fn evidence_file_name(session: usize, activity: &str, initials: &str, ext: &str) -> String {
    let activity = activity.split_whitespace().collect::<Vec<_>>().join("_");
    format!("Sesión{session}_{activity}_{initials}{ext}")
}

/// Copies `source` into the evidence folder under the next session name.
pub fn file_evidence(folder: &Path, source: &Path, activity: &str, initials: &str) -> anyhow::Result<PathBuf> {
    if !source.is_file() {
        return Err(CaseError::MissingSource(format!("evidence image {}", source.display())).into());
    }
    let ext = source
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    let session = next_session_number(folder)?;
    let dest = folder.join(evidence_file_name(session, activity, initials, &ext));
    std::fs::copy(source, &dest)
        .with_context(|| format!("failed to copy {} to {}", source.display(), dest.display()))?;
    tracing::info!(path = %dest.display(), "evidence filed");
    Ok(dest)
}

/// Writes a white placeholder image for a missed session.
pub fn blank_evidence(folder: &Path, initials: &str) -> anyhow::Result<PathBuf> {
    let session = next_session_number(folder)?;
    let dest = folder.join(evidence_file_name(session, BLANK_ACTIVITY, initials, ".jpeg"));
    RgbImage::from_pixel(BLANK_SIZE, BLANK_SIZE, Rgb([255, 255, 255]))
        .save(&dest)
        .with_context(|| format!("failed to write {}", dest.display()))?;
    tracing::info!(path = %dest.display(), "blank evidence created");
    Ok(dest)
}

pub fn evidence_folder(root: &Path, student: &StudentRecord, config: &Config) -> anyhow::Result<PathBuf> {
    let folder = layout::working_folder(root, student)?;
    layout::find_folder(&folder, &config.prefixes.evidence, &student.full_name, "evidence folder")
}

/// A photo supplied for an attended session.
#[derive(Debug, Clone)]
pub struct EvidencePhoto {
    pub image: PathBuf,
    pub activity: String,
}

/// Files evidence for a logged session according to its outcome. Attended
/// sessions (including homework and excused absences) copy `photo` when one
/// is given, absences get a blank image, `N/A` files nothing.
pub fn record_evidence(
    folder: &Path,
    student: &StudentRecord,
    outcome: Outcome,
    photo: Option<&EvidencePhoto>,
) -> anyhow::Result<Option<PathBuf>> {
    let initials = layout::initials(&student.full_name);
    match outcome.recorded() {
        Outcome::Attended => match photo {
            Some(photo) => file_evidence(folder, &photo.image, &photo.activity, &initials).map(Some),
            None => Ok(None),
        },
        Outcome::Absent => blank_evidence(folder, &initials).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn student() -> StudentRecord {
        StudentRecord {
            full_name: "Ana Lopez".to_string(),
            id: "123".to_string(),
            ..StudentRecord::default()
        }
    }

    #[test]
    fn session_number_counts_existing_images() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        for name in ["a.jpg", "b.JPEG", "c.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x")?;
        }
        std::fs::create_dir(dir.path().join("old.png"))?;
        assert_eq!(next_session_number(dir.path())?, 4);
        Ok(())
    }

    #[test]
    fn file_name_joins_activity_words() {
        assert_eq!(
            evidence_file_name(2, "  juego de  mesa ", "AL", ".png"),
            "Sesión2_juego_de_mesa_AL.png"
        );
    }

    #[test]
    fn copies_source_with_lowercased_extension() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let source = dir.path().join("FOTO.JPG");
        std::fs::write(&source, b"jpeg bytes")?;
        let folder = dir.path().join("6_Evidencias_AL");
        std::fs::create_dir(&folder)?;
        std::fs::write(folder.join("Sesión1_Lectura_AL.jpg"), b"old")?;

        let dest = file_evidence(&folder, &source, "Memorama grupal", "AL")?;
        assert_eq!(dest, folder.join("Sesión2_Memorama_grupal_AL.jpg"));
        assert_eq!(std::fs::read(&dest)?, b"jpeg bytes");
        Ok(())
    }

    #[test]
    fn absence_creates_white_placeholder() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let dest = record_evidence(dir.path(), &student(), Outcome::Absent, None)?.unwrap();
        assert_eq!(dest, dir.path().join("Sesión1_BORRAR_AL.jpeg"));

        let img = image::open(&dest)?.to_rgb8();
        assert_eq!(img.dimensions(), (200, 200));
        assert!(img.get_pixel(100, 100).0.iter().all(|&c| c > 250));
        Ok(())
    }

    #[test]
    fn not_applicable_and_missing_photo_file_nothing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        assert_eq!(record_evidence(dir.path(), &student(), Outcome::NotApplicable, None)?, None);
        assert_eq!(record_evidence(dir.path(), &student(), Outcome::Homework, None)?, None);
        assert_eq!(next_session_number(dir.path())?, 1);
        Ok(())
    }

    #[test]
    fn missing_source_image_is_reported() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let err = file_evidence(dir.path(), &dir.path().join("nope.png"), "x", "AL").unwrap_err();
        assert!(matches!(err.downcast_ref::<CaseError>(), Some(CaseError::MissingSource(_))));
        Ok(())
    }
}
