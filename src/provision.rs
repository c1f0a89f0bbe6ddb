use std::path::{Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use crate::error::CaseError;
use crate::layout;
use crate::models::StudentRecord;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub student_folder: PathBuf,
    pub copied: usize,
    pub kept: usize,
}

/// `true` when the student has every field the folder names need.
pub fn is_provisionable(student: &StudentRecord) -> bool {
    [&student.full_name, &student.id, &student.program, &student.period]
        .iter()
        .all(|value| !value.trim().is_empty())
}

/// Creates the student's folder and inner folder under `root` and copies the
/// template tree into it. Existing folders are reused and existing files kept.
pub fn provision_student(
    root: &Path,
    templates: &Path,
    prefix: &str,
    student: &StudentRecord,
) -> anyhow::Result<ProvisionReport> {
    if prefix.trim().is_empty() {
        return Err(CaseError::EmptyPrefix.into());
    }
    if !templates.is_dir() {
        return Err(CaseError::MissingSource(format!(
            "template folder {}",
            templates.display()
        ))
        .into());
    }

    let student_folder = layout::student_folder(root, student);
    let inner = student_folder.join(layout::inner_folder_name(prefix, student));
    std::fs::create_dir_all(&inner)
        .with_context(|| format!("failed to create {}", inner.display()))?;

    let initials = layout::initials(&student.full_name);
    let suffix = format!("{}_{}_{}", initials, student.program, student.period);
    let mut report = ProvisionReport {
        student_folder,
        ..ProvisionReport::default()
    };

    for entry in sorted_entries(templates)? {
        let name = entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if entry.is_file() {
            let target = inner.join(with_suffix(&name, &suffix));
            copy_if_absent(&entry, &target, &mut report)?;
        } else if entry.is_dir() {
            let target_dir = inner.join(format!("{name}_{suffix}"));
            copy_template_folder(&entry, &target_dir, &initials, &mut report)?;
        }
    }

    tracing::info!(
        student = %student.id,
        folder = %report.student_folder.display(),
        copied = report.copied,
        kept = report.kept,
        "student folder provisioned"
    );
    Ok(report)
}

fn sorted_entries(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    Ok(entries)
}

/// `"ficha.docx"` + `"AL_BUNLA_2024-2"` -> `"ficha_AL_BUNLA_2024-2.docx"`.
fn with_suffix(file_name: &str, suffix: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

fn copy_template_folder(
    source: &Path,
    target: &Path,
    initials: &str,
    report: &mut ProvisionReport,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(target)
        .with_context(|| format!("failed to create {}", target.display()))?;

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?;
        let mut destination = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)
                .with_context(|| format!("failed to create {}", destination.display()))?;
            continue;
        }
        // Only pictures directly inside the folder carry the initials.
        if entry.depth() == 1 && is_jpeg(entry.path()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            destination = target.join(with_suffix(&name, initials));
        }
        copy_if_absent(entry.path(), &destination, report)?;
    }
    Ok(())
}

fn copy_if_absent(source: &Path, target: &Path, report: &mut ProvisionReport) -> anyhow::Result<()> {
    if target.exists() {
        tracing::debug!(path = %target.display(), "keeping existing file");
        report.kept += 1;
        return Ok(());
    }
    std::fs::copy(source, target).with_context(|| {
        format!("failed to copy {} to {}", source.display(), target.display())
    })?;
    report.copied += 1;
    Ok(())
}
