use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;

use crate::config::Config;
use crate::docx::picture::{self, PageGeometry};
use crate::docx::Docx;
use crate::error::CaseError;
use crate::layout;
use crate::models::StudentRecord;

pub const DEFAULT_DPI: f64 = 96.0;
/// Room kept above the first photo for the text already on the page, in inches.
const FIRST_IMAGE_RESERVE: f64 = 2.0;

/// Height available to the first photo: the printable height less the
/// reserve, but never under half of it.
pub fn first_image_height(page: &PageGeometry) -> f64 {
    let printable = page.printable_height();
    (printable - FIRST_IMAGE_RESERVE).max(printable * 0.5)
}

/// Display size in inches of a `pixels` image at `dpi`, shrunk to fit the
/// box while keeping its aspect ratio.
pub fn fit_size(pixels: (u32, u32), dpi: (f64, f64), max_width: f64, max_height: f64) -> (f64, f64) {
    let width = pixels.0 as f64 / dpi.0;
    let height = pixels.1 as f64 / dpi.1;
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let factor = (max_width / width).min(max_height / height).min(1.0);
    (width * factor, height * factor)
}

/// Sorts images oldest first by modification time.
pub fn order_by_mtime(images: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut stamped: Vec<(SystemTime, PathBuf)> = Vec::with_capacity(images.len());
    for image in images {
        if !image.is_file() {
            return Err(CaseError::MissingSource(format!("image {}", image.display())).into());
        }
        let modified = std::fs::metadata(image)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("failed to read modification time of {}", image.display()))?;
        stamped.push((modified, image.clone()));
    }
    stamped.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(stamped.into_iter().map(|(_, path)| path).collect())
}

fn image_size(path: &Path, page: &PageGeometry, max_height: f64) -> anyhow::Result<(f64, f64)> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let pixels = image::load_from_memory(&bytes)
        .map(|img| (img.width(), img.height()))
        .with_context(|| format!("{} is not a readable image", path.display()))?;
    let dpi = picture::embedded_dpi(&bytes).unwrap_or((DEFAULT_DPI, DEFAULT_DPI));
    Ok(fit_size(pixels, dpi, page.printable_width(), max_height))
}

/// Appends every image to the end of `document`, one per page, and saves once.
pub fn append_images(document: &Path, images: &[PathBuf]) -> anyhow::Result<usize> {
    let ordered = order_by_mtime(images)?;
    let mut docx = Docx::open(document)?;
    let page = picture::page_geometry(&docx);

    for (index, image) in ordered.iter().enumerate() {
        let max_height = if index == 0 {
            first_image_height(&page)
        } else {
            picture::add_page_break(&mut docx)?;
            page.printable_height()
        };
        let (width, height) = image_size(image, &page, max_height)?;
        picture::append_picture(&mut docx, image, width, height)?;
        tracing::debug!(image = %image.display(), width, height, "picture appended");
    }

    if !ordered.is_empty() {
        docx.save()?;
    }
    Ok(ordered.len())
}

pub fn interview_student(
    root: &Path,
    student: &StudentRecord,
    images: &[PathBuf],
    config: &Config,
) -> anyhow::Result<(PathBuf, usize)> {
    let folder = layout::working_folder(root, student)?;
    let document = layout::find_document(
        &folder,
        &config.prefixes.interview,
        &student.full_name,
        "interview document",
    )?;
    let count = append_images(&document, images)?;
    tracing::info!(student = %student.id, images = count, "interview updated");
    Ok((document, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::testing::{paragraph, write_docx};
    use crate::docx::xml::Element;
    use image::RgbImage;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn extents<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
        for child in el.child_elements() {
            if child.name == "wp:extent" {
                out.push(child);
            }
            extents(child, out);
        }
    }

    fn set_mtime(path: &Path, secs: u64) -> anyhow::Result<()> {
        let file = File::options().write(true).open(path)?;
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))?;
        Ok(())
    }

    #[test]
    fn first_image_reserves_room_for_text() {
        let letter = PageGeometry::default();
        assert!((first_image_height(&letter) - 7.0).abs() < 1e-9);

        let short = PageGeometry {
            height: 5.0,
            ..PageGeometry::default()
        };
        // 3in printable: 1in after the reserve, floored at 1.5in
        assert!((first_image_height(&short) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn fit_keeps_aspect_ratio_and_never_enlarges() {
        let (w, h) = fit_size((1920, 960), (96.0, 96.0), 6.5, 9.0);
        assert!((w - 6.5).abs() < 1e-9 && (h - 3.25).abs() < 1e-9);

        let (w, h) = fit_size((960, 1920), (96.0, 96.0), 6.5, 7.0);
        assert!((w - 3.5).abs() < 1e-9 && (h - 7.0).abs() < 1e-9);

        assert_eq!(fit_size((192, 96), (96.0, 96.0), 6.5, 9.0), (2.0, 1.0));
        assert_eq!(fit_size((300, 300), (300.0, 300.0), 6.5, 9.0), (1.0, 1.0));
    }

    #[test]
    fn appends_oldest_first_with_page_breaks() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let document = dir.path().join("3_Entrevista extendida_AL.docx");
        write_docx(&document, &paragraph("Entrevista inicial"))?;

        let large = dir.path().join("grande.png");
        let small = dir.path().join("chica.png");
        RgbImage::new(1920, 960).save(&large)?;
        RgbImage::new(192, 96).save(&small)?;
        set_mtime(&large, 2_000_000)?;
        set_mtime(&small, 1_000_000)?;

        assert_eq!(append_images(&document, &[large, small])?, 2);

        let docx = Docx::open(&document)?;
        let body = docx.body()?;
        let mut found = Vec::new();
        extents(body, &mut found);
        let widths: Vec<&str> = found.iter().filter_map(|e| e.attr("cx")).collect();
        // chica.png first at 2in, then grande.png fitted to 6.5in
        assert_eq!(widths, vec!["1828800", "5943600"]);

        let breaks = body
            .child_elements()
            .filter(|p| p.name == "w:p")
            .filter(|p| p.find("w:br").and_then(|br| br.attr("w:type")) == Some("page"))
            .count();
        assert_eq!(breaks, 1);
        Ok(())
    }

    #[test]
    fn missing_image_aborts_before_editing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let document = dir.path().join("entrevista.docx");
        write_docx(&document, &paragraph("Entrevista"))?;
        let before = std::fs::read(&document)?;

        let err = append_images(&document, &[dir.path().join("no.png")]).unwrap_err();
        assert!(matches!(err.downcast_ref::<CaseError>(), Some(CaseError::MissingSource(_))));
        assert_eq!(std::fs::read(&document)?, before);
        Ok(())
    }
}
