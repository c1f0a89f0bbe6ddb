use std::path::Path;

use anyhow::Context;

use super::xml::{Element, Node};
use super::{Docx, CONTENT_TYPES_PART, RELS_PART};

pub const EMU_PER_INCH: f64 = 914_400.0;
const TWIPS_PER_INCH: f64 = 1_440.0;
const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Page size and margins of a section, in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for PageGeometry {
    /// US Letter with one-inch margins.
    fn default() -> Self {
        PageGeometry {
            width: 8.5,
            height: 11.0,
            top: 1.0,
            right: 1.0,
            bottom: 1.0,
            left: 1.0,
        }
    }
}

impl PageGeometry {
    pub fn printable_width(&self) -> f64 {
        self.width - (self.left + self.right)
    }

    pub fn printable_height(&self) -> f64 {
        self.height - (self.top + self.bottom)
    }
}

fn twips(el: Option<&Element>, key: &str) -> Option<f64> {
    el.and_then(|el| el.attr(key))
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|value| value / TWIPS_PER_INCH)
}

/// Geometry of the first section of the document.
pub fn page_geometry(docx: &Docx) -> PageGeometry {
    let defaults = PageGeometry::default();
    let Some(sect) = docx.document().find("w:sectPr") else {
        return defaults;
    };
    let size = sect.child("w:pgSz");
    let margins = sect.child("w:pgMar");
    PageGeometry {
        width: twips(size, "w:w").unwrap_or(defaults.width),
        height: twips(size, "w:h").unwrap_or(defaults.height),
        top: twips(margins, "w:top").map(f64::abs).unwrap_or(defaults.top),
        right: twips(margins, "w:right").unwrap_or(defaults.right),
        bottom: twips(margins, "w:bottom").map(f64::abs).unwrap_or(defaults.bottom),
        left: twips(margins, "w:left").unwrap_or(defaults.left),
    }
}

/// Extension, content type pairs Word accepts for inline pictures.
fn content_type(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

fn next_relationship_id(rels: &Element) -> String {
    let max = rels
        .child_elements()
        .filter_map(|rel| rel.attr("Id"))
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

fn next_media_name(docx: &Docx, ext: &str) -> String {
    let mut n = docx
        .part_names()
        .filter(|name| name.starts_with("word/media/"))
        .count()
        + 1;
    loop {
        let name = format!("word/media/image{n}.{ext}");
        if docx.part(&name).is_none() {
            return name;
        }
        n += 1;
    }
}

fn ensure_default_content_type(docx: &mut Docx, ext: &str, mime: &str) -> anyhow::Result<()> {
    let mut types = docx
        .xml_part(CONTENT_TYPES_PART)?
        .ok_or_else(|| anyhow::anyhow!("package has no {CONTENT_TYPES_PART}"))?;
    let known = types.child_elements().any(|el| {
        el.name == "Default"
            && el
                .attr("Extension")
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
    });
    if !known {
        let default = Element::new("Default")
            .with_attr("Extension", ext)
            .with_attr("ContentType", mime);
        types.children.insert(0, Node::Element(default));
        docx.put_xml_part(CONTENT_TYPES_PART, &types)?;
    }
    Ok(())
}

/// Adds the image file as a media part and returns its relationship id.
pub fn add_image_part(docx: &mut Docx, image: &Path) -> anyhow::Result<String> {
    let ext = image
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mime = content_type(&ext)
        .ok_or_else(|| anyhow::anyhow!("unsupported picture format: {}", image.display()))?;
    let bytes = std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;

    let media = next_media_name(docx, &ext);
    docx.put_part(&media, bytes);
    ensure_default_content_type(docx, &ext, mime)?;

    let mut rels = docx
        .xml_part(RELS_PART)?
        .unwrap_or_else(|| Element::new("Relationships").with_attr("xmlns", RELS_NS));
    let id = next_relationship_id(&rels);
    let target = media.trim_start_matches("word/");
    rels.children.push(Node::Element(
        Element::new("Relationship")
            .with_attr("Id", &id)
            .with_attr("Type", IMAGE_REL_TYPE)
            .with_attr("Target", target),
    ));
    docx.put_xml_part(RELS_PART, &rels)?;
    Ok(id)
}

fn next_drawing_id(docx: &Docx) -> u32 {
    let mut max = 0u32;
    collect_doc_pr_ids(docx.document(), &mut max);
    max + 1
}

fn collect_doc_pr_ids(el: &Element, max: &mut u32) {
    if el.name == "wp:docPr" {
        if let Some(id) = el.attr("id").and_then(|id| id.parse::<u32>().ok()) {
            *max = (*max).max(id);
        }
    }
    for child in el.child_elements() {
        collect_doc_pr_ids(child, max);
    }
}

/// `w:drawing` markup for an inline picture of the given size in inches.
pub fn inline_drawing(rel_id: &str, drawing_id: u32, name: &str, width: f64, height: f64) -> Element {
    let cx = ((width * EMU_PER_INCH).round() as i64).to_string();
    let cy = ((height * EMU_PER_INCH).round() as i64).to_string();
    let id = drawing_id.to_string();

    let pic = Element::new("pic:pic")
        .with_attr("xmlns:pic", "http://schemas.openxmlformats.org/drawingml/2006/picture")
        .with_child(
            Element::new("pic:nvPicPr")
                .with_child(Element::new("pic:cNvPr").with_attr("id", "0").with_attr("name", name))
                .with_child(Element::new("pic:cNvPicPr")),
        )
        .with_child(
            Element::new("pic:blipFill")
                .with_child(
                    Element::new("a:blip")
                        .with_attr(
                            "xmlns:r",
                            "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
                        )
                        .with_attr("r:embed", rel_id),
                )
                .with_child(Element::new("a:stretch").with_child(Element::new("a:fillRect"))),
        )
        .with_child(
            Element::new("pic:spPr")
                .with_child(
                    Element::new("a:xfrm")
                        .with_child(Element::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                        .with_child(Element::new("a:ext").with_attr("cx", &cx).with_attr("cy", &cy)),
                )
                .with_child(
                    Element::new("a:prstGeom")
                        .with_attr("prst", "rect")
                        .with_child(Element::new("a:avLst")),
                ),
        );

    let inline = Element::new("wp:inline")
        .with_attr(
            "xmlns:wp",
            "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
        )
        .with_child(Element::new("wp:extent").with_attr("cx", &cx).with_attr("cy", &cy))
        .with_child(
            Element::new("wp:docPr")
                .with_attr("id", &id)
                .with_attr("name", &format!("Picture {id}")),
        )
        .with_child(
            Element::new("wp:cNvGraphicFramePr").with_child(
                Element::new("a:graphicFrameLocks")
                    .with_attr("xmlns:a", "http://schemas.openxmlformats.org/drawingml/2006/main")
                    .with_attr("noChangeAspect", "1"),
            ),
        )
        .with_child(
            Element::new("a:graphic")
                .with_attr("xmlns:a", "http://schemas.openxmlformats.org/drawingml/2006/main")
                .with_child(
                    Element::new("a:graphicData")
                        .with_attr("uri", "http://schemas.openxmlformats.org/drawingml/2006/picture")
                        .with_child(pic),
                ),
        );

    Element::new("w:drawing").with_child(inline)
}

/// Appends a paragraph holding `image` at `width` x `height` inches to the end
/// of the body.
pub fn append_picture(docx: &mut Docx, image: &Path, width: f64, height: f64) -> anyhow::Result<()> {
    let rel_id = add_image_part(docx, image)?;
    let drawing_id = next_drawing_id(docx);
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let paragraph = Element::new("w:p").with_child(
        Element::new("w:r").with_child(inline_drawing(&rel_id, drawing_id, &name, width, height)),
    );
    push_body_paragraph(docx, paragraph)
}

/// Inserts `paragraph` as the last block of the body, before the final `w:sectPr`.
pub fn push_body_paragraph(docx: &mut Docx, paragraph: Element) -> anyhow::Result<()> {
    let body = docx.body_mut()?;
    let position = match body.children.last() {
        Some(Node::Element(el)) if el.name == "w:sectPr" => body.children.len() - 1,
        _ => body
            .children
            .iter()
            .rposition(|node| matches!(node, Node::Element(el) if el.name == "w:sectPr"))
            .unwrap_or(body.children.len()),
    };
    body.children.insert(position, Node::Element(paragraph));
    Ok(())
}

/// Adds a run with a page break to the last paragraph of the body, creating
/// one when the body has none.
pub fn add_page_break(docx: &mut Docx) -> anyhow::Result<()> {
    let page_break = Element::new("w:r").with_child(Element::new("w:br").with_attr("w:type", "page"));
    let body = docx.body_mut()?;
    if let Some(paragraph) = body.child_elements_mut().filter(|el| el.name == "w:p").last() {
        paragraph.children.push(Node::Element(page_break));
        return Ok(());
    }
    push_body_paragraph(docx, Element::new("w:p").with_child(page_break))
}

/// Horizontal and vertical DPI recorded in a PNG `pHYs` chunk or a JPEG JFIF
/// header, if any.
pub fn embedded_dpi(bytes: &[u8]) -> Option<(f64, f64)> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return png_dpi(bytes);
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return jfif_dpi(bytes);
    }
    None
}

fn be_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(..4)?.try_into().ok()?))
}

fn png_dpi(bytes: &[u8]) -> Option<(f64, f64)> {
    let mut offset = 8;
    while offset + 8 <= bytes.len() {
        let length = be_u32(&bytes[offset..])? as usize;
        let kind = bytes.get(offset + 4..offset + 8)?;
        let data = bytes.get(offset + 8..offset + 8 + length)?;
        match kind {
            b"pHYs" if length >= 9 => {
                let x = be_u32(data)? as f64;
                let y = be_u32(&data[4..])? as f64;
                // unit 1 = pixels per metre
                if data[8] == 1 && x > 0.0 && y > 0.0 {
                    return Some((x * 0.0254, y * 0.0254));
                }
                return None;
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }
        offset += 12 + length;
    }
    None
}

fn jfif_dpi(bytes: &[u8]) -> Option<(f64, f64)> {
    // APP0 segment right after SOI: FFE0 len "JFIF\0" ver(2) units x y
    let segment = bytes.get(2..18)?;
    if segment[0..2] != [0xFF, 0xE0] || &segment[4..9] != b"JFIF\0" {
        return None;
    }
    let units = segment[11];
    let x = u16::from_be_bytes([segment[12], segment[13]]) as f64;
    let y = u16::from_be_bytes([segment[14], segment[15]]) as f64;
    if x <= 0.0 || y <= 0.0 {
        return None;
    }
    match units {
        1 => Some((x, y)),
        2 => Some((x * 2.54, y * 2.54)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use tempfile::TempDir;

    fn png_with_phys(ppm: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&[0u8; 13]);
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&9u32.to_be_bytes());
        bytes.extend_from_slice(b"pHYs");
        bytes.extend_from_slice(&ppm.to_be_bytes());
        bytes.extend_from_slice(&ppm.to_be_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&[0u8; 4]);
        bytes
    }

    #[test]
    fn reads_dpi_from_png_and_jfif_headers() {
        let (x, y) = embedded_dpi(&png_with_phys(11811)).unwrap();
        assert!((x - 300.0).abs() < 0.1 && (y - 300.0).abs() < 0.1);

        let jfif = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0, 1, 1, 1, 0, 72, 0, 72,
        ];
        assert_eq!(embedded_dpi(&jfif), Some((72.0, 72.0)));
        assert_eq!(embedded_dpi(b"GIF89a"), None);
    }

    #[test]
    fn geometry_comes_from_section_properties() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("entrevista.docx");
        write_docx(&path, &paragraph("Entrevista"))?;
        let docx = Docx::open(&path)?;
        let page = page_geometry(&docx);
        assert_eq!(page, PageGeometry::default());
        assert!((page.printable_width() - 6.5).abs() < 1e-9);
        assert!((page.printable_height() - 9.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn appended_picture_registers_media_relationship_and_type() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("entrevista.docx");
        write_docx(&path, &paragraph("Entrevista"))?;
        let image = dir.path().join("foto.png");
        std::fs::write(&image, png_with_phys(3780))?;

        let mut docx = Docx::open(&path)?;
        append_picture(&mut docx, &image, 2.0, 1.0)?;
        add_page_break(&mut docx)?;
        append_picture(&mut docx, &image, 2.0, 1.0)?;
        docx.save()?;

        let docx = Docx::open(&path)?;
        assert!(docx.part("word/media/image1.png").is_some());
        assert!(docx.part("word/media/image2.png").is_some());
        let rels = String::from_utf8(docx.part(RELS_PART).unwrap().to_vec())?;
        assert!(rels.contains(r#"Id="rId2""#) && rels.contains(r#"Id="rId3""#));
        let types = String::from_utf8(docx.part(CONTENT_TYPES_PART).unwrap().to_vec())?;
        assert_eq!(types.matches(r#"Extension="png""#).count(), 1);

        let body = docx.body()?;
        let last_block = body.child_elements().last().unwrap();
        assert_eq!(last_block.name, "w:sectPr");
        let extent = body.find("wp:extent").unwrap();
        assert_eq!(extent.attr("cx"), Some("1828800"));
        assert_eq!(extent.attr("cy"), Some("914400"));
        assert!(body.find("w:br").is_some());
        Ok(())
    }
}
