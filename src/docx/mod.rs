pub mod picture;
pub mod table;
pub mod xml;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{locked_or_io, CaseError};
use xml::{Element, Node};

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// A `.docx` package held in memory. `word/document.xml` is parsed; every
/// other part is carried through untouched.
pub struct Docx {
    path: PathBuf,
    parts: Vec<(String, Vec<u8>)>,
    document: Element,
}

impl Docx {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(CaseError::MissingSource(format!("Word document {}", path.display())).into());
        }
        let file = File::open(path).map_err(|err| locked_or_io(err, path))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("{} is not a valid .docx package", path.display()))?;

        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("failed to read part {}", entry.name()))?;
            parts.push((entry.name().to_string(), bytes));
        }

        let document_xml = parts
            .iter()
            .find(|(name, _)| name == DOCUMENT_PART)
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| anyhow!("{} has no {DOCUMENT_PART}", path.display()))?;
        let document = xml::parse(&document_xml)
            .with_context(|| format!("failed to parse {DOCUMENT_PART} in {}", path.display()))?;

        Ok(Docx {
            path: path.to_path_buf(),
            parts,
            document,
        })
    }

    pub fn document(&self) -> &Element {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Element {
        &mut self.document
    }

    pub fn body(&self) -> anyhow::Result<&Element> {
        self.document
            .child("w:body")
            .ok_or_else(|| anyhow!("{} has no document body", self.path.display()))
    }

    pub fn body_mut(&mut self) -> anyhow::Result<&mut Element> {
        let path = self.path.display().to_string();
        self.document
            .child_mut("w:body")
            .ok_or_else(|| anyhow!("{path} has no document body"))
    }

    /// The first table of the body, in document order.
    pub fn first_table_mut(&mut self) -> anyhow::Result<&mut Element> {
        let path = self.path.clone();
        self.body_mut()?
            .find_mut("w:tbl")
            .ok_or_else(|| CaseError::NoTable { path }.into())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(part, _)| part == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    /// Replaces a part's bytes, adding the part when it does not exist.
    pub fn put_part(&mut self, name: &str, bytes: Vec<u8>) {
        match self.parts.iter_mut().find(|(part, _)| part == name) {
            Some((_, existing)) => *existing = bytes,
            None => self.parts.push((name.to_string(), bytes)),
        }
    }

    pub fn xml_part(&self, name: &str) -> anyhow::Result<Option<Element>> {
        match self.part(name) {
            Some(bytes) => Ok(Some(
                xml::parse(&String::from_utf8_lossy(bytes))
                    .with_context(|| format!("failed to parse {name}"))?,
            )),
            None => Ok(None),
        }
    }

    pub fn put_xml_part(&mut self, name: &str, root: &Element) -> anyhow::Result<()> {
        let xml = xml::to_string(root)?;
        self.put_part(name, xml.into_bytes());
        Ok(())
    }

    /// Writes the package next to the original and renames it into place.
    pub fn save(&mut self) -> anyhow::Result<()> {
        let document_xml = xml::to_string(&self.document)?;
        self.put_part(DOCUMENT_PART, document_xml.into_bytes());

        let tmp_path = self.path.with_extension("docx.saving");
        let result = self.write_package(&tmp_path);
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
            return result;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|err| {
            let _ = std::fs::remove_file(&tmp_path);
            locked_or_io(err, &self.path)
        })?;
        tracing::debug!(path = %self.path.display(), "document saved");
        Ok(())
    }

    fn write_package(&self, out_path: &Path) -> anyhow::Result<()> {
        let out_file = File::create(out_path).map_err(|err| locked_or_io(err, &self.path))?;
        let mut zip = ZipWriter::new(out_file);
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), opts)
                .with_context(|| format!("failed to start part {name}"))?;
            zip.write_all(bytes)
                .with_context(|| format!("failed to write part {name}"))?;
        }
        zip.finish().context("failed to finalize document package")?;
        Ok(())
    }
}

/// Builds a `w:r` holding `text` in a single `w:t`.
pub fn text_run(text: &str) -> Element {
    Element::new("w:r").with_child(
        Element::new("w:t")
            .with_attr("xml:space", "preserve")
            .with_text(text),
    )
}

/// Text of a paragraph-bearing element, paragraphs separated by newlines.
pub fn paragraphs_text(container: &Element) -> String {
    let mut paragraphs = Vec::new();
    collect_paragraphs(container, &mut paragraphs);
    paragraphs.join("\n")
}

fn collect_paragraphs(el: &Element, out: &mut Vec<String>) {
    for child in el.child_elements() {
        if child.name == "w:p" {
            out.push(run_text(child));
        } else {
            collect_paragraphs(child, out);
        }
    }
}

fn run_text(paragraph: &Element) -> String {
    let mut out = String::new();
    push_run_text(paragraph, &mut out);
    out
}

fn push_run_text(el: &Element, out: &mut String) {
    for node in &el.children {
        if let Node::Element(child) = node {
            match child.name.as_str() {
                "w:t" => out.push_str(&child.inner_text()),
                "w:tab" => out.push('\t'),
                "w:br" | "w:cr" => out.push('\n'),
                // deleted revisions and field instructions are not visible text
                "w:delText" | "w:instrText" => {}
                _ => push_run_text(child, out),
            }
        }
    }
}
