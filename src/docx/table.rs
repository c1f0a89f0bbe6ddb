use super::xml::{Element, Node};
use super::{paragraphs_text, text_run};

pub fn row_count(table: &Element) -> usize {
    rows(table).count()
}

pub fn rows(table: &Element) -> impl Iterator<Item = &Element> {
    table.child_elements().filter(|el| el.name == "w:tr")
}

pub fn cells(row: &Element) -> impl Iterator<Item = &Element> {
    row.child_elements().filter(|el| el.name == "w:tc")
}

fn cell_prop<'a>(cell: &'a Element, name: &str) -> Option<&'a Element> {
    cell.child("w:tcPr").and_then(|props| props.child(name))
}

fn grid_span(cell: &Element) -> usize {
    cell_prop(cell, "w:gridSpan")
        .and_then(|span| span.attr("w:val"))
        .and_then(|val| val.trim().parse::<usize>().ok())
        .filter(|span| *span > 0)
        .unwrap_or(1)
}

fn grid_before(row: &Element) -> usize {
    row.child("w:trPr")
        .and_then(|props| props.child("w:gridBefore"))
        .and_then(|before| before.attr("w:val"))
        .and_then(|val| val.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// A `w:vMerge` without `w:val="restart"` continues the cell above.
fn continues_merge(cell: &Element) -> bool {
    cell_prop(cell, "w:vMerge")
        .map(|merge| merge.attr("w:val") != Some("restart"))
        .unwrap_or(false)
}

/// Position among the row's `w:tc` elements of the cell covering grid column
/// `col`, honoring `w:gridBefore` and `w:gridSpan`.
pub fn cell_index(row: &Element, col: usize) -> Option<usize> {
    let mut start = grid_before(row);
    if col < start {
        return None;
    }
    for (index, cell) in cells(row).enumerate() {
        let end = start + grid_span(cell);
        if col < end {
            return Some(index);
        }
        start = end;
    }
    None
}

/// Trimmed text at grid column `col` of row `row`. A vertically merged
/// continuation cell reads as the cell its merge started in. `None` when the
/// row does not reach that column.
pub fn cell_text(table: &Element, row: usize, col: usize) -> Option<String> {
    let all: Vec<&Element> = rows(table).collect();
    let mut current = row;
    loop {
        let tr = all.get(current)?;
        let cell = cells(tr).nth(cell_index(tr, col)?)?;
        if current == 0 || !continues_merge(cell) {
            return Some(paragraphs_text(cell).trim().to_string());
        }
        current -= 1;
    }
}

fn child_index(table: &Element, name: &str, nth: usize) -> Option<usize> {
    table
        .children
        .iter()
        .enumerate()
        .filter(|(_, node)| matches!(node, Node::Element(el) if el.name == name))
        .map(|(index, _)| index)
        .nth(nth)
}

pub fn row_mut(table: &mut Element, index: usize) -> Option<&mut Element> {
    table
        .child_elements_mut()
        .filter(|el| el.name == "w:tr")
        .nth(index)
}

/// A copy of `row` with the same cell structure and properties but no text.
pub fn blank_copy(row: &Element) -> Element {
    let mut copy = Element {
        name: row.name.clone(),
        attrs: row.attrs.clone(),
        children: Vec::new(),
    };
    for node in &row.children {
        let Node::Element(child) = node else { continue };
        if child.name == "w:tc" {
            let mut cell = Element::new("w:tc");
            cell.attrs = child.attrs.clone();
            if let Some(props) = child.child("w:tcPr") {
                let mut props = props.clone();
                props.remove_children("w:vMerge");
                cell.children.push(Node::Element(props));
            }
            cell.children.push(Node::Element(Element::new("w:p")));
            copy.children.push(Node::Element(cell));
        } else if child.name == "w:trPr" {
            copy.children.push(Node::Element(child.clone()));
        }
    }
    copy
}

/// Inserts a blank copy of row `index` directly before it and returns its index.
pub fn insert_blank_before(table: &mut Element, index: usize) -> Option<usize> {
    let position = child_index(table, "w:tr", index)?;
    let template = match &table.children[position] {
        Node::Element(row) => blank_copy(row),
        Node::Text(_) => return None,
    };
    table.children.insert(position, Node::Element(template));
    Some(index)
}

/// Appends a blank copy of the last row and returns its index.
pub fn append_blank(table: &mut Element) -> Option<usize> {
    let count = row_count(table);
    let last = rows(table).last().map(blank_copy)?;
    let position = table
        .children
        .iter()
        .rposition(|node| matches!(node, Node::Element(el) if el.name == "w:tr"))
        .map(|p| p + 1)
        .unwrap_or(table.children.len());
    table.children.insert(position, Node::Element(last));
    Some(count)
}

#[derive(Debug, Clone, Copy)]
pub struct CellStyle {
    pub font_half_points: u32,
}

impl CellStyle {
    pub fn from_points(points: u32) -> Self {
        CellStyle {
            font_half_points: points * 2,
        }
    }
}

/// Replaces the content of the cell at grid column `col` with one centered
/// paragraph holding `text`, and centers the cell vertically. Returns `false`
/// when the row has no such cell.
pub fn set_cell_text(row: &mut Element, col: usize, text: &str, style: CellStyle) -> bool {
    let Some(index) = cell_index(row, col) else {
        return false;
    };
    let Some(cell) = row.child_elements_mut().filter(|el| el.name == "w:tc").nth(index) else {
        return false;
    };

    let mut props = cell
        .child("w:tcPr")
        .cloned()
        .unwrap_or_else(|| Element::new("w:tcPr"));
    props.set_child_attr("w:vAlign", "w:val", "center");

    let size = style.font_half_points.to_string();
    let mut paragraph = Element::new("w:p").with_child(
        Element::new("w:pPr").with_child(Element::new("w:jc").with_attr("w:val", "center")),
    );
    if !text.is_empty() {
        let mut run = text_run(text);
        run.children.insert(
            0,
            Node::Element(
                Element::new("w:rPr")
                    .with_child(Element::new("w:sz").with_attr("w:val", &size))
                    .with_child(Element::new("w:szCs").with_attr("w:val", &size)),
            ),
        );
        paragraph.children.push(Node::Element(run));
    }

    cell.children = vec![Node::Element(props), Node::Element(paragraph)];
    true
}
