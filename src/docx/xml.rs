use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            name: name.to_string(),
            ..Element::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(text.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|el| el.name == name)
    }

    /// Sets `key` on the named child, appending the child when absent.
    pub fn set_child_attr(&mut self, name: &str, key: &str, value: &str) {
        match self.child_mut(name) {
            Some(child) => child.set_attr(key, value),
            None => self
                .children
                .push(Node::Element(Element::new(name).with_attr(key, value))),
        }
    }

    pub fn remove_children(&mut self, name: &str) {
        self.children
            .retain(|node| !matches!(node, Node::Element(el) if el.name == name));
    }

    /// First element named `name` in document order, including `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        if self.name == name {
            return Some(self);
        }
        self.child_elements_mut().find_map(|child| child.find_mut(name))
    }

    /// Calls `f` on every element of the subtree, parents before children.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Element)) {
        f(self);
        for child in self.child_elements_mut() {
            child.visit_mut(f);
        }
    }

    /// Concatenated character data of the subtree.
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Element(child) => collect_text(child, out),
            Node::Text(text) => out.push_str(text),
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> anyhow::Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .context("element name is not UTF-8")?
        .to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .context("attribute name is not UTF-8")?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], node: Node) -> anyhow::Result<()> {
    stack
        .last_mut()
        .map(|parent| parent.children.push(node))
        .ok_or_else(|| anyhow::anyhow!("unbalanced XML"))
}

/// Parses a complete XML document and returns its root element.
pub fn parse(xml: &str) -> anyhow::Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = vec![Element::new("#document")];

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let el = element_from(&start)?;
                attach(&mut stack, Node::Element(el))?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| anyhow::anyhow!("unbalanced XML"))?;
                attach(&mut stack, Node::Element(el))?;
            }
            Event::Text(text) => {
                let text = text.unescape()?.into_owned();
                // whitespace between the prolog and the root
                if stack.len() > 1 {
                    attach(&mut stack, Node::Text(text))?;
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                attach(&mut stack, Node::Text(text))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let document = stack.pop().ok_or_else(|| anyhow::anyhow!("unbalanced XML"))?;
    if !stack.is_empty() {
        anyhow::bail!("unclosed element in XML document");
    }
    document
        .children
        .into_iter()
        .find_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
        .ok_or_else(|| anyhow::anyhow!("XML document has no root element"))
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, el: &Element) -> anyhow::Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        match child {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

/// Serializes `root` with the standalone declaration Word writes.
pub fn to_string(root: &Element) -> anyhow::Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Text(BytesText::new("\r\n")))?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).context("serialized XML is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve">A &amp; B </w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;

    #[test]
    fn parses_names_attributes_and_unescaped_text() -> anyhow::Result<()> {
        let root = parse(SAMPLE)?;
        assert_eq!(root.name, "w:document");
        assert_eq!(root.attr("xmlns:w"), Some("urn:w"));
        let t = root.find("w:t").unwrap();
        assert_eq!(t.attr("xml:space"), Some("preserve"));
        assert_eq!(t.inner_text(), "A & B ");
        assert!(root.find("w:sectPr").is_some());
        Ok(())
    }

    #[test]
    fn serialized_tree_parses_back_to_the_same_tree() -> anyhow::Result<()> {
        let root = parse(SAMPLE)?;
        let xml = to_string(&root)?;
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(xml.contains("A &amp; B "));
        assert_eq!(parse(&xml)?, root);
        Ok(())
    }

    #[test]
    fn set_child_attr_creates_child_once() {
        let mut el = Element::new("w:pPr");
        el.set_child_attr("w:jc", "w:val", "center");
        el.set_child_attr("w:jc", "w:val", "left");
        assert_eq!(el.child_elements().count(), 1);
        assert_eq!(el.child("w:jc").and_then(|jc| jc.attr("w:val")), Some("left"));

        el.remove_children("w:jc");
        assert!(el.children.is_empty());
    }
}
