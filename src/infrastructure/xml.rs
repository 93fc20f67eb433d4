//! Minimal XML element tree.
//!
//! Cobertura reports and `.csproj` descriptors are read into an [`Element`]
//! tree, transformed, and written back. Comments, processing instructions and
//! doctype declarations are dropped; element order and attribute order are kept.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// XML read/write errors
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("XML document has no root element")]
    NoRoot,

    #[error("Unbalanced closing tag </{0}>")]
    Unbalanced(String),

    #[error("XML write error: {0}")]
    Write(String),
}

/// An element with its attributes, text and child elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value by name, ignoring ASCII case
    pub fn attr_ignore_case(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Attribute parsed into `T`, `None` when absent or unparsable
    pub fn attr_parsed<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.attr(name).and_then(|value| value.trim().parse().ok())
    }

    /// Set an attribute, replacing it in place or appending it
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut Element> {
        self.children.iter_mut().filter(move |c| c.name == name)
    }

    /// All descendants (depth-first, document order) with the given name
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// Trimmed text content, `None` when empty
    pub fn text_trimmed(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Parse a document into its root element
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let parse_err = |message: String| XmlError::Parse { position, message };

        match reader.read_event().map_err(|e| parse_err(e.to_string()))? {
            Event::Start(start) => {
                stack.push(element_from_start(&start).map_err(parse_err)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start).map_err(parse_err)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let element = stack.pop().ok_or_else(|| XmlError::Unbalanced(name.clone()))?;
                if element.name != name {
                    return Err(XmlError::Unbalanced(name));
                }
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| parse_err(e.to_string()))?;
                append_text(&mut stack, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                append_text(&mut stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Parse {
            position: reader.buffer_position(),
            message: format!("unclosed element <{}>", open.name),
        });
    }

    root.ok_or(XmlError::NoRoot)
}

/// Serialize an element as a document with an XML declaration
pub fn to_string(root: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    write_element(&mut writer, root)?;

    let mut output = String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))?;
    output.push('\n');
    Ok(output)
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, String> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| e.to_string())?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn append_text(stack: &mut [Element], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.get_or_insert_with(String::new).push_str(text);
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let text = element.text_trimmed();
    if element.children.is_empty() && text.is_none() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::Write(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    if let Some(text) = text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| XmlError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <!-- comment -->
  <PropertyGroup>
    <TargetFrameworks>net8.0;net6.0</TargetFrameworks>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="xunit" Version="2.6.1" />
    <PackageReference Include="coverlet.collector" Version="6.0.0">
      <PrivateAssets>all</PrivateAssets>
    </PackageReference>
  </ItemGroup>
</Project>"#;

    #[test]
    fn test_parse_attributes_text_and_children() {
        let root = parse(PROJECT).unwrap();
        assert_eq!(root.name, "Project");
        assert_eq!(root.attr("Sdk"), Some("Microsoft.NET.Sdk"));

        let frameworks = root.descendants("TargetFrameworks");
        assert_eq!(frameworks[0].text_trimmed(), Some("net8.0;net6.0"));

        let packages: Vec<_> = root
            .descendants("PackageReference")
            .into_iter()
            .filter_map(|p| p.attr("Include"))
            .collect();
        assert_eq!(packages, vec!["xunit", "coverlet.collector"]);
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let root = parse(PROJECT).unwrap();
        let written = to_string(&root).unwrap();
        assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert_eq!(parse(&written).unwrap(), root);
    }

    #[test]
    fn test_escaping() {
        let mut root = Element::new("coverage");
        root.set_attr("name", "a<b & \"c\"");
        let written = to_string(&root).unwrap();
        assert_eq!(parse(&written).unwrap().attr("name"), Some("a<b & \"c\""));
    }

    #[test]
    fn test_set_attr_replaces_in_place() {
        let mut root = Element::new("class");
        root.set_attr("line-rate", "1");
        root.set_attr("branch-rate", "0");
        root.set_attr("line-rate", "0.5");
        assert_eq!(
            root.attributes,
            vec![
                ("line-rate".to_string(), "0.5".to_string()),
                ("branch-rate".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse(""), Err(XmlError::NoRoot)));
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("not xml at all").is_err());
    }
}
