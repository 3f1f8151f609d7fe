//! Markup parser – turns the invoice template markup into a small DOM tree.
//!
//! Only the element subset emitted by the invoice template is understood:
//! - Blocks: div, p, h1-h3, table, thead, tbody, tr, th, td
//! - Inline: span, b, strong, br
//! - Replaced: img
//!
//! Elements carry their `id`, `class` and `style` attributes; the `id` is the
//! stable lookup key the capture step uses to locate its source element.

use std::collections::HashMap;

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    Span,
    B,
    Br,
    Img,
    Table,
    Thead,
    Tbody,
    Tr,
    Th,
    Td,
    Body,
    Html,
    Head,
    /// Anything else; kept in the tree but never rendered.
    Unknown(String),
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "span" => Tag::Span,
            "b" | "strong" => Tag::B,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tr" => Tag::Tr,
            "th" => Tag::Th,
            "td" => Tag::Td,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Elements that flow inside a line of text.
    pub fn is_inline(&self) -> bool {
        matches!(self, Tag::Span | Tag::B | Tag::Br)
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Img | Tag::Br)
    }
}

/// A node in the DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element with its attributes and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace())
            .into_iter()
            .flatten()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(String::as_str)
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(String::as_str)
    }

    /// `src` of every `<img>` in this subtree, this element included.
    pub fn image_sources(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_image_sources(&mut out);
        out
    }

    fn collect_image_sources<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.tag == Tag::Img {
            out.extend(self.src());
        }
        for child in &self.children {
            if let DomNode::Element(e) = child {
                e.collect_image_sources(out);
            }
        }
    }
}

/// Parse a markup string into a list of top-level DOM nodes.
///
/// A closing tag with no open element is skipped.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser { input: html, pos: 0 };
    let mut nodes = Vec::new();
    while !parser.eof() {
        nodes.extend(parser.parse_nodes());
        if parser.rest().starts_with("</") {
            let start = parser.pos;
            parser.skip_past(">");
            log::warn!("ignoring unmatched `{}`", &html[start..parser.pos]);
        }
    }
    nodes
}

/// Depth-first search for the element whose `id` equals `key`.
pub fn find_by_id<'a>(nodes: &'a [DomNode], key: &str) -> Option<&'a ElementNode> {
    nodes.iter().find_map(|node| match node {
        DomNode::Element(e) if e.id() == Some(key) => Some(e),
        DomNode::Element(e) => find_by_id(&e.children, key),
        DomNode::Text(_) => None,
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() && !self.rest().starts_with("</") {
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        let rest = self.rest();
        if rest.starts_with("<!--") {
            self.skip_past("-->");
            None
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            self.skip_past(">");
            None
        } else if rest.starts_with('<') {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let end = self.rest().find('<').unwrap_or(self.rest().len());
        let text = &self.input[self.pos..self.pos + end];
        self.pos += end;
        DomNode::Text(decode_entities(text))
    }

    fn parse_element(&mut self) -> DomNode {
        self.pos += 1; // '<'
        let name = self.take_name();
        let mut elem = ElementNode::new(Tag::from_name(&name));

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() || rest.starts_with('>') || rest.starts_with("/>") {
                break;
            }
            let key = self.take_name();
            if key.is_empty() {
                // Stray character inside the tag; drop it.
                self.bump();
                continue;
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.take_attr_value()
            } else {
                String::new()
            };
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.rest().starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.rest().starts_with('>') {
            self.pos += 1;
        }
        if elem.tag.is_void() {
            return DomNode::Element(elem);
        }

        elem.children = self.parse_nodes();

        if self.rest().starts_with("</") {
            self.skip_past(">");
        }
        DomNode::Element(elem)
    }

    fn take_name(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == ':'))
            .unwrap_or(self.rest().len());
        let name = self.input[self.pos..self.pos + len].to_string();
        self.pos += len;
        name
    }

    fn take_attr_value(&mut self) -> String {
        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                let len = self
                    .rest()
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(self.rest().len());
                let raw = &self.input[self.pos..self.pos + len];
                self.pos += len;
                return decode_entities(raw.trim_end_matches('/'));
            }
        };
        self.pos += 1;
        let len = self.rest().find(quote).unwrap_or(self.rest().len());
        let raw = &self.input[self.pos..self.pos + len];
        self.pos = (self.pos + len + 1).min(self.input.len());
        decode_entities(raw)
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn skip_past(&mut self, marker: &str) {
        match self.rest().find(marker) {
            Some(i) => self.pos += i + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn bump(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

/// Decode the named entities the template escaper emits plus numeric
/// character references.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{00A0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_with_id() {
        let html = r#"<div id="invoice" class="invoice-container"><p>Hi</p></div>"#;
        let nodes = parse_html(html);
        assert_eq!(nodes.len(), 1);
        let DomNode::Element(e) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(e.tag, Tag::Div);
        assert_eq!(e.id(), Some("invoice"));
        assert_eq!(e.classes().collect::<Vec<_>>(), vec!["invoice-container"]);
        assert_eq!(e.children.len(), 1);
    }

    #[test]
    fn void_elements_take_no_children() {
        let nodes = parse_html(r#"<div>For Acme<br>Signatory<img src="a.png"></div>"#);
        let DomNode::Element(div) = &nodes[0] else {
            panic!("expected div");
        };
        assert_eq!(div.children.len(), 4);
        assert!(matches!(&div.children[1], DomNode::Element(e) if e.tag == Tag::Br));
        assert!(matches!(&div.children[3], DomNode::Element(e) if e.src() == Some("a.png")));
    }

    #[test]
    fn find_by_id_searches_depth_first() {
        let html = r#"<body><div><span id="x">a</span></div><div id="invoice"></div></body>"#;
        let nodes = parse_html(html);
        assert_eq!(find_by_id(&nodes, "invoice").map(|e| &e.tag), Some(&Tag::Div));
        assert_eq!(find_by_id(&nodes, "x").map(|e| &e.tag), Some(&Tag::Span));
        assert!(find_by_id(&nodes, "missing").is_none());
    }

    #[test]
    fn table_sections_parse() {
        let html = "<table><thead><tr><th>A</th></tr></thead><tbody><tr><td>1</td></tr></tbody></table>";
        let nodes = parse_html(html);
        let DomNode::Element(table) = &nodes[0] else {
            panic!("expected table");
        };
        assert_eq!(table.tag, Tag::Table);
        assert_eq!(table.children.len(), 2);
    }

    #[test]
    fn stray_close_tag_keeps_later_siblings() {
        let nodes = parse_html("<p>a</p></span><p>b</p><div id=\"last\"></div>");
        let tags: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                DomNode::Element(e) => Some(e.tag.clone()),
                DomNode::Text(_) => None,
            })
            .collect();
        assert_eq!(tags, vec![Tag::P, Tag::P, Tag::Div]);
        assert!(find_by_id(&nodes, "last").is_some());
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("A &amp; B &lt;c&gt;"), "A & B <c>");
        assert_eq!(decode_entities("&#8377;10 &#x20B9;"), "\u{20B9}10 \u{20B9}");
        assert_eq!(decode_entities("5 & 6 &bogus;"), "5 & 6 &bogus;");
    }
}
