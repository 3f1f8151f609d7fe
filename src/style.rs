//! Style resolver – maps tag defaults, stylesheet class rules and inline
//! `style` attributes to a flat [`ComputedStyle`] consumed by the layout
//! engine.
//!
//! Class rules are written as plain CSS declaration lists and go through the
//! same declaration parser as inline styles, so the invoice stylesheet and
//! ad-hoc `style="..."` attributes support exactly the same properties.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};

/// Fully resolved style for a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    // Box generation
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub flex_grow: f32,
    pub gap: f32,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,

    // Spacing (CSS px)
    pub margin: Edges,
    pub padding: Edges,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography (inherited)
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,

    pub background_color: Color,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Column,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            flex_grow: 0.0,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin: Edges::default(),
            padding: Edges::default(),
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 14.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            background_color: Color::TRANSPARENT,
        }
    }
}

impl ComputedStyle {
    /// Copy the inherited (typographic) properties from a parent style.
    fn inherit_from(&mut self, parent: &ComputedStyle) {
        self.font_size = parent.font_size;
        self.font_weight = parent.font_weight;
        self.font_style = parent.font_style;
        self.color = parent.color;
        self.text_align = parent.text_align;
        self.line_height = parent.line_height;
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    InlineBlock,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

/// Per-side lengths in CSS px.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn uniform(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// CSS shorthand: 1, 2, 3 or 4 values.
    fn from_shorthand(val: &str) -> Option<Self> {
        let parts: Vec<f32> = val.split_whitespace().filter_map(parse_px).collect();
        let e = match parts[..] {
            [a] => Self::uniform(a),
            [v, h] => Self {
                top: v,
                right: h,
                bottom: v,
                left: h,
            },
            [t, h, b] => Self {
                top: t,
                right: h,
                bottom: b,
                left: h,
            },
            [t, r, b, l] => Self {
                top: t,
                right: r,
                bottom: b,
                left: l,
            },
            _ => return None,
        };
        Some(e)
    }
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Parse `#rgb`, `#rrggbb` or one of the few keywords the template uses.
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim() {
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            "transparent" => Some(Self::TRANSPARENT),
            other => Self::from_hex(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Stylesheet
// ---------------------------------------------------------------------------

/// Class → declaration-list rules, applied in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<(String, String)>,
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for `.class { declarations }`.
    pub fn rule(mut self, class: &str, declarations: &str) -> Self {
        self.rules.push((class.to_string(), declarations.to_string()));
        self
    }

    /// The stylesheet matching the invoice template's class names.
    pub fn invoice() -> Self {
        Self::new()
            .rule(
                "invoice-container",
                "padding: 24px; background-color: #ffffff; border-width: 1px; \
                 border-color: #d0d0d0; font-size: 12px; color: #222222",
            )
            .rule(
                "header",
                "display: flex; flex-direction: row; justify-content: space-between; \
                 align-items: center; margin-bottom: 20px",
            )
            .rule("logo", "width: 120px; height: 40px")
            .rule("invoice-title", "text-align: right")
            .rule(
                "details",
                "display: flex; flex-direction: row; justify-content: space-between; \
                 margin-bottom: 16px; gap: 24px",
            )
            .rule("sold-by", "flex-grow: 1")
            .rule("address-section", "flex-grow: 1; text-align: right")
            .rule("billing-address", "margin-bottom: 12px")
            .rule("shipping-address", "margin-bottom: 0px")
            .rule(
                "invoice-meta",
                "margin-bottom: 16px; padding: 8px; background-color: #f5f5f5",
            )
            .rule("line-items", "margin-bottom: 16px")
            .rule(
                "totals",
                "text-align: right; font-weight: bold; font-size: 14px; margin-bottom: 16px",
            )
            .rule(
                "footer",
                "display: flex; flex-direction: row; justify-content: space-between; \
                 margin-bottom: 8px; gap: 24px",
            )
            .rule("signature", "text-align: right; font-weight: bold")
    }

    fn apply(&self, style: &mut ComputedStyle, class: &str) {
        for (name, decls) in &self.rules {
            if name == class {
                apply_declarations(style, decls);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style of one element: tag defaults, inherited typography,
/// class rules, then the inline `style` attribute.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    if let Some(p) = parent {
        style.inherit_from(p);
    }
    apply_tag_defaults(&mut style, &element.tag);

    for class in element.classes() {
        sheet.apply(&mut style, class);
    }
    if let Some(inline) = element.inline_style() {
        apply_declarations(&mut style, inline);
    }
    style
}

fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    match tag {
        Tag::H1 | Tag::H2 | Tag::H3 => {
            s.font_size = match tag {
                Tag::H1 => 24.0,
                Tag::H2 => 18.0,
                _ => 15.0,
            };
            s.font_weight = FontWeight::Bold;
            s.margin.bottom = 6.0;
        }
        Tag::P => s.margin.bottom = 4.0,
        Tag::Span | Tag::Br => s.display = Display::Inline,
        Tag::B => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Img => s.display = Display::InlineBlock,
        Tag::Table => {
            s.width = Dimension::Percent(100.0);
            s.border_width = 1.0;
            s.border_color = Color::rgb(0.6, 0.6, 0.6);
        }
        Tag::Tr => {
            s.display = Display::Flex;
            s.flex_direction = FlexDirection::Row;
        }
        Tag::Th | Tag::Td => {
            s.padding = Edges::uniform(4.0);
            s.border_width = 0.5;
            s.border_color = Color::rgb(0.6, 0.6, 0.6);
            s.font_size = s.font_size.min(10.0);
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::rgb(0.91, 0.91, 0.91);
            }
        }
        Tag::Head | Tag::Unknown(_) => s.display = Display::None,
        Tag::Div | Tag::Thead | Tag::Tbody | Tag::Body | Tag::Html => {}
    }
}

/// Apply a `prop: value; prop: value` declaration list.
pub fn apply_declarations(s: &mut ComputedStyle, declarations: &str) {
    for decl in declarations.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        apply_property(s, prop.trim(), val.trim());
    }
}

fn apply_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "justify-content" => {
            s.justify_content = match val {
                "flex-start" | "start" => JustifyContent::Start,
                "flex-end" | "end" => JustifyContent::End,
                "center" => JustifyContent::Center,
                "space-between" => JustifyContent::SpaceBetween,
                "space-around" => JustifyContent::SpaceAround,
                _ => s.justify_content,
            }
        }
        "align-items" => {
            s.align_items = match val {
                "flex-start" | "start" => AlignItems::Start,
                "flex-end" | "end" => AlignItems::End,
                "center" => AlignItems::Center,
                "stretch" => AlignItems::Stretch,
                _ => s.align_items,
            }
        }
        "flex-grow" => {
            if let Ok(v) = val.parse() {
                s.flex_grow = v;
            }
        }
        "gap" => {
            if let Some(px) = parse_px(val) {
                s.gap = px;
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "margin" => {
            if let Some(e) = Edges::from_shorthand(val) {
                s.margin = e;
            }
        }
        "padding" => {
            if let Some(e) = Edges::from_shorthand(val) {
                s.padding = e;
            }
        }
        "margin-top" | "margin-right" | "margin-bottom" | "margin-left" | "padding-top"
        | "padding-right" | "padding-bottom" | "padding-left" => {
            let Some(px) = parse_px(val) else {
                return;
            };
            let (edges, side) = match prop.split_once('-') {
                Some(("margin", side)) => (&mut s.margin, side),
                Some((_, side)) => (&mut s.padding, side),
                None => return,
            };
            match side {
                "top" => edges.top = px,
                "right" => edges.right = px,
                "bottom" => edges.bottom = px,
                _ => edges.left = px,
            }
        }
        "border-width" => {
            if let Some(px) = parse_px(val) {
                s.border_width = px;
            }
        }
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "font-size" => {
            if let Some(px) = parse_px(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_px(val) {
                s.line_height = px / s.font_size;
            }
        }
        "text-decoration" => {
            s.text_decoration = if val.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        _ => log::debug!("ignoring unsupported property `{prop}`"),
    }
}

fn parse_px(s: &str) -> Option<f32> {
    s.trim().trim_end_matches("px").parse().ok()
}

fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if let Some(pct) = s.strip_suffix('%') {
        pct.parse().map(Dimension::Percent).unwrap_or(Dimension::Auto)
    } else {
        parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree top-down. Whitespace-only text is dropped and
/// `display: none` subtrees are pruned.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style, sheet);
                if style.display == Display::None {
                    continue;
                }
                let children = build_styled_tree(&e.children, Some(&style), sheet);
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) if !text.trim().is_empty() => {
                // Text only inherits typography; box properties stay default.
                let mut style = ComputedStyle::default();
                if let Some(p) = parent_style {
                    style.inherit_from(p);
                    style.text_decoration = p.text_decoration;
                }
                style.display = Display::Inline;
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
            DomNode::Text(_) => {}
        }
    }
    result
}
