//! Layout engine – uses Taffy to compute flexbox layout for a styled tree and
//! converts the result into a visual tree of absolutely positioned boxes.
//!
//! Every element becomes a flex container (blocks stack as columns, table
//! rows and `display: flex` elements as rows). A block whose children are all
//! inline gets its text merged into one wrapped text leaf, aligned inside the
//! block according to `text-align`.

use std::collections::HashMap;

use taffy::prelude::*;

use crate::capture::{decode_data_uri, ImageSet};
use crate::dom::Tag;
use crate::error::CaptureError;
use crate::fonts::{wrap_text, FontManager};
use crate::style::{self, ComputedStyle, StyledNode};

// ---------------------------------------------------------------------------
// Visual tree
// ---------------------------------------------------------------------------

/// Absolute box geometry in CSS px, origin at the top-left of the layout root.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: style::Color,
}

/// A run of pre-wrapped text lines sharing one style.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub lines: Vec<String>,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: style::Color,
    /// Line box height in px.
    pub line_height: f32,
    pub align: style::TextAlign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    None,
    Text(TextRun),
    Image { src: String },
}

/// One laid-out box of the visual tree.
#[derive(Debug, Clone)]
pub struct LayoutNode {
    /// The element `id`, when it had one.
    pub id: Option<String>,
    pub bounds: Bounds,
    pub background: Option<style::Color>,
    pub border: Option<Border>,
    pub content: NodeContent,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    /// Depth-first lookup by element id.
    pub fn find(&self, id: &str) -> Option<&LayoutNode> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Visit this node and all descendants, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a LayoutNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

// ---------------------------------------------------------------------------
// Taffy tree construction
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NodeMeta {
    id: Option<String>,
    background: Option<style::Color>,
    border: Option<Border>,
    content: Option<NodeContent>,
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    images: &'a ImageSet,
    meta: HashMap<NodeId, NodeMeta>,
}

fn layout_err(e: taffy::TaffyError) -> CaptureError {
    CaptureError::Layout(e.to_string())
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, images: &'a ImageSet) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            images,
            meta: HashMap::new(),
        }
    }

    /// Concatenate the text of an inline subtree; `<br>` becomes a newline.
    fn inline_text(node: &StyledNode) -> String {
        match node {
            StyledNode::Text { text, .. } => text.clone(),
            StyledNode::Element { tag: Tag::Br, .. } => "\n".to_string(),
            StyledNode::Element { children, .. } => {
                children.iter().map(Self::inline_text).collect()
            }
        }
    }

    fn all_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                style, children, ..
            } => style.display == style::Display::Inline && Self::all_inline(children),
        })
    }

    fn build_node(
        &mut self,
        styled: &StyledNode,
        avail_width: f32,
        in_column: bool,
    ) -> Result<Option<NodeId>, CaptureError> {
        match styled {
            StyledNode::Text { text, style } => self
                .build_text_leaf(text, style, avail_width, in_column)
                .map(Some),
            StyledNode::Element { tag: Tag::Br, .. } => Ok(None),
            StyledNode::Element { tag: Tag::Img, style, attrs, .. } => {
                let src = attrs.get("src").cloned().unwrap_or_default();
                self.build_image_leaf(src, style, avail_width).map(Some)
            }
            StyledNode::Element { style, .. } if style.display == style::Display::Inline => {
                // Inline element among block siblings: render as its own run.
                let text = Self::inline_text(styled);
                if text.trim().is_empty() {
                    return Ok(None);
                }
                self.build_text_leaf(&text, style, avail_width, in_column)
                    .map(Some)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self
                .build_container(tag, style, children, attrs.get("id").cloned(), avail_width)
                .map(Some),
        }
    }

    fn build_container(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        id: Option<String>,
        avail_width: f32,
    ) -> Result<NodeId, CaptureError> {
        let my_width = match style.width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => avail_width * p / 100.0,
            style::Dimension::Auto => avail_width,
        };
        let inner_width = (my_width
            - style.padding.left
            - style.padding.right
            - 2.0 * style.border_width)
            .max(1.0);
        let is_row = matches!(style.display, style::Display::Flex)
            && style.flex_direction == style::FlexDirection::Row;

        let mut child_ids = Vec::new();
        if !children.is_empty() && Self::all_inline(children) {
            let raw: String = children.iter().map(Self::inline_text).collect();
            let merged = normalize_whitespace(&raw);
            if !merged.is_empty() {
                child_ids.push(self.build_text_leaf(&merged, style, inner_width, !is_row)?);
            }
        } else {
            // Rows hand each child an equal share for word-wrapping.
            let child_width = if is_row {
                let n = children.len().max(1) as f32;
                ((inner_width - style.gap * (n - 1.0)) / n).max(1.0)
            } else {
                inner_width
            };
            for child in children {
                if let Some(id) = self.build_node(child, child_width, !is_row)? {
                    child_ids.push(id);
                }
            }
        }

        let node = self
            .taffy
            .new_with_children(container_style(style, tag), &child_ids)
            .map_err(layout_err)?;
        self.meta.insert(
            node,
            NodeMeta {
                id,
                background: (!style.background_color.is_transparent())
                    .then_some(style.background_color),
                border: (style.border_width > 0.0).then_some(Border {
                    width: style.border_width,
                    color: style.border_color,
                }),
                content: None,
            },
        );
        Ok(node)
    }

    fn build_text_leaf(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        max_width: f32,
        in_column: bool,
    ) -> Result<NodeId, CaptureError> {
        let (bold, italic) = (style.is_bold(), style.is_italic());
        let text = normalize_whitespace(text);
        let lines = wrap_text(&text, style.font_size, bold, italic, max_width, self.fonts);
        let width = lines
            .iter()
            .map(|l| {
                self.fonts
                    .measure_text_width(l, style.font_size, bold, italic)
            })
            .fold(0.0f32, f32::max);
        let line_height = self.fonts.line_height_px(style.font_size, style.line_height);

        let mut leaf = Style {
            size: Size {
                width: Dimension::Length(width),
                height: Dimension::Length(lines.len() as f32 * line_height),
            },
            flex_shrink: 0.0,
            ..Default::default()
        };
        if in_column {
            leaf.align_self = Some(match style.text_align {
                style::TextAlign::Left => AlignSelf::FlexStart,
                style::TextAlign::Center => AlignSelf::Center,
                style::TextAlign::Right => AlignSelf::FlexEnd,
            });
        }

        let node = self.taffy.new_leaf(leaf).map_err(layout_err)?;
        self.meta.insert(
            node,
            NodeMeta {
                content: Some(NodeContent::Text(TextRun {
                    lines,
                    font_size: style.font_size,
                    bold,
                    italic,
                    underline: style.text_decoration == style::TextDecoration::Underline,
                    color: style.color,
                    line_height,
                    align: style.text_align,
                })),
                ..Default::default()
            },
        );
        Ok(node)
    }

    fn build_image_leaf(
        &mut self,
        src: String,
        style: &ComputedStyle,
        avail_width: f32,
    ) -> Result<NodeId, CaptureError> {
        let intrinsic = intrinsic_size(&src, self.images);
        let (width, height) = resolve_image_size(intrinsic, style, avail_width);
        let leaf = Style {
            size: Size {
                width: Dimension::Length(width),
                height: Dimension::Length(height),
            },
            margin: margin_rect(style),
            flex_shrink: 0.0,
            ..Default::default()
        };
        let node = self.taffy.new_leaf(leaf).map_err(layout_err)?;
        self.meta.insert(
            node,
            NodeMeta {
                content: Some(NodeContent::Image { src }),
                ..Default::default()
            },
        );
        Ok(node)
    }

    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<LayoutNode, CaptureError> {
        let layout = self.taffy.layout(node).map_err(layout_err)?;
        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(layout_err)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        let meta = self.meta.get(&node);
        Ok(LayoutNode {
            id: meta.and_then(|m| m.id.clone()),
            bounds: Bounds {
                x,
                y,
                width: layout.size.width,
                height: layout.size.height,
            },
            background: meta.and_then(|m| m.background),
            border: meta.and_then(|m| m.border),
            content: meta
                .and_then(|m| m.content.clone())
                .unwrap_or(NodeContent::None),
            children,
        })
    }
}

/// Collapse runs of whitespace to single spaces within each line, keeping
/// explicit line breaks.
fn normalize_whitespace(raw: &str) -> String {
    raw.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

fn dimension(d: style::Dimension) -> Dimension {
    match d {
        style::Dimension::Auto => Dimension::Auto,
        style::Dimension::Px(v) => Dimension::Length(v),
        style::Dimension::Percent(v) => Dimension::Percent(v / 100.0),
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin.top),
        right: LengthPercentageAuto::Length(s.margin.right),
        bottom: LengthPercentageAuto::Length(s.margin.bottom),
        left: LengthPercentageAuto::Length(s.margin.left),
    }
}

fn container_style(s: &ComputedStyle, tag: &Tag) -> Style {
    let mut ts = Style {
        display: taffy::Display::Flex,
        flex_direction: match (s.display, s.flex_direction) {
            (style::Display::Flex, style::FlexDirection::Row) => taffy::FlexDirection::Row,
            _ => taffy::FlexDirection::Column,
        },
        justify_content: Some(match s.justify_content {
            style::JustifyContent::Start => JustifyContent::FlexStart,
            style::JustifyContent::End => JustifyContent::FlexEnd,
            style::JustifyContent::Center => JustifyContent::Center,
            style::JustifyContent::SpaceBetween => JustifyContent::SpaceBetween,
            style::JustifyContent::SpaceAround => JustifyContent::SpaceAround,
        }),
        align_items: Some(match s.align_items {
            style::AlignItems::Start => AlignItems::FlexStart,
            style::AlignItems::End => AlignItems::FlexEnd,
            style::AlignItems::Center => AlignItems::Center,
            style::AlignItems::Stretch => AlignItems::Stretch,
        }),
        size: Size {
            width: dimension(s.width),
            height: dimension(s.height),
        },
        flex_grow: s.flex_grow,
        flex_shrink: 1.0,
        margin: margin_rect(s),
        padding: Rect {
            top: LengthPercentage::Length(s.padding.top),
            right: LengthPercentage::Length(s.padding.right),
            bottom: LengthPercentage::Length(s.padding.bottom),
            left: LengthPercentage::Length(s.padding.left),
        },
        border: Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        },
        gap: Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        },
        ..Default::default()
    };

    // Table cells share their row equally.
    if matches!(tag, Tag::Td | Tag::Th) {
        ts.flex_grow = 1.0;
        ts.flex_basis = Dimension::Length(0.0);
        ts.min_size.width = Dimension::Length(0.0);
    }
    ts
}

/// Pixel size of an image source: from the resolved set, else decoded from
/// an inline data URI.
fn intrinsic_size(src: &str, images: &ImageSet) -> Option<(f32, f32)> {
    images
        .dimensions(src)
        .or_else(|| {
            decode_data_uri(src)
                .ok()
                .and_then(|bytes| ::image::load_from_memory(&bytes).ok())
                .map(|img| (img.width(), img.height()))
        })
        .map(|(w, h)| (w as f32, h as f32))
        .filter(|(w, h)| *w > 0.0 && *h > 0.0)
}

/// Resolve `Auto` image dimensions from the intrinsic size, keeping its
/// aspect ratio. Unresolved sources without explicit sizes lay out as
/// zero-area boxes.
fn resolve_image_size(
    intrinsic: Option<(f32, f32)>,
    style: &ComputedStyle,
    avail_width: f32,
) -> (f32, f32) {
    let known_w = match style.width {
        style::Dimension::Px(v) => Some(v),
        style::Dimension::Percent(p) => Some(avail_width * p / 100.0),
        style::Dimension::Auto => None,
    };
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };
    if let (Some(w), Some(h)) = (known_w, known_h) {
        return (w, h);
    }

    let Some((px_w, px_h)) = intrinsic else {
        return (known_w.unwrap_or(0.0), known_h.unwrap_or(0.0));
    };
    let aspect = px_w / px_h;
    match (known_w, known_h) {
        (Some(w), None) => (w, w / aspect),
        (None, Some(h)) => (h * aspect, h),
        _ => (px_w, px_h),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out a styled tree inside a viewport `viewport_width` px wide and
/// return the top-level boxes with absolute coordinates. Images without an
/// explicit size take their intrinsic size from `images`.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    viewport_width: f32,
    fonts: &FontManager,
    images: &ImageSet,
) -> Result<Vec<LayoutNode>, CaptureError> {
    let mut builder = LayoutBuilder::new(fonts, images);

    let mut child_ids = Vec::new();
    for node in styled_nodes {
        if let Some(id) = builder.build_node(node, viewport_width, true)? {
            child_ids.push(id);
        }
    }

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: Dimension::Length(viewport_width),
            height: Dimension::Auto,
        },
        ..Default::default()
    };
    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(layout_err)?;
    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(viewport_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    Ok(builder.extract(root, 0.0, 0.0)?.children)
}
