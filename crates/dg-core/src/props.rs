//! Property objects for elements and diagrams.
//!
//! Every leaf is optional: stored element properties are sparse and only
//! hold what the user explicitly set. The fully merged object handed to
//! renderers has every leaf filled because the defaults tables are total.

use crate::error::PathError;
use crate::path::PropertyObject;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × f32 [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Helper to parse a single hex digit.
fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a hex color string: `#RGB`, `#RRGGBB`, `#RRGGBBAA`.
    /// The string may optionally start with `#`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex.as_bytes();
        let pair = |i: usize| -> Option<f32> {
            Some((hex_val(bytes[i])? << 4 | hex_val(bytes[i + 1])?) as f32 / 255.0)
        };

        match bytes.len() {
            3 => {
                let r = hex_val(bytes[0])?;
                let g = hex_val(bytes[1])?;
                let b = hex_val(bytes[2])?;
                Some(Self::rgba(
                    (r * 17) as f32 / 255.0,
                    (g * 17) as f32 / 255.0,
                    (b * 17) as f32 / 255.0,
                    1.0,
                ))
            }
            6 => Some(Self::rgba(pair(0)?, pair(2)?, pair(4)?, 1.0)),
            8 => Some(Self::rgba(pair(0)?, pair(2)?, pair(4)?, pair(6)?)),
            _ => None,
        }
    }

    /// Emit as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let (r, g, b, a) = (to_byte(self.r), to_byte(self.g), to_byte(self.b), to_byte(self.a));
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid color `{s}`")))
    }
}

// ─── Keyword enums ───────────────────────────────────────────────────────

/// Declares a unit enum with a fixed lowercase keyword per variant.
macro_rules! keyword_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $kw:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $kw)] $variant),+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $kw),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();
            fn from_str(s: &str) -> Result<Self, ()> {
                match s {
                    $($kw => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

keyword_enum!(
    /// Dash pattern of a stroke.
    StrokePattern { Solid => "solid", Dashed => "dashed", Dotted => "dotted" }
);

keyword_enum!(
    /// Horizontal text alignment.
    TextAlign { Left => "left", Center => "center", Right => "right" }
);

keyword_enum!(
    /// Vertical text alignment.
    TextVAlign { Top => "top", Middle => "middle", Bottom => "bottom" }
);

keyword_enum!(
    /// How an edge path is drawn between its endpoints.
    CurveKind { Straight => "straight", Smooth => "smooth", Step => "step" }
);

keyword_enum!(
    /// Arrow head placement on an edge.
    ArrowKind { None => "none", Start => "start", End => "end", Both => "both" }
);

// ─── Values ──────────────────────────────────────────────────────────────

/// A single leaf value read from or written to a property object.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    Color(Color),
    /// Free text and enum keywords.
    Text(String),
}

impl PropValue {
    /// JSON form: colors become hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropValue::Bool(b) => serde_json::Value::Bool(*b),
            PropValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropValue::Color(c) => serde_json::Value::String(c.to_hex()),
            PropValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Lift a JSON scalar. Strings stay text; typed setters coerce them.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(PropValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(PropValue::Number),
            serde_json::Value::String(s) => Some(PropValue::Text(s.clone())),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            PropValue::Bool(b) => b.to_string(),
            PropValue::Number(n) => n.to_string(),
            PropValue::Color(c) => c.to_hex(),
            PropValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn mismatch(path: impl fmt::Display, expected: &'static str, got: &PropValue) -> PathError {
    PathError::TypeMismatch {
        path: path.to_string(),
        expected,
        got: got.describe(),
    }
}

fn as_bool(path: impl fmt::Display, v: PropValue) -> Result<bool, PathError> {
    match v {
        PropValue::Bool(b) => Ok(b),
        PropValue::Text(ref s) if s == "true" || s == "false" => Ok(s == "true"),
        other => Err(mismatch(path, "a boolean", &other)),
    }
}

fn as_f32(path: impl fmt::Display, v: PropValue) -> Result<f32, PathError> {
    match v {
        PropValue::Number(n) => Ok(n as f32),
        PropValue::Text(ref s) => s.trim().parse().map_err(|_| mismatch(path, "a number", &v)),
        other => Err(mismatch(path, "a number", &other)),
    }
}

fn as_color(path: impl fmt::Display, v: PropValue) -> Result<Color, PathError> {
    match v {
        PropValue::Color(c) => Ok(c),
        PropValue::Text(ref s) => Color::from_hex(s).ok_or_else(|| mismatch(path, "a color", &v)),
        other => Err(mismatch(path, "a color", &other)),
    }
}

fn as_text(path: impl fmt::Display, v: PropValue) -> Result<String, PathError> {
    match v {
        PropValue::Text(s) => Ok(s),
        other => Err(mismatch(path, "text", &other)),
    }
}

fn as_keyword<T: FromStr>(
    path: impl fmt::Display,
    expected: &'static str,
    v: PropValue,
) -> Result<T, PathError> {
    match v {
        PropValue::Text(ref s) => s.parse().map_err(|_| mismatch(path, expected, &v)),
        other => Err(mismatch(path, expected, &other)),
    }
}

fn num(v: Option<f32>) -> Option<PropValue> {
    v.map(|n| PropValue::Number(f64::from(n)))
}

fn flag(v: Option<bool>) -> Option<PropValue> {
    v.map(PropValue::Bool)
}

fn color(v: Option<Color>) -> Option<PropValue> {
    v.map(PropValue::Color)
}

fn keyword(v: Option<&'static str>) -> Option<PropValue> {
    v.map(|s| PropValue::Text(s.to_string()))
}

/// Apply `parse` to `value` if present, storing the result (or clearing) in `slot`.
fn put<T>(
    slot: &mut Option<T>,
    value: Option<PropValue>,
    parse: impl FnOnce(PropValue) -> Result<T, PathError>,
) -> Result<(), PathError> {
    *slot = value.map(parse).transpose()?;
    Ok(())
}

// ─── Element properties ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FillProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrokeProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<StrokePattern>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShadowProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<TextAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valign: Option<TextVAlign>,
}

/// Edge-only line geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<CurveKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrow: Option<ArrowKind>,
}

fn is_default<T: Default + PartialEq>(v: &T) -> bool {
    *v == T::default()
}

/// Visual properties of a node or edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementProps {
    #[serde(skip_serializing_if = "is_default")]
    pub fill: FillProps,
    #[serde(skip_serializing_if = "is_default")]
    pub stroke: StrokeProps,
    #[serde(skip_serializing_if = "is_default")]
    pub shadow: ShadowProps,
    #[serde(skip_serializing_if = "is_default")]
    pub text: TextProps,
    #[serde(skip_serializing_if = "is_default")]
    pub line: LineProps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f32>,
}

/// Property group a path belongs to. `set-props` actions are scoped to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropCategory {
    Fill,
    Stroke,
    Shadow,
    Text,
    Line,
    General,
}

impl PropCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            PropCategory::Fill => "fill",
            PropCategory::Stroke => "stroke",
            PropCategory::Shadow => "shadow",
            PropCategory::Text => "text",
            PropCategory::Line => "line",
            PropCategory::General => "general",
        }
    }
}

/// A known leaf path of [`ElementProps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropPath {
    FillEnabled,
    FillColor,
    StrokeEnabled,
    StrokeColor,
    StrokeWidth,
    StrokePattern,
    ShadowEnabled,
    ShadowColor,
    ShadowOpacity,
    ShadowX,
    ShadowY,
    ShadowBlur,
    TextFont,
    TextFontSize,
    TextColor,
    TextBold,
    TextItalic,
    TextAlign,
    TextValign,
    LineCurve,
    LineArrow,
    Opacity,
    CornerRadius,
}

impl PropPath {
    pub const ALL: [PropPath; 23] = [
        PropPath::FillEnabled,
        PropPath::FillColor,
        PropPath::StrokeEnabled,
        PropPath::StrokeColor,
        PropPath::StrokeWidth,
        PropPath::StrokePattern,
        PropPath::ShadowEnabled,
        PropPath::ShadowColor,
        PropPath::ShadowOpacity,
        PropPath::ShadowX,
        PropPath::ShadowY,
        PropPath::ShadowBlur,
        PropPath::TextFont,
        PropPath::TextFontSize,
        PropPath::TextColor,
        PropPath::TextBold,
        PropPath::TextItalic,
        PropPath::TextAlign,
        PropPath::TextValign,
        PropPath::LineCurve,
        PropPath::LineArrow,
        PropPath::Opacity,
        PropPath::CornerRadius,
    ];

    /// The dotted string form used by editors and serialized rules.
    pub const fn as_str(self) -> &'static str {
        match self {
            PropPath::FillEnabled => "fill.enabled",
            PropPath::FillColor => "fill.color",
            PropPath::StrokeEnabled => "stroke.enabled",
            PropPath::StrokeColor => "stroke.color",
            PropPath::StrokeWidth => "stroke.width",
            PropPath::StrokePattern => "stroke.pattern",
            PropPath::ShadowEnabled => "shadow.enabled",
            PropPath::ShadowColor => "shadow.color",
            PropPath::ShadowOpacity => "shadow.opacity",
            PropPath::ShadowX => "shadow.x",
            PropPath::ShadowY => "shadow.y",
            PropPath::ShadowBlur => "shadow.blur",
            PropPath::TextFont => "text.font",
            PropPath::TextFontSize => "text.fontSize",
            PropPath::TextColor => "text.color",
            PropPath::TextBold => "text.bold",
            PropPath::TextItalic => "text.italic",
            PropPath::TextAlign => "text.align",
            PropPath::TextValign => "text.valign",
            PropPath::LineCurve => "line.curve",
            PropPath::LineArrow => "line.arrow",
            PropPath::Opacity => "opacity",
            PropPath::CornerRadius => "cornerRadius",
        }
    }

    pub const fn category(self) -> PropCategory {
        match self {
            PropPath::FillEnabled | PropPath::FillColor => PropCategory::Fill,
            PropPath::StrokeEnabled
            | PropPath::StrokeColor
            | PropPath::StrokeWidth
            | PropPath::StrokePattern => PropCategory::Stroke,
            PropPath::ShadowEnabled
            | PropPath::ShadowColor
            | PropPath::ShadowOpacity
            | PropPath::ShadowX
            | PropPath::ShadowY
            | PropPath::ShadowBlur => PropCategory::Shadow,
            PropPath::TextFont
            | PropPath::TextFontSize
            | PropPath::TextColor
            | PropPath::TextBold
            | PropPath::TextItalic
            | PropPath::TextAlign
            | PropPath::TextValign => PropCategory::Text,
            PropPath::LineCurve | PropPath::LineArrow => PropCategory::Line,
            PropPath::Opacity | PropPath::CornerRadius => PropCategory::General,
        }
    }
}

impl fmt::Display for PropPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, PathError> {
        PropPath::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PathError::UnknownPath(s.to_string()))
    }
}

impl PropertyObject for ElementProps {
    type Path = PropPath;

    fn paths() -> &'static [PropPath] {
        &PropPath::ALL
    }

    fn get(&self, path: PropPath) -> Option<PropValue> {
        match path {
            PropPath::FillEnabled => flag(self.fill.enabled),
            PropPath::FillColor => color(self.fill.color),
            PropPath::StrokeEnabled => flag(self.stroke.enabled),
            PropPath::StrokeColor => color(self.stroke.color),
            PropPath::StrokeWidth => num(self.stroke.width),
            PropPath::StrokePattern => keyword(self.stroke.pattern.map(StrokePattern::as_str)),
            PropPath::ShadowEnabled => flag(self.shadow.enabled),
            PropPath::ShadowColor => color(self.shadow.color),
            PropPath::ShadowOpacity => num(self.shadow.opacity),
            PropPath::ShadowX => num(self.shadow.x),
            PropPath::ShadowY => num(self.shadow.y),
            PropPath::ShadowBlur => num(self.shadow.blur),
            PropPath::TextFont => self.text.font.clone().map(PropValue::Text),
            PropPath::TextFontSize => num(self.text.font_size),
            PropPath::TextColor => color(self.text.color),
            PropPath::TextBold => flag(self.text.bold),
            PropPath::TextItalic => flag(self.text.italic),
            PropPath::TextAlign => keyword(self.text.align.map(TextAlign::as_str)),
            PropPath::TextValign => keyword(self.text.valign.map(TextVAlign::as_str)),
            PropPath::LineCurve => keyword(self.line.curve.map(CurveKind::as_str)),
            PropPath::LineArrow => keyword(self.line.arrow.map(ArrowKind::as_str)),
            PropPath::Opacity => num(self.opacity),
            PropPath::CornerRadius => num(self.corner_radius),
        }
    }

    fn set(&mut self, path: PropPath, value: Option<PropValue>) -> Result<(), PathError> {
        match path {
            PropPath::FillEnabled => put(&mut self.fill.enabled, value, |v| as_bool(path, v)),
            PropPath::FillColor => put(&mut self.fill.color, value, |v| as_color(path, v)),
            PropPath::StrokeEnabled => put(&mut self.stroke.enabled, value, |v| as_bool(path, v)),
            PropPath::StrokeColor => put(&mut self.stroke.color, value, |v| as_color(path, v)),
            PropPath::StrokeWidth => put(&mut self.stroke.width, value, |v| as_f32(path, v)),
            PropPath::StrokePattern => put(&mut self.stroke.pattern, value, |v| {
                as_keyword(path, "solid, dashed or dotted", v)
            }),
            PropPath::ShadowEnabled => put(&mut self.shadow.enabled, value, |v| as_bool(path, v)),
            PropPath::ShadowColor => put(&mut self.shadow.color, value, |v| as_color(path, v)),
            PropPath::ShadowOpacity => put(&mut self.shadow.opacity, value, |v| as_f32(path, v)),
            PropPath::ShadowX => put(&mut self.shadow.x, value, |v| as_f32(path, v)),
            PropPath::ShadowY => put(&mut self.shadow.y, value, |v| as_f32(path, v)),
            PropPath::ShadowBlur => put(&mut self.shadow.blur, value, |v| as_f32(path, v)),
            PropPath::TextFont => put(&mut self.text.font, value, |v| as_text(path, v)),
            PropPath::TextFontSize => put(&mut self.text.font_size, value, |v| as_f32(path, v)),
            PropPath::TextColor => put(&mut self.text.color, value, |v| as_color(path, v)),
            PropPath::TextBold => put(&mut self.text.bold, value, |v| as_bool(path, v)),
            PropPath::TextItalic => put(&mut self.text.italic, value, |v| as_bool(path, v)),
            PropPath::TextAlign => put(&mut self.text.align, value, |v| {
                as_keyword(path, "left, center or right", v)
            }),
            PropPath::TextValign => put(&mut self.text.valign, value, |v| {
                as_keyword(path, "top, middle or bottom", v)
            }),
            PropPath::LineCurve => put(&mut self.line.curve, value, |v| {
                as_keyword(path, "straight, smooth or step", v)
            }),
            PropPath::LineArrow => put(&mut self.line.arrow, value, |v| {
                as_keyword(path, "none, start, end or both", v)
            }),
            PropPath::Opacity => put(&mut self.opacity, value, |v| as_f32(path, v)),
            PropPath::CornerRadius => put(&mut self.corner_radius, value, |v| as_f32(path, v)),
        }
    }
}

impl ElementProps {
    /// Read a leaf by its string path. Unknown paths yield `None`.
    pub fn get_path(&self, path: &str) -> Option<PropValue> {
        path.parse::<PropPath>().ok().and_then(|p| self.get(p))
    }

    /// Write a leaf by its string path.
    pub fn set_path(&mut self, path: &str, value: Option<PropValue>) -> Result<(), PathError> {
        self.set(path.parse()?, value)
    }

    /// Only the leaves belonging to `category`.
    pub fn restricted_to(&self, category: PropCategory) -> ElementProps {
        let mut out = ElementProps::default();
        for &path in PropPath::ALL.iter().filter(|p| p.category() == category) {
            let _ = out.set(path, self.get(path));
        }
        out
    }

    /// Only the text group (what a text stylesheet contributes).
    pub fn text_only(&self) -> ElementProps {
        self.restricted_to(PropCategory::Text)
    }

    /// Everything except the text group.
    pub fn without_text(&self) -> ElementProps {
        let mut out = self.clone();
        out.text = TextProps::default();
        out
    }

    /// Build from a JSON object keyed by dotted paths or nested groups.
    ///
    /// `{"fill.color": "#f00"}` and `{"fill": {"color": "#f00"}}` are equivalent.
    pub fn from_json_paths(value: &serde_json::Value) -> Result<ElementProps, PathError> {
        let mut props = ElementProps::default();
        let Some(map) = value.as_object() else {
            return Ok(props);
        };
        for (key, v) in map {
            if let Some(nested) = v.as_object() {
                for (leaf, lv) in nested {
                    props.set_leaf_json(&format!("{key}.{leaf}"), lv)?;
                }
            } else {
                props.set_leaf_json(key, v)?;
            }
        }
        Ok(props)
    }

    fn set_leaf_json(&mut self, path: &str, value: &serde_json::Value) -> Result<(), PathError> {
        let path: PropPath = path.parse()?;
        let value = PropValue::from_json(value).ok_or_else(|| PathError::TypeMismatch {
            path: path.to_string(),
            expected: "a scalar",
            got: value.to_string(),
        })?;
        self.set(path, Some(value))
    }
}

// ─── Diagram properties ──────────────────────────────────────────────────

/// Canvas-level properties of a diagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagramProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramPath {
    Background,
    GridEnabled,
    GridSize,
}

impl DiagramPath {
    pub const ALL: [DiagramPath; 3] = [
        DiagramPath::Background,
        DiagramPath::GridEnabled,
        DiagramPath::GridSize,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            DiagramPath::Background => "background",
            DiagramPath::GridEnabled => "gridEnabled",
            DiagramPath::GridSize => "gridSize",
        }
    }
}

impl fmt::Display for DiagramPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, PathError> {
        DiagramPath::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PathError::UnknownPath(s.to_string()))
    }
}

impl PropertyObject for DiagramProps {
    type Path = DiagramPath;

    fn paths() -> &'static [DiagramPath] {
        &DiagramPath::ALL
    }

    fn get(&self, path: DiagramPath) -> Option<PropValue> {
        match path {
            DiagramPath::Background => color(self.background),
            DiagramPath::GridEnabled => flag(self.grid_enabled),
            DiagramPath::GridSize => num(self.grid_size),
        }
    }

    fn set(&mut self, path: DiagramPath, value: Option<PropValue>) -> Result<(), PathError> {
        match path {
            DiagramPath::Background => put(&mut self.background, value, |v| as_color(path, v)),
            DiagramPath::GridEnabled => put(&mut self.grid_enabled, value, |v| as_bool(path, v)),
            DiagramPath::GridSize => put(&mut self.grid_size, value, |v| as_f32(path, v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn color_hex_roundtrip() {
        let c = Color::from_hex("#6C5CE7").unwrap();
        assert_eq!(c.to_hex(), "#6C5CE7");

        let c2 = Color::from_hex("#FF000080").unwrap();
        assert!((c2.a - 128.0 / 255.0).abs() < 0.01);
        assert_eq!(c2.to_hex().len(), 9);

        assert_eq!(Color::from_hex("#f00"), Color::from_hex("#FF0000"));
        assert!(Color::from_hex("#12").is_none());
    }

    #[test]
    fn path_strings_parse_back() {
        for path in PropPath::ALL {
            assert_eq!(path.as_str().parse::<PropPath>(), Ok(path));
        }
        assert!("fill.colour".parse::<PropPath>().is_err());
    }

    #[test]
    fn typed_set_coerces_text() {
        let mut props = ElementProps::default();
        props
            .set_path("fill.color", Some(PropValue::Text("#00ff00".into())))
            .unwrap();
        props
            .set_path("text.align", Some(PropValue::Text("right".into())))
            .unwrap();
        assert_eq!(props.fill.color, Color::from_hex("#00FF00"));
        assert_eq!(props.text.align, Some(TextAlign::Right));
    }

    #[test]
    fn typed_set_rejects_wrong_type() {
        let mut props = ElementProps::default();
        let err = props
            .set(PropPath::StrokeWidth, Some(PropValue::Bool(true)))
            .unwrap_err();
        assert!(matches!(err, PathError::TypeMismatch { .. }));
        assert!(props.stroke.width.is_none());
    }

    #[test]
    fn sparse_serialization() {
        let mut props = ElementProps::default();
        props.fill.color = Color::from_hex("#ff0000");
        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json, json!({"fill": {"color": "#FF0000"}}));

        let back: ElementProps = serde_json::from_value(json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn json_paths_accept_both_shapes() {
        let a = ElementProps::from_json_paths(&json!({"fill.color": "#f00"})).unwrap();
        let b = ElementProps::from_json_paths(&json!({"fill": {"color": "#f00"}})).unwrap();
        assert_eq!(a, b);
        assert!(ElementProps::from_json_paths(&json!({"nope": 1})).is_err());
    }

    #[test]
    fn restricted_to_category() {
        let mut props = ElementProps::default();
        props.fill.color = Some(Color::WHITE);
        props.text.bold = Some(true);
        let text = props.text_only();
        assert!(text.fill.color.is_none());
        assert_eq!(text.text.bold, Some(true));
        assert!(props.without_text().text.bold.is_none());
    }
}
