use thiserror::Error;

use crate::error::PropertyError;
use crate::state::StateValue;

/// Four-sided spacing, top/right/bottom/left.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn uniform(value: f32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

impl From<[f32; 4]> for Edges {
    fn from(v: [f32; 4]) -> Self {
        Self {
            top: v[0],
            right: v[1],
            bottom: v[2],
            left: v[3],
        }
    }
}

impl From<Edges> for [f32; 4] {
    fn from(e: Edges) -> Self {
        [e.top, e.right, e.bottom, e.left]
    }
}

/// Runtime property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Packed RGBA.
    Color(u32),
    Size {
        width: f32,
        height: f32,
    },
    Position {
        x: f32,
        y: f32,
    },
    Margin(Edges),
    Padding(Edges),
    /// Document id of another element.
    Reference(u32),
    /// Name of a handler function provided by the embedder.
    Function(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Color(_) => "color",
            Self::Size { .. } => "size",
            Self::Position { .. } => "position",
            Self::Margin(_) => "margin",
            Self::Padding(_) => "padding",
            Self::Reference(_) => "reference",
            Self::Function(_) => "function",
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v as f32),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Expected value shape for a known property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Number,
    Bool,
    Color,
    Size,
    Position,
    Margin,
    Padding,
    Reference,
    Function,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Color => "color",
            Self::Size => "size",
            Self::Position => "position",
            Self::Margin => "margin",
            Self::Padding => "padding",
            Self::Reference => "reference",
            Self::Function => "function",
        }
    }
}

/// Known property vocabulary. Unknown names are a non-fatal
/// [`PropertyError::Unknown`].
pub fn property_kind(name: &str) -> Option<ValueKind> {
    Some(match name {
        "id" | "text" | "title" | "src" | "placeholder" | "font" => ValueKind::Str,
        "width" | "height" | "x" | "y" | "font_size" | "border_width" | "corner_radius"
        | "opacity" | "min" | "max" | "step" | "value" => ValueKind::Number,
        "visible" | "enabled" | "checked" | "wrap" => ValueKind::Bool,
        "background" | "foreground" | "border_color" => ValueKind::Color,
        "size" => ValueKind::Size,
        "position" => ValueKind::Position,
        "margin" => ValueKind::Margin,
        "padding" => ValueKind::Padding,
        "target" => ValueKind::Reference,
        "on_click" | "on_change" | "on_input" | "on_submit" | "on_focus" | "on_blur" => {
            ValueKind::Function
        }
        _ => return None,
    })
}

/// Check `value` against the schema for `name`. Numeric properties accept
/// ints and floats; color properties accept hex strings.
pub fn check_value(name: &str, value: &Value) -> Result<(), PropertyError> {
    let expected = property_kind(name).ok_or_else(|| PropertyError::Unknown(name.to_string()))?;
    let ok = match expected {
        ValueKind::Str => matches!(value, Value::Str(_)),
        ValueKind::Number => matches!(value, Value::Int(_) | Value::Float(_)),
        ValueKind::Bool => matches!(value, Value::Bool(_)),
        ValueKind::Color => matches!(value, Value::Color(_) | Value::Str(_)),
        ValueKind::Size => matches!(value, Value::Size { .. }),
        ValueKind::Position => matches!(value, Value::Position { .. }),
        ValueKind::Margin => matches!(value, Value::Margin(_)),
        ValueKind::Padding => matches!(value, Value::Padding(_)),
        ValueKind::Reference => matches!(value, Value::Reference(_)),
        ValueKind::Function => matches!(value, Value::Function(_) | Value::Str(_)),
    };
    if ok {
        Ok(())
    } else {
        Err(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: expected.name(),
            got: value.kind(),
        })
    }
}

/// Layout-affecting properties propagate `needs_layout` when they change;
/// everything else only repaints.
pub fn affects_layout(name: &str) -> bool {
    matches!(
        name,
        "width"
            | "height"
            | "x"
            | "y"
            | "size"
            | "position"
            | "margin"
            | "padding"
            | "text"
            | "font_size"
            | "visible"
            | "wrap"
    )
}

/// A property bound to the state store. The last evaluated value lets the
/// reconcile step skip identical results instead of re-applying them every
/// frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub path: String,
    pub last: Option<Value>,
}

/// A named, typed value attached to an element, optionally state-bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub value: Value,
    pub binding: Option<Binding>,
}

impl Property {
    pub fn fixed(value: Value) -> Self {
        Self {
            value,
            binding: None,
        }
    }

    pub fn bound(path: impl Into<String>, initial: Value) -> Self {
        Self {
            value: initial,
            binding: Some(Binding {
                path: path.into(),
                last: None,
            }),
        }
    }
}

/// Coerce a state value into the shape a property expects. `None` means the
/// state value cannot represent the property (the binding is skipped).
pub fn coerce_state_value(state: &StateValue, expected: ValueKind) -> Option<Value> {
    match (expected, state) {
        (ValueKind::Str, StateValue::String(s)) => Some(Value::Str(s.clone())),
        (ValueKind::Str, StateValue::Int(v)) => Some(Value::Str(v.to_string())),
        (ValueKind::Str, StateValue::Float(v)) => Some(Value::Str(v.to_string())),
        (ValueKind::Str, StateValue::Bool(v)) => Some(Value::Str(v.to_string())),
        (ValueKind::Number, StateValue::Int(v)) => Some(Value::Int(*v)),
        (ValueKind::Number, StateValue::Float(v)) => Some(Value::Float(*v)),
        (ValueKind::Bool, StateValue::Bool(v)) => Some(Value::Bool(*v)),
        (ValueKind::Color, StateValue::String(s)) => parse_color(s).ok().map(Value::Color),
        (ValueKind::Color, StateValue::Int(v)) => Some(Value::Color(*v as u32)),
        (ValueKind::Function, StateValue::String(s)) => Some(Value::Function(s.clone())),
        (ValueKind::Reference, StateValue::Int(v)) if *v >= 0 => {
            Some(Value::Reference(*v as u32))
        }
        _ => None,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("color `{0}` is not hex or a named alias")]
    NotAColor(String),
    #[error("hex color `{0}` has {1} digits (expected 6 or 8)")]
    BadLength(String, usize),
    #[error("hex color `{0}` contains a non-hex digit")]
    BadDigit(String),
}

/// Parse `#RRGGBB`, `#RRGGBBAA`, or the literal `transparent` into packed
/// RGBA. Anything else — including the truncated 7-digit form sometimes
/// seen in hand-written documents — is an error the caller surfaces as a
/// warning.
pub fn parse_color(input: &str) -> Result<u32, ColorParseError> {
    if input.eq_ignore_ascii_case("transparent") {
        return Ok(0x0000_0000);
    }
    let Some(hex) = input.strip_prefix('#') else {
        return Err(ColorParseError::NotAColor(input.to_string()));
    };
    match hex.len() {
        6 | 8 => {}
        n => return Err(ColorParseError::BadLength(input.to_string(), n)),
    }
    let parsed = u32::from_str_radix(hex, 16)
        .map_err(|_| ColorParseError::BadDigit(input.to_string()))?;
    if hex.len() == 6 {
        Ok((parsed << 8) | 0xFF)
    } else {
        Ok(parsed)
    }
}
