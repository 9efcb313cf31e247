//! Literal values and text conversion for built-in primitives and enums.

use std::borrow::Cow;
use std::fmt;

use facet::Facet;
use facet_reflect::Partial;

use crate::token::TypeIndex;

/// The built-in primitive types of the XAML language namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, facet::Facet)]
#[repr(u8)]
pub enum PrimitiveKind {
    /// `x:String`
    String,
    /// `x:Boolean`
    Boolean,
    /// `x:Int32`
    Int32,
    /// `x:Int64`
    Int64,
    /// `x:UInt32`
    UInt32,
    /// `x:Double`
    Double,
    /// `x:Single`
    Single,
    /// `x:Char`
    Char,
}

/// A converted literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A boolean.
    Bool(bool),
    /// Any integer primitive, widened.
    Int(i64),
    /// Any floating-point primitive, widened. `Auto` is NaN.
    Float(f64),
    /// A single character.
    Char(char),
    /// A string.
    String(String),
    /// An enum value of the given enum type.
    Enum {
        /// The enum type.
        ty: TypeIndex,
        /// The member value (or a combination of flags).
        value: i64,
    },
    /// A value produced by a text syntax made of several parts (e.g. a thickness).
    Composite(Vec<Scalar>),
}

impl Scalar {
    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) if v.is_nan() => f.write_str("Auto"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Char(c) => write!(f, "{c}"),
            Scalar::String(s) => f.write_str(s),
            Scalar::Enum { value, .. } => write!(f, "{value}"),
            Scalar::Composite(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

/// Members of an enumeration type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    /// `(name, value)` pairs in declaration order.
    pub members: Vec<(String, i64)>,
    /// Values may be combined with `,`.
    pub flags: bool,
}

impl EnumDef {
    /// Members numbered by position, starting at zero.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: names
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name.into(), i as i64))
                .collect(),
            flags: false,
        }
    }

    /// Members with explicit values, combinable as flags.
    pub fn flags<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(|(n, v)| (n.into(), v)).collect(),
            flags: true,
        }
    }

    /// Name of the member with the given value.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    /// Parse a member name (case-insensitive), an integer, or for flag
    /// enums a comma-separated combination of either.
    pub fn parse(&self, text: &str) -> Result<i64, String> {
        let text = text.trim();
        if self.flags {
            let mut acc = 0i64;
            for part in text.split(',') {
                acc |= self.parse_one(part.trim())?;
            }
            Ok(acc)
        } else {
            self.parse_one(text)
        }
    }

    fn parse_one(&self, text: &str) -> Result<i64, String> {
        if let Some((_, v)) = self
            .members
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(text))
        {
            return Ok(*v);
        }
        parse_with_shape::<i64>(text).map_err(|_| format!("'{text}' is not a member of the enumeration"))
    }
}

/// Parse `text` into `T` through its facet shape.
///
/// This uses the same string setter the DOM deserializers use, so every
/// scalar with a parse vtable entry is accepted.
pub fn parse_with_shape<T>(text: &str) -> Result<T, String>
where
    T: Facet<'static>,
{
    let wip = Partial::alloc_owned::<T>().map_err(|e| e.to_string())?;
    let wip = facet_dessert::set_string_value(wip, Cow::Owned(text.to_owned()), None).map_err(
        |e| match e {
            facet_dessert::DessertError::Reflect { error, .. } => error.to_string(),
            facet_dessert::DessertError::CannotBorrow { message } => message.into_owned(),
        },
    )?;
    let value = wip.build().map_err(|e| e.to_string())?;
    value.materialize::<T>().map_err(|e| e.to_string())
}

impl PrimitiveKind {
    /// The local name under the XAML language namespace.
    pub fn xaml_name(self) -> &'static str {
        match self {
            PrimitiveKind::String => "String",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Char => "Char",
        }
    }

    /// Every built-in primitive.
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::String,
        PrimitiveKind::Boolean,
        PrimitiveKind::Int32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt32,
        PrimitiveKind::Double,
        PrimitiveKind::Single,
        PrimitiveKind::Char,
    ];

    /// Convert a literal.
    pub fn parse(self, text: &str) -> Result<Scalar, String> {
        match self {
            PrimitiveKind::String => Ok(Scalar::String(text.to_owned())),
            PrimitiveKind::Boolean => {
                parse_with_shape::<bool>(&text.trim().to_ascii_lowercase()).map(Scalar::Bool)
            }
            PrimitiveKind::Int32 => parse_with_shape::<i32>(text.trim()).map(|v| Scalar::Int(v.into())),
            PrimitiveKind::Int64 => parse_with_shape::<i64>(text.trim()).map(Scalar::Int),
            PrimitiveKind::UInt32 => parse_with_shape::<u32>(text.trim()).map(|v| Scalar::Int(v.into())),
            PrimitiveKind::Double => {
                let text = text.trim();
                if text.eq_ignore_ascii_case("auto") {
                    Ok(Scalar::Float(f64::NAN))
                } else {
                    parse_with_shape::<f64>(text).map(Scalar::Float)
                }
            }
            PrimitiveKind::Single => parse_with_shape::<f32>(text.trim()).map(|v| Scalar::Float(v.into())),
            PrimitiveKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Scalar::Char(c)),
                    _ => Err("expected exactly one character".to_owned()),
                }
            }
        }
    }
}
