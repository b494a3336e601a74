//! Bind and column value types.
//!
//! Every argument crosses into the engine as one of five storage classes.
//! [`Value`] is that closed set; the `From` conversions below are the single
//! place where a Rust value is classified, so a value classifies the same way
//! whether it is bound to a statement or stored in
//! [`ContentValues`](crate::builder::ContentValues) for the builder.

use std::fmt;

use crate::error::DbError;
use crate::ffi;

/// Storage class of a [`Value`] or of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE float.
    Real,
    /// UTF-8 text.
    Text,
    /// Binary blob.
    Blob,
}

impl ValueKind {
    /// Classifies `value`.
    pub const fn of(value: &Value) -> Self {
        value.kind()
    }

    /// Maps an engine column type code.
    pub(crate) const fn from_engine(code: i32) -> Self {
        match code {
            ffi::SQLITE_INTEGER => Self::Integer,
            ffi::SQLITE_FLOAT => Self::Real,
            ffi::SQLITE_TEXT => Self::Text,
            ffi::SQLITE_BLOB => Self::Blob,
            _ => Self::Null,
        }
    }
}

/// A value that can be bound to a statement parameter or read from a result
/// column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer. Booleans are stored as `0`/`1`.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Binary blob.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns the storage class this value binds as.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Integer(_) => ValueKind::Integer,
            Self::Real(_) => ValueKind::Real,
            Self::Text(_) => ValueKind::Text,
            Self::Blob(_) => ValueKind::Blob,
        }
    }

    /// Text fallback for types without a dedicated conversion: the value's
    /// `Display` output, bound as text.
    pub fn display(value: impl fmt::Display) -> Self {
        Self::Text(value.to_string())
    }

    /// Returns `true` for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Blob(v) => write!(f, "X'{}'", hex::encode_upper(v)),
        }
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Integer(i64::from(v))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<isize> for Value {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "isize is at most 64 bits on every supported target"
    )]
    fn from(v: isize) -> Self {
        Self::Integer(v as i64)
    }
}

macro_rules! impl_try_from_integer {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for Value {
                type Error = DbError;

                fn try_from(v: $t) -> Result<Self, DbError> {
                    i64::try_from(v)
                        .map(Self::Integer)
                        .map_err(|_| DbError::IntegerOverflow(v.to_string()))
                }
            }
        )*
    };
}

impl_try_from_integer!(u64, usize, i128, u128);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(v: [u8; N]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<&Self> for Value {
    fn from(v: &Self) -> Self {
        v.clone()
    }
}

/// Builds a `&[Value]` argument list.
///
/// Usage: `params![7, "user7", blob.as_slice(), None::<i64>]`
#[macro_export]
macro_rules! params {
    ($($val:expr),* $(,)?) => {
        &[$($crate::Value::from($val)),*][..]
    };
}
