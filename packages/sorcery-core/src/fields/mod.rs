//! Field handler framework.
//!
//! A field binds a textual name to a slot inside a concrete object type.
//! Each [`FieldKind`] knows how to parse text into the slot and how to
//! render the slot back to text, so objects can travel through object sets
//! regardless of which backend stores them.

mod acl;
mod codec;
mod descriptor;
mod handlers;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::objectset::ObjectSet;

pub use acl::{AccessList, AclRule, AclSense};
pub use codec::{CodecPreferences, KNOWN_CODECS};
pub use descriptor::{FieldDescriptor, HandlerPreference};
pub(crate) use descriptor::{extended_fields_descriptor, regex_descriptor, typed_descriptor};
pub use handlers::{parse_bool, PortPolicy};

/// Typed conversion failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("'{0}' is not a valid integer")]
    InvalidInteger(String),

    #[error("'{0}' is not a valid number")]
    InvalidDouble(String),

    #[error("'{0}' is not a valid boolean")]
    InvalidBool(String),

    #[error("{value} is outside the range {min}..={max}")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    #[error("value is {len} characters long, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("value must not be empty")]
    Empty,

    #[error("'{value}' is not a valid address: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("'{0}' is not a valid access rule")]
    InvalidAcl(String),

    #[error("unknown codec '{0}'")]
    UnknownCodec(String),

    #[error("object is not a '{0}'")]
    WrongObjectType(&'static str),

    #[error("{0}")]
    Custom(String),
}

/// Accessor pair locating a value of type `V` inside an object `T`.
///
/// Usually built with the [`lens!`](crate::lens) macro.
pub struct Lens<T, V> {
    get: fn(&T) -> &V,
    get_mut: fn(&mut T) -> &mut V,
}

impl<T, V> Lens<T, V> {
    pub fn new(get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self {
        Self { get, get_mut }
    }

    pub fn get<'a>(&self, object: &'a T) -> &'a V {
        (self.get)(object)
    }

    pub fn get_mut<'a>(&self, object: &'a mut T) -> &'a mut V {
        (self.get_mut)(object)
    }
}

impl<T, V> Clone for Lens<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Lens<T, V> {}

/// Builds a [`Lens`] for a named struct field.
///
/// ```ignore
/// let count = lens!(Widget, count);
/// ```
#[macro_export]
macro_rules! lens {
    ($ty:ty, $field:ident) => {
        $crate::fields::Lens::<$ty, _>::new(
            |object: &$ty| &object.$field,
            |object: &mut $ty| &mut object.$field,
        )
    };
}

/// Inclusive bounds for numeric fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<N> {
    pub min: N,
    pub max: N,
}

/// What to do with a numeric value outside its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Fail the conversion.
    #[default]
    Reject,
    /// Fall back to the field default.
    UseDefault,
    /// Clamp to the nearest bound and log a warning.
    Clamp,
}

/// Field level behaviour on conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldOptions {
    /// Apply the default value (with a warning) when parsing fails.
    pub default_on_error: bool,
    /// Handling of numeric values outside the configured range.
    pub out_of_range: RangePolicy,
}

type ParseFn<T> = dyn Fn(&mut T, &str, &str) -> Result<(), FieldError> + Send + Sync;
type FormatFn<T> = dyn Fn(&T) -> Result<String, FieldError> + Send + Sync;
type ListFn<T> = dyn Fn(&T) -> Result<ObjectSet, FieldError> + Send + Sync;

/// Handler supplied by the caller for fields no built-in kind covers.
pub struct Custom<T> {
    pub(crate) parse: Arc<ParseFn<T>>,
    pub(crate) format: Option<Arc<FormatFn<T>>>,
    pub(crate) list: Option<Arc<ListFn<T>>>,
}

impl<T> Custom<T> {
    /// Creates a handler from its parse callback, which receives the object,
    /// the field name being applied, and the value.
    pub fn new(
        parse: impl Fn(&mut T, &str, &str) -> Result<(), FieldError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            parse: Arc::new(parse),
            format: None,
            list: None,
        }
    }

    /// Single value serializer.
    pub fn format(
        mut self,
        format: impl Fn(&T) -> Result<String, FieldError> + Send + Sync + 'static,
    ) -> Self {
        self.format = Some(Arc::new(format));
        self
    }

    /// Multi value serializer.
    pub fn list(
        mut self,
        list: impl Fn(&T) -> Result<ObjectSet, FieldError> + Send + Sync + 'static,
    ) -> Self {
        self.list = Some(Arc::new(list));
        self
    }
}

/// Semantic kind of a field and where its value lives.
pub enum FieldKind<T> {
    /// Signed integer, optionally range checked.
    Int {
        lens: Lens<T, i32>,
        range: Option<Range<i32>>,
    },
    /// Unsigned integer, optionally range checked.
    UInt {
        lens: Lens<T, u32>,
        range: Option<Range<u32>>,
    },
    /// Floating point, optionally range checked.
    Double {
        lens: Lens<T, f64>,
        range: Option<Range<f64>>,
    },
    /// Boolean rendered as `true`/`false`.
    Bool(Lens<T, bool>),
    /// Boolean rendered as `yes`/`no`.
    YesNo(Lens<T, bool>),
    /// Boolean stored as bits of a flags word.
    BoolFlag { lens: Lens<T, u32>, mask: u32 },
    /// Bounded length string.
    CharArray { lens: Lens<T, String>, max_len: usize },
    /// Pooled string, optionally required to be non-empty.
    StringField { lens: Lens<T, String>, non_empty: bool },
    /// Comma separated list of strings.
    StringList(Lens<T, Vec<String>>),
    /// Network socket address.
    SockAddr {
        lens: Lens<T, Option<SocketAddr>>,
        port: PortPolicy,
    },
    /// Access control list; every value appends rules of the given sense.
    Acl {
        lens: Lens<T, AccessList>,
        sense: AclSense,
    },
    /// Codec preference set; `allow` adds, otherwise removes.
    Codec {
        lens: Lens<T, CodecPreferences>,
        allow: bool,
    },
    /// Accepted and ignored; documents discriminator fields such as `type`.
    Noop,
    /// Caller supplied conversion.
    Custom(Custom<T>),
}

impl<T> FieldKind<T> {
    pub fn int(lens: Lens<T, i32>) -> Self {
        FieldKind::Int { lens, range: None }
    }

    pub fn int_range(lens: Lens<T, i32>, min: i32, max: i32) -> Self {
        FieldKind::Int {
            lens,
            range: Some(Range { min, max }),
        }
    }

    pub fn uint(lens: Lens<T, u32>) -> Self {
        FieldKind::UInt { lens, range: None }
    }

    pub fn uint_range(lens: Lens<T, u32>, min: u32, max: u32) -> Self {
        FieldKind::UInt {
            lens,
            range: Some(Range { min, max }),
        }
    }

    pub fn double(lens: Lens<T, f64>) -> Self {
        FieldKind::Double { lens, range: None }
    }

    pub fn double_range(lens: Lens<T, f64>, min: f64, max: f64) -> Self {
        FieldKind::Double {
            lens,
            range: Some(Range { min, max }),
        }
    }

    pub fn string(lens: Lens<T, String>) -> Self {
        FieldKind::StringField {
            lens,
            non_empty: false,
        }
    }

    /// Short name of the kind, used in logs and introspection.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int { .. } => "int",
            FieldKind::UInt { .. } => "uint",
            FieldKind::Double { .. } => "double",
            FieldKind::Bool(_) => "bool",
            FieldKind::YesNo(_) => "yesno",
            FieldKind::BoolFlag { .. } => "boolflag",
            FieldKind::CharArray { .. } => "chararray",
            FieldKind::StringField { .. } => "stringfield",
            FieldKind::StringList(_) => "stringlist",
            FieldKind::SockAddr { .. } => "sockaddr",
            FieldKind::Acl { .. } => "acl",
            FieldKind::Codec { .. } => "codec",
            FieldKind::Noop => "noop",
            FieldKind::Custom(_) => "custom",
        }
    }

    /// Checks the static configuration of the kind.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            FieldKind::Int {
                range: Some(range), ..
            } if range.min > range.max => Err(format!("min {} > max {}", range.min, range.max)),
            FieldKind::UInt {
                range: Some(range), ..
            } if range.min > range.max => Err(format!("min {} > max {}", range.min, range.max)),
            FieldKind::Double {
                range: Some(range), ..
            } if range.min.is_nan() || range.max.is_nan() || range.min > range.max => {
                Err(format!("invalid range {}..={}", range.min, range.max))
            }
            FieldKind::BoolFlag { mask: 0, .. } => Err("flag mask must not be zero".to_string()),
            FieldKind::CharArray { max_len: 0, .. } => {
                Err("character array length must be positive".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl<T> fmt::Debug for FieldKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registration parameters for one exact-name field.
pub struct FieldSpec<T> {
    pub(crate) name: String,
    pub(crate) default: Option<String>,
    pub(crate) kind: FieldKind<T>,
    pub(crate) options: FieldOptions,
    pub(crate) alias: bool,
}

impl<T> FieldSpec<T> {
    /// Creates a field with no default.
    pub fn new(name: impl Into<String>, kind: FieldKind<T>) -> Self {
        Self {
            name: name.into(),
            default: None,
            kind,
            options: FieldOptions::default(),
            alias: false,
        }
    }

    /// Default applied at allocation time. Empty defaults are skipped.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Applies the default instead of failing when a value does not parse.
    pub fn default_on_error(mut self) -> Self {
        self.options.default_on_error = true;
        self
    }

    /// Out of range handling for numeric kinds.
    pub fn out_of_range(mut self, policy: RangePolicy) -> Self {
        self.options.out_of_range = policy;
        self
    }

    /// Marks the field as an alternate spelling: it is accepted when
    /// applying object sets but never emitted.
    pub fn alias(mut self) -> Self {
        self.alias = true;
        self
    }
}
