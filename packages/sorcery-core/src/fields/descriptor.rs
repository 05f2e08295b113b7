//! Type-erased field descriptors.

use std::fmt;

use regex::Regex;

use super::handlers::{
    check_range, format_sockaddr, format_yesno, parse_f64, parse_i32, parse_list, parse_sockaddr,
    parse_u32,
};
use super::{parse_bool, Custom, FieldError, FieldKind, FieldOptions, FieldSpec, RangePolicy};
use crate::object::{SorceryObject, EXTENDED_PREFIX};
use crate::objectset::ObjectSet;

/// Which serializer to use when a field offers both forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerPreference {
    /// Multi value serializer when present, else single value.
    #[default]
    PreferList,
    /// Single value serializer when present, else multi value.
    PreferString,
    /// Single value serializer only.
    OnlyString,
    /// Multi value serializer only.
    OnlyList,
}

/// Conversion between text and one slot of a concrete object.
pub(crate) trait FieldHandler: Send + Sync {
    fn parse(&self, object: &mut dyn SorceryObject, name: &str, value: &str)
        -> Result<(), FieldError>;

    /// `None` when the field has no single value form.
    fn format(&self, object: &dyn SorceryObject) -> Option<Result<String, FieldError>>;

    /// `None` when the field has no multi value form.
    fn list(&self, object: &dyn SorceryObject, name: &str)
        -> Option<Result<ObjectSet, FieldError>>;
}

/// A registered field of an object type.
pub struct FieldDescriptor {
    name: String,
    matcher: Option<Regex>,
    default: Option<String>,
    options: FieldOptions,
    alias: bool,
    kind: &'static str,
    handler: Box<dyn FieldHandler>,
}

impl FieldDescriptor {
    /// Exact name, or the pattern for regex fields.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_regex(&self) -> bool {
        self.matcher.is_some()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_alias(&self) -> bool {
        self.alias
    }

    /// Short name of the field kind.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Whether this descriptor owns the field `name`.
    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Some(regex) => regex.is_match(name),
            None => self.name == name,
        }
    }

    /// Parses `value` into the object, honoring the field's fallback options.
    pub(crate) fn apply(
        &self,
        object: &mut dyn SorceryObject,
        name: &str,
        value: &str,
    ) -> Result<(), FieldError> {
        match self.handler.parse(object, name, value) {
            Ok(()) => Ok(()),
            Err(err) => {
                let fallback = self.options.default_on_error
                    || (self.options.out_of_range == RangePolicy::UseDefault
                        && matches!(err, FieldError::OutOfRange { .. }));
                match self.default.as_deref() {
                    Some(default) if fallback && default != value => {
                        tracing::warn!(
                            "Field '{}' value '{}' rejected ({}), using default '{}'",
                            name,
                            value,
                            err,
                            default
                        );
                        self.handler.parse(object, name, default)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    /// Applies the default value, if any. Empty defaults are skipped.
    pub(crate) fn apply_default(&self, object: &mut dyn SorceryObject) -> Result<(), FieldError> {
        match self.default.as_deref() {
            Some(default) if !default.is_empty() && !self.is_regex() => {
                self.handler.parse(object, &self.name, default)
            }
            _ => Ok(()),
        }
    }

    /// Renders the field as zero or more pairs appended to `out`.
    pub(crate) fn serialize(
        &self,
        object: &dyn SorceryObject,
        preference: HandlerPreference,
        out: &mut ObjectSet,
    ) -> Result<(), FieldError> {
        if self.alias {
            return Ok(());
        }

        let single = |out: &mut ObjectSet| -> Option<Result<(), FieldError>> {
            self.handler
                .format(object)
                .map(|value| value.map(|value| out.push(self.name.clone(), value)))
        };
        let multi = |out: &mut ObjectSet| -> Option<Result<(), FieldError>> {
            self.handler
                .list(object, &self.name)
                .map(|set| set.map(|set| out.append(set)))
        };

        let rendered = match preference {
            HandlerPreference::PreferList => multi(&mut *out).or_else(|| single(&mut *out)),
            HandlerPreference::PreferString => single(&mut *out).or_else(|| multi(&mut *out)),
            HandlerPreference::OnlyString => single(out),
            HandlerPreference::OnlyList => multi(out),
        };
        rendered.unwrap_or(Ok(()))
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("regex", &self.is_regex())
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("alias", &self.alias)
            .finish()
    }
}

struct TypedField<T> {
    kind: FieldKind<T>,
    clamp: bool,
}

fn wrong_type<T>() -> FieldError {
    FieldError::WrongObjectType(std::any::type_name::<T>())
}

impl<T: SorceryObject> FieldHandler for TypedField<T> {
    fn parse(
        &self,
        object: &mut dyn SorceryObject,
        name: &str,
        value: &str,
    ) -> Result<(), FieldError> {
        let object = object
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(wrong_type::<T>)?;

        match &self.kind {
            FieldKind::Int { lens, range } => {
                *lens.get_mut(object) =
                    check_range(name, parse_i32(value)?, range.as_ref(), self.clamp)?;
            }
            FieldKind::UInt { lens, range } => {
                *lens.get_mut(object) =
                    check_range(name, parse_u32(value)?, range.as_ref(), self.clamp)?;
            }
            FieldKind::Double { lens, range } => {
                *lens.get_mut(object) =
                    check_range(name, parse_f64(value)?, range.as_ref(), self.clamp)?;
            }
            FieldKind::Bool(lens) | FieldKind::YesNo(lens) => {
                *lens.get_mut(object) = parse_bool(value)?;
            }
            FieldKind::BoolFlag { lens, mask } => {
                let flags = lens.get_mut(object);
                if parse_bool(value)? {
                    *flags |= *mask;
                } else {
                    *flags &= !*mask;
                }
            }
            FieldKind::CharArray { lens, max_len } => {
                let len = value.chars().count();
                if len > *max_len {
                    return Err(FieldError::TooLong { len, max: *max_len });
                }
                *lens.get_mut(object) = value.to_string();
            }
            FieldKind::StringField { lens, non_empty } => {
                if *non_empty && value.trim().is_empty() {
                    return Err(FieldError::Empty);
                }
                *lens.get_mut(object) = value.to_string();
            }
            FieldKind::StringList(lens) => *lens.get_mut(object) = parse_list(value),
            FieldKind::SockAddr { lens, port } => {
                *lens.get_mut(object) = parse_sockaddr(value, *port)?;
            }
            FieldKind::Acl { lens, sense } => lens.get_mut(object).append(*sense, value)?,
            FieldKind::Codec { lens, allow } => lens.get_mut(object).update(*allow, value)?,
            FieldKind::Noop => {}
            FieldKind::Custom(custom) => (custom.parse)(object, name, value)?,
        }
        Ok(())
    }

    fn format(&self, object: &dyn SorceryObject) -> Option<Result<String, FieldError>> {
        let Some(object) = object.as_any().downcast_ref::<T>() else {
            return Some(Err(wrong_type::<T>()));
        };

        let text = match &self.kind {
            FieldKind::Int { lens, .. } => lens.get(object).to_string(),
            FieldKind::UInt { lens, .. } => lens.get(object).to_string(),
            FieldKind::Double { lens, .. } => lens.get(object).to_string(),
            FieldKind::Bool(lens) => lens.get(object).to_string(),
            FieldKind::YesNo(lens) => format_yesno(*lens.get(object)),
            FieldKind::BoolFlag { lens, mask } => format_yesno(lens.get(object) & mask == *mask),
            FieldKind::CharArray { lens, .. } | FieldKind::StringField { lens, .. } => {
                lens.get(object).clone()
            }
            FieldKind::StringList(lens) => lens.get(object).join(","),
            FieldKind::SockAddr { lens, .. } => format_sockaddr(lens.get(object).as_ref()),
            FieldKind::Acl { lens, sense } => lens
                .get(object)
                .rules()
                .iter()
                .filter(|rule| rule.sense == *sense)
                .map(|rule| rule.to_string())
                .collect::<Vec<_>>()
                .join(","),
            FieldKind::Codec { lens, allow: true } => lens.get(object).to_string(),
            FieldKind::Codec { allow: false, .. } | FieldKind::Noop => return None,
            FieldKind::Custom(custom) => return custom.format.as_ref().map(|f| f(object)),
        };
        Some(Ok(text))
    }

    fn list(&self, object: &dyn SorceryObject, name: &str) -> Option<Result<ObjectSet, FieldError>> {
        let Some(object) = object.as_any().downcast_ref::<T>() else {
            return Some(Err(wrong_type::<T>()));
        };

        match &self.kind {
            FieldKind::Acl { lens, sense } => Some(Ok(lens
                .get(object)
                .rules()
                .iter()
                .filter(|rule| rule.sense == *sense)
                .map(|rule| (name.to_string(), rule.to_string()))
                .collect())),
            FieldKind::Custom(custom) => custom.list.as_ref().map(|f| f(object)),
            _ => None,
        }
    }
}

/// Builds the descriptor for an exact-name field.
pub(crate) fn typed_descriptor<T: SorceryObject>(
    spec: FieldSpec<T>,
) -> Result<FieldDescriptor, String> {
    spec.kind.validate()?;
    let kind = spec.kind.name();
    let clamp = spec.options.out_of_range == RangePolicy::Clamp;
    Ok(FieldDescriptor {
        name: spec.name,
        matcher: None,
        default: spec.default,
        options: spec.options,
        alias: spec.alias,
        kind,
        handler: Box::new(TypedField {
            kind: spec.kind,
            clamp,
        }),
    })
}

/// Builds the descriptor for a field owning every name matching `pattern`.
pub(crate) fn regex_descriptor<T: SorceryObject>(
    pattern: &str,
    custom: Custom<T>,
) -> Result<FieldDescriptor, regex::Error> {
    let matcher = Regex::new(pattern)?;
    Ok(FieldDescriptor {
        name: pattern.to_string(),
        matcher: Some(matcher),
        default: None,
        options: FieldOptions::default(),
        alias: false,
        kind: "custom",
        handler: Box::new(TypedField {
            kind: FieldKind::Custom(custom),
            clamp: false,
        }),
    })
}

struct ExtendedFields;

impl FieldHandler for ExtendedFields {
    fn parse(
        &self,
        object: &mut dyn SorceryObject,
        name: &str,
        value: &str,
    ) -> Result<(), FieldError> {
        object.details_mut().set_extended(name, value);
        Ok(())
    }

    fn format(&self, _object: &dyn SorceryObject) -> Option<Result<String, FieldError>> {
        None
    }

    fn list(&self, object: &dyn SorceryObject, _name: &str) -> Option<Result<ObjectSet, FieldError>> {
        Some(Ok(object.details().extended_fields().clone()))
    }
}

/// Regex field carrying `@name` values opaquely on the object details.
pub(crate) fn extended_fields_descriptor() -> FieldDescriptor {
    let pattern = format!("^{}", EXTENDED_PREFIX);
    FieldDescriptor {
        matcher: Regex::new(&pattern).ok(),
        name: pattern,
        default: None,
        options: FieldOptions::default(),
        alias: false,
        kind: "extended",
        handler: Box::new(ExtendedFields),
    }
}
