//! Typed registration parameters and their type-erased callbacks.

use std::sync::Arc;

use crate::error::{Result, SorceryError};
use crate::object::SorceryObject;
use crate::objectset::ObjectSet;

pub(crate) type AllocFn = Box<dyn Fn(&str) -> Box<dyn SorceryObject> + Send + Sync>;
pub(crate) type TransformFn = Box<dyn Fn(&ObjectSet) -> Option<ObjectSet> + Send + Sync>;
pub(crate) type ApplyFn = Box<dyn Fn(&mut dyn SorceryObject) -> Result<()> + Send + Sync>;
pub(crate) type CopyFn =
    Arc<dyn Fn(&dyn SorceryObject, &mut dyn SorceryObject) -> Result<()> + Send + Sync>;
pub(crate) type DiffFn =
    Arc<dyn Fn(&dyn SorceryObject, &dyn SorceryObject) -> Result<Option<ObjectSet>> + Send + Sync>;

/// Registration parameters for an object type backed by the Rust type `T`.
///
/// ```ignore
/// let spec = TypeSpec::<Widget>::with_default("widget").reloadable(false);
/// ```
pub struct TypeSpec<T> {
    pub(crate) name: String,
    pub(crate) hidden: bool,
    pub(crate) reloadable: bool,
    alloc: Box<dyn Fn(&str) -> T + Send + Sync>,
    transform: Option<TransformFn>,
    apply: Option<Box<dyn Fn(&mut T) -> std::result::Result<(), String> + Send + Sync>>,
}

impl<T: SorceryObject> TypeSpec<T> {
    /// Creates a visible, reloadable type whose blank objects come from
    /// `alloc`, which receives the id being allocated.
    pub fn new(name: impl Into<String>, alloc: impl Fn(&str) -> T + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            reloadable: true,
            alloc: Box::new(alloc),
            transform: None,
            apply: None,
        }
    }

    /// Hides the type from introspection listings.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Non-reloadable types keep their current state on reload.
    pub fn reloadable(mut self, reloadable: bool) -> Self {
        self.reloadable = reloadable;
        self
    }

    /// Rewrites an incoming object set before it is applied. Returning
    /// `None` keeps the original set.
    pub fn transform(
        mut self,
        transform: impl Fn(&ObjectSet) -> Option<ObjectSet> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Validates an object after an object set has been applied to it.
    pub fn apply(
        mut self,
        apply: impl Fn(&mut T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.apply = Some(Box::new(apply));
        self
    }

    pub(crate) fn into_parts(self) -> (AllocFn, Option<TransformFn>, Option<ApplyFn>) {
        let alloc = self.alloc;
        let alloc: AllocFn = Box::new(move |id: &str| Box::new(alloc(id)) as Box<dyn SorceryObject>);

        let apply = self.apply.map(|apply| -> ApplyFn {
            Box::new(move |object: &mut dyn SorceryObject| {
                let id = object.details().id().to_string();
                let type_name = object.details().type_name().to_string();
                let typed = object
                    .as_any_mut()
                    .downcast_mut::<T>()
                    .ok_or_else(mismatch::<T>)?;
                apply(typed).map_err(|reason| SorceryError::ApplyRejected {
                    type_name,
                    id,
                    reason,
                })
            })
        });

        (alloc, self.transform, apply)
    }
}

impl<T: SorceryObject + Default> TypeSpec<T> {
    /// Type whose blank objects are `T::default()`.
    pub fn with_default(name: impl Into<String>) -> Self {
        Self::new(name, |_| T::default())
    }
}

fn mismatch<T>() -> SorceryError {
    SorceryError::TypeMismatch {
        expected: std::any::type_name::<T>().to_string(),
        got: "another object type".to_string(),
    }
}

pub(crate) fn erase_copy<T: SorceryObject>(
    copy: impl Fn(&T, &mut T) + Send + Sync + 'static,
) -> CopyFn {
    Arc::new(
        move |source: &dyn SorceryObject, target: &mut dyn SorceryObject| {
            let source = source.as_any().downcast_ref::<T>().ok_or_else(mismatch::<T>)?;
            let target = target
                .as_any_mut()
                .downcast_mut::<T>()
                .ok_or_else(mismatch::<T>)?;
            copy(source, target);
            Ok(())
        },
    )
}

pub(crate) fn erase_diff<T: SorceryObject>(
    diff: impl Fn(&T, &T) -> Option<ObjectSet> + Send + Sync + 'static,
) -> DiffFn {
    Arc::new(
        move |original: &dyn SorceryObject, modified: &dyn SorceryObject| {
            let original = original
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(mismatch::<T>)?;
            let modified = modified
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(mismatch::<T>)?;
            Ok(diff(original, modified))
        },
    )
}
