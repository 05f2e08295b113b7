//! Read-only backend serving objects from a structured text file.
//!
//! Each non-template section becomes one object whose id is the section
//! name. Loads build a complete new snapshot and swap it in atomically, so
//! readers never see a partially loaded file.
//!
//! Mapping arguments: `<file>[,criteria=<field>=<value>]...[,criteria_case=sensitive|insensitive]`
//! `[,integrity=file|object][,explicit_name=<section>][,single_object=yes][,buckets=<n>]`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use regex::Regex;
use sorcery_core::backend::memory::filter_by_fields;
use sorcery_core::conf::{self, ConfFile};
use sorcery_core::fields::parse_bool;
use sorcery_core::io_utils::{classify_io_error, retry_io_operation};
use sorcery_core::{
    Backend, BackendArgs, BackendFactory, ObjectRef, ObjectSet, ObjectType, OpenContext, Result,
    SorceryError,
};

/// What a bad section does to a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integrity {
    /// Any bad section aborts the load and the previous snapshot stays.
    #[default]
    File,
    /// Bad sections are skipped; their previous object, if any, is kept.
    Object,
}

/// Parsed mapping options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFileOptions {
    /// Field values a section must carry to become an object
    pub criteria: ObjectSet,
    /// Whether criteria values compare case sensitively
    pub criteria_case_sensitive: bool,
    pub integrity: Integrity,
    /// Only this section becomes an object
    pub explicit_name: Option<String>,
    /// Fail the load when more than one object results
    pub single_object: bool,
    /// Capacity hint; accepted for compatibility
    pub buckets: Option<usize>,
}

impl Default for ConfigFileOptions {
    fn default() -> Self {
        Self {
            criteria: ObjectSet::new(),
            criteria_case_sensitive: true,
            integrity: Integrity::File,
            explicit_name: None,
            single_object: false,
            buckets: None,
        }
    }
}

impl ConfigFileOptions {
    /// Reads the `key=value` options of a mapping. Unknown options are
    /// refused.
    pub fn from_args(args: &BackendArgs) -> std::result::Result<Self, String> {
        let mut options = Self::default();
        for (key, value) in args.options() {
            match key.to_ascii_lowercase().as_str() {
                "criteria" => {
                    let (field, expected) = value
                        .split_once('=')
                        .ok_or_else(|| format!("criteria '{}' is not field=value", value))?;
                    options.criteria.push(field.trim(), expected.trim());
                }
                "criteria_case" => {
                    options.criteria_case_sensitive = match value.to_ascii_lowercase().as_str() {
                        "sensitive" => true,
                        "insensitive" => false,
                        other => return Err(format!("unknown criteria_case '{}'", other)),
                    };
                }
                "integrity" => {
                    options.integrity = match value.to_ascii_lowercase().as_str() {
                        "file" => Integrity::File,
                        "object" => Integrity::Object,
                        other => return Err(format!("unknown integrity '{}'", other)),
                    };
                }
                "explicit_name" => options.explicit_name = Some(value.to_string()),
                "single_object" => {
                    options.single_object = parse_bool(value).map_err(|e| e.to_string())?;
                }
                "buckets" => {
                    let buckets = value
                        .parse::<usize>()
                        .ok()
                        .filter(|b| *b > 0)
                        .ok_or_else(|| format!("buckets '{}' is not a positive number", value))?;
                    options.buckets = Some(buckets);
                }
                other => return Err(format!("unsupported option '{}'", other)),
            }
        }
        Ok(options)
    }
}

/// Objects loaded from one configuration file.
pub struct ConfigFileBackend {
    path: PathBuf,
    options: ConfigFileOptions,
    objects: ArcSwap<BTreeMap<String, ObjectRef>>,
    /// crc32 of the contents behind the current snapshot
    signature: Mutex<Option<u32>>,
    io_max_retries: u32,
    io_retry_delay_ms: u64,
}

impl ConfigFileBackend {
    pub fn new(path: impl Into<PathBuf>, options: ConfigFileOptions) -> Self {
        Self {
            path: path.into(),
            options,
            objects: ArcSwap::from_pointee(BTreeMap::new()),
            signature: Mutex::new(None),
            io_max_retries: 0,
            io_retry_delay_ms: 0,
        }
    }

    /// Retry policy for transient read failures.
    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.io_max_retries = max_retries;
        self.io_retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ConfigFileOptions {
        &self.options
    }

    /// Number of objects in the current snapshot.
    pub fn len(&self) -> usize {
        self.objects.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_source(&self) -> Result<String> {
        let context = format!("Failed to read {}", self.path.display());
        retry_io_operation(
            || std::fs::read_to_string(&self.path).map_err(|e| classify_io_error(e, &context)),
            self.io_max_retries,
            self.io_retry_delay_ms,
            "config file read",
        )
    }

    /// Reads the file and swaps in a new snapshot unless the contents are
    /// unchanged and `force` is not set.
    fn refresh(&self, ty: &ObjectType, force: bool) -> Result<()> {
        let text = self.read_source()?;
        let signature = crc32fast::hash(text.as_bytes());

        let mut current = self.signature.lock();
        if !force && *current == Some(signature) {
            tracing::debug!(
                "Config file {} unchanged, keeping {} '{}' objects",
                self.path.display(),
                self.len(),
                ty.name()
            );
            return Ok(());
        }

        let file = conf::parse(&text)?;
        let objects = self.build(ty, &file)?;
        if self.options.single_object && objects.len() > 1 {
            return Err(SorceryError::LoadRejected {
                backend: "config".to_string(),
                reason: format!(
                    "{} yields {} '{}' objects but only one is allowed",
                    self.path.display(),
                    objects.len(),
                    ty.name()
                ),
            });
        }

        tracing::debug!(
            "Loaded {} '{}' objects from {}",
            objects.len(),
            ty.name(),
            self.path.display()
        );
        self.objects.store(Arc::new(objects));
        *current = Some(signature);
        Ok(())
    }

    fn build(&self, ty: &ObjectType, file: &ConfFile) -> Result<BTreeMap<String, ObjectRef>> {
        let previous = self.objects.load();
        let mut objects = BTreeMap::new();

        for category in file.objects() {
            let id = category.name();
            if self
                .options
                .explicit_name
                .as_deref()
                .is_some_and(|name| name != id)
            {
                continue;
            }
            let set = category.variables();
            if !set.matches_with(&self.options.criteria, self.options.criteria_case_sensitive) {
                continue;
            }

            match ty.object_from_set(id, set) {
                Ok(object) => {
                    objects.insert(id.to_string(), object);
                }
                Err(err) => match self.options.integrity {
                    Integrity::File => {
                        tracing::warn!(
                            "Section '{}' of {} rejected, keeping previous contents: {}",
                            id,
                            self.path.display(),
                            err
                        );
                        return Err(err);
                    }
                    Integrity::Object => {
                        tracing::warn!(
                            "Skipping section '{}' of {}: {}",
                            id,
                            self.path.display(),
                            err
                        );
                        if let Some(old) = previous.get(id) {
                            objects.insert(id.to_string(), Arc::clone(old));
                        }
                    }
                },
            }
        }
        Ok(objects)
    }
}

impl Backend for ConfigFileBackend {
    fn name(&self) -> &str {
        "config"
    }

    fn create(&self, _ty: &ObjectType, _object: &ObjectRef) -> Result<()> {
        Err(self.unsupported("create"))
    }

    fn retrieve_id(&self, _ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>> {
        Ok(self.objects.load().get(id).cloned())
    }

    fn retrieve_multiple(
        &self,
        ty: &ObjectType,
        fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        let objects = self.objects.load();
        filter_by_fields(ty, objects.values().cloned().collect(), fields)
    }

    fn retrieve_regex(&self, _ty: &ObjectType, pattern: &str) -> Result<Vec<ObjectRef>> {
        let regex = Regex::new(pattern).map_err(|e| SorceryError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self
            .objects
            .load()
            .iter()
            .filter(|(id, _)| regex.is_match(id))
            .map(|(_, object)| Arc::clone(object))
            .collect())
    }

    fn retrieve_prefix(&self, _ty: &ObjectType, prefix: &str) -> Result<Vec<ObjectRef>> {
        Ok(self
            .objects
            .load()
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(_, object)| Arc::clone(object))
            .collect())
    }

    fn update(&self, _ty: &ObjectType, _object: &ObjectRef) -> Result<()> {
        Err(self.unsupported("update"))
    }

    fn delete(&self, _ty: &ObjectType, _object: &ObjectRef) -> Result<()> {
        Err(self.unsupported("delete"))
    }

    fn load(&self, ty: &ObjectType) -> Result<()> {
        self.refresh(ty, false)
    }

    fn force_reload(&self, ty: &ObjectType) -> Result<()> {
        self.refresh(ty, true)
    }
}

/// Factory for [`ConfigFileBackend`], registered as `config`.
#[derive(Debug, Default)]
pub struct ConfigFileFactory;

impl BackendFactory for ConfigFileFactory {
    fn name(&self) -> &str {
        "config"
    }

    fn open(&self, context: &OpenContext<'_>, args: &BackendArgs) -> Result<Box<dyn Backend>> {
        let refuse = |reason: String| SorceryError::BackendOpen {
            backend: "config".to_string(),
            type_name: context.type_name.to_string(),
            reason,
        };

        let file = args
            .first()
            .ok_or_else(|| refuse("a configuration file name is required".to_string()))?;
        let options = ConfigFileOptions::from_args(args).map_err(refuse)?;
        let path = context.config.resolve(file);
        if let Some(buckets) = options.buckets {
            tracing::debug!("Ignoring buckets={} for {}", buckets, path.display());
        }

        tracing::debug!(
            "Opened config backend for '{}' on {}",
            context.type_name,
            path.display()
        );
        Ok(Box::new(
            ConfigFileBackend::new(path, options)
                .with_retries(context.config.io_max_retries, context.config.io_retry_delay_ms),
        ))
    }
}
