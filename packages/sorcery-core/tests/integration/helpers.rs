//! Shared fixtures: a richly typed `widget` object and a backend that counts
//! load calls.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sorcery_core::backend::memory::MemoryBackend;
use sorcery_core::fields::{AccessList, AclSense, CodecPreferences, Custom, PortPolicy};
use sorcery_core::{
    lens, Backend, BackendArgs, BackendFactory, FieldKind, FieldSpec, ObjectDetails, ObjectRef,
    ObjectSet, ObjectType, OpenContext, Registry, RegistryConfig, Result, Sorcery, SorceryObject,
    TypeSpec,
};

#[derive(Debug, Default, Clone)]
pub struct Widget {
    pub details: ObjectDetails,
    pub count: i32,
    pub ratio: f64,
    pub enabled: bool,
    pub flags: u32,
    pub label: String,
    pub tags: Vec<String>,
    pub bind: Option<SocketAddr>,
    pub acl: AccessList,
    pub codecs: CodecPreferences,
    pub extra: Vec<(String, String)>,
}

impl SorceryObject for Widget {
    fn details(&self) -> &ObjectDetails {
        &self.details
    }
    fn details_mut(&mut self) -> &mut ObjectDetails {
        &mut self.details
    }
}

#[derive(Debug, Default)]
pub struct Gizmo {
    pub details: ObjectDetails,
    pub size: u32,
}

impl SorceryObject for Gizmo {
    fn details(&self) -> &ObjectDetails {
        &self.details
    }
    fn details_mut(&mut self) -> &mut ObjectDetails {
        &mut self.details
    }
}

pub const LOUD: u32 = 0x1;

/// Registers every `widget` field on `sorcery`.
pub fn register_widget_fields(sorcery: &Sorcery) {
    let fields = vec![
        FieldSpec::new("count", FieldKind::int(lens!(Widget, count))).default_value("5"),
        FieldSpec::new("ratio", FieldKind::double_range(lens!(Widget, ratio), 0.0, 1.0))
            .default_value("0.5"),
        FieldSpec::new("enabled", FieldKind::YesNo(lens!(Widget, enabled))).default_value("yes"),
        FieldSpec::new(
            "loud",
            FieldKind::BoolFlag {
                lens: lens!(Widget, flags),
                mask: LOUD,
            },
        )
        .default_value("no"),
        FieldSpec::new("label", FieldKind::string(lens!(Widget, label))),
        FieldSpec::new("tags", FieldKind::StringList(lens!(Widget, tags))),
        FieldSpec::new(
            "bind",
            FieldKind::SockAddr {
                lens: lens!(Widget, bind),
                port: PortPolicy::Optional,
            },
        ),
        FieldSpec::new(
            "permit",
            FieldKind::Acl {
                lens: lens!(Widget, acl),
                sense: AclSense::Permit,
            },
        ),
        FieldSpec::new(
            "deny",
            FieldKind::Acl {
                lens: lens!(Widget, acl),
                sense: AclSense::Deny,
            },
        ),
        FieldSpec::new(
            "allow",
            FieldKind::Codec {
                lens: lens!(Widget, codecs),
                allow: true,
            },
        ),
        FieldSpec::new(
            "disallow",
            FieldKind::Codec {
                lens: lens!(Widget, codecs),
                allow: false,
            },
        ),
        FieldSpec::new("type", FieldKind::Noop),
    ];
    for field in fields {
        sorcery.register_field("widget", field).unwrap();
    }

    let extra = Custom::new(|widget: &mut Widget, name: &str, value: &str| {
        widget.extra.retain(|(n, _)| n != name);
        widget.extra.push((name.to_string(), value.to_string()));
        Ok(())
    })
    .list(|widget: &Widget| Ok(widget.extra.iter().cloned().collect::<ObjectSet>()));
    sorcery
        .register_regex_field("widget", "^x-", extra)
        .unwrap();
}

/// Fresh instance named `name` with `widget` and `gizmo` registered but
/// not mapped.
pub fn widget_sorcery(name: &str) -> Arc<Sorcery> {
    let registry = Registry::new(RegistryConfig::default());
    let sorcery = registry.open(name).unwrap();
    sorcery
        .register_type(TypeSpec::<Widget>::with_default("widget"))
        .unwrap();
    register_widget_fields(&sorcery);
    sorcery
        .register_type(TypeSpec::<Gizmo>::with_default("gizmo"))
        .unwrap();
    sorcery
        .register_field("gizmo", FieldSpec::new("size", FieldKind::uint(lens!(Gizmo, size))))
        .unwrap();
    sorcery
}

/// `widget` instance mapped to one memory backend.
pub fn mapped_widget_sorcery(name: &str) -> Arc<Sorcery> {
    let sorcery = widget_sorcery(name);
    sorcery
        .apply_mapping("widget", "memory", "", false)
        .unwrap();
    sorcery
}

/// Allocates a widget, lets `edit` adjust it, and shares it.
pub fn widget(sorcery: &Sorcery, id: &str, edit: impl FnOnce(&mut Widget)) -> ObjectRef {
    let mut object = sorcery.alloc_as::<Widget>("widget", Some(id)).unwrap();
    edit(&mut *object);
    Arc::new(*object)
}

/// Load counters shared by the backends of one counting backend kind.
#[derive(Debug, Default)]
pub struct LoadCounts {
    pub loads: AtomicUsize,
    pub reloads: AtomicUsize,
    pub force_reloads: AtomicUsize,
}

impl LoadCounts {
    pub fn get(&self) -> (usize, usize, usize) {
        (
            self.loads.load(Ordering::SeqCst),
            self.reloads.load(Ordering::SeqCst),
            self.force_reloads.load(Ordering::SeqCst),
        )
    }
}

/// Memory store that records load calls.
pub struct CountingBackend {
    store: MemoryBackend,
    counts: Arc<LoadCounts>,
}

impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn create(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        self.store.create(ty, object)
    }

    fn retrieve_id(&self, ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>> {
        self.store.retrieve_id(ty, id)
    }

    fn update(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        self.store.update(ty, object)
    }

    fn delete(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        self.store.delete(ty, object)
    }

    fn load(&self, _ty: &ObjectType) -> Result<()> {
        self.counts.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reload(&self, _ty: &ObjectType) -> Result<()> {
        self.counts.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn force_reload(&self, _ty: &ObjectType) -> Result<()> {
        self.counts.force_reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Registers a counting backend on the instance's registry under a fresh
/// name and returns its counters.
pub fn counting_backend(sorcery: &Sorcery, name: &'static str) -> Arc<LoadCounts> {
    struct Named(&'static str, Arc<LoadCounts>);

    impl BackendFactory for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn open(&self, _context: &OpenContext<'_>, _args: &BackendArgs) -> Result<Box<dyn Backend>> {
            Ok(Box::new(CountingBackend {
                store: MemoryBackend::new(),
                counts: Arc::clone(&self.1),
            }))
        }
    }

    let counts = Arc::new(LoadCounts::default());
    sorcery
        .registry()
        .register_backend(Arc::new(Named(name, Arc::clone(&counts))))
        .unwrap();
    counts
}
