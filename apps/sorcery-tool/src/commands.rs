//! Subcommand implementations. Each returns the text to print.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use sorcery_core::conf::{Category, ConfFile};
use sorcery_core::mapping::MappingDirective;
use sorcery_core::{changeset, ObjectSet, Registry};

fn load(path: &Path) -> Result<ConfFile> {
    ConfFile::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn parse_criteria(criteria: &[String]) -> Result<ObjectSet> {
    let mut set = ObjectSet::new();
    for criterion in criteria {
        let Some((field, value)) = criterion.split_once('=') else {
            bail!("criteria '{}' is not field=value", criterion);
        };
        set.push(field.trim(), value.trim());
    }
    Ok(set)
}

/// Object sets of the non-template sections of `path`.
pub fn dump(path: &Path, section: Option<&str>, criteria: &[String], as_json: bool) -> Result<String> {
    let file = load(path)?;
    let criteria = parse_criteria(criteria)?;
    let selected: Vec<&Category> = file
        .objects()
        .filter(|c| section.map_or(true, |name| c.name() == name))
        .filter(|c| c.variables().matches(&criteria))
        .collect();
    tracing::debug!("{} of {} sections selected", selected.len(), file.categories().len());

    if as_json {
        let objects: Map<String, Value> = selected
            .iter()
            .map(|c| (c.name().to_string(), c.variables().to_json()))
            .collect();
        return Ok(serde_json::to_string_pretty(&objects)?);
    }

    let mut out = String::new();
    for category in selected {
        writeln!(out, "[{}]", category.name())?;
        write!(out, "{}", category.variables())?;
        writeln!(out)?;
    }
    Ok(out)
}

/// Sections added, changed and removed between `old` and `new`.
pub fn diff(old: &Path, new: &Path, as_json: bool) -> Result<String> {
    let old = load(old)?;
    let new = load(new)?;

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for category in new.objects() {
        match old.section(category.name()) {
            None => added.push((category.name(), category.variables().clone())),
            Some(before) => {
                if let Some(changes) = changeset(before, category.variables()) {
                    changed.push((category.name(), changes));
                }
            }
        }
    }
    let removed: Vec<&str> = old
        .objects()
        .map(Category::name)
        .filter(|name| new.category(name).map_or(true, |c| c.is_template()))
        .collect();

    if as_json {
        let to_map = |sets: &[(&str, ObjectSet)]| -> Map<String, Value> {
            sets.iter()
                .map(|(name, set)| (name.to_string(), set.to_json()))
                .collect()
        };
        let report = json!({
            "added": to_map(&added),
            "changed": to_map(&changed),
            "removed": removed,
        });
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut out = String::new();
    for (name, set) in &added {
        writeln!(out, "+ [{}]", name)?;
        for (field, value) in set.iter() {
            writeln!(out, "+   {} = {}", field, value)?;
        }
    }
    for (name, set) in &changed {
        writeln!(out, "~ [{}]", name)?;
        for (field, value) in set.iter() {
            writeln!(out, "~   {} = {}", field, value)?;
        }
    }
    for name in &removed {
        writeln!(out, "- [{}]", name)?;
    }
    if out.is_empty() {
        out.push_str("no changes\n");
    }
    Ok(out)
}

/// Backend chains per module section of a mapping file, checked against
/// the backends `registry` knows.
pub fn mappings(path: &Path, section: Option<&str>, registry: &Registry) -> Result<String> {
    let file = load(path)?;
    let sections: Vec<&Category> = file
        .objects()
        .filter(|c| section.map_or(true, |name| c.name() == name))
        .collect();
    if let (Some(name), true) = (section, sections.is_empty()) {
        bail!("{} has no section '{}'", path.display(), name);
    }

    let mut out = String::new();
    for category in sections {
        writeln!(out, "[{}]", category.name())?;
        let mut position = 0;
        for (name, value) in category.variables().iter() {
            let Some(directive) = MappingDirective::parse(name, value) else {
                tracing::warn!("Malformed mapping '{} = {}'", name, value);
                writeln!(out, "  ?  {} = {} (malformed)", name, value)?;
                continue;
            };
            position += 1;
            write!(out, "  {}. {} -> {}", position, directive.type_name, directive.backend)?;
            if !directive.args.is_empty() {
                write!(out, " ({})", directive.args)?;
            }
            if directive.caching {
                write!(out, " [cache]")?;
            }
            if !registry.has_backend(&directive.backend) {
                write!(out, " (unknown backend)")?;
            }
            writeln!(out)?;
        }
    }
    Ok(out)
}
