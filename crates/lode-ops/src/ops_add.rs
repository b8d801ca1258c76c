//! Operation: add a dependency to Lode.toml, then relock.

use std::path::{Path, PathBuf};

use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, Value};

use lode_core::config::GlobalConfig;
use lode_core::constraint::VersionConstraint;
use lode_core::marker::EnvironmentMarker;
use lode_core::package::PackageName;
use lode_util::errors::{LodeError, LodeResult};

use crate::ops_lock::{relock, Refresh};
use crate::project::{Project, MANIFEST_FILE};

/// Options for `lode add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// `NAME` or `NAME@CONSTRAINT`.
    pub spec: String,
    pub path: Option<PathBuf>,
    pub git: Option<String>,
    pub rev: Option<String>,
    pub markers: Option<String>,
    pub extras: Vec<String>,
}

/// Add a dependency and relock. The manifest is restored if resolution
/// fails. A registry dependency added without a constraint is pinned to
/// `^<resolved version>`.
pub async fn add(project_root: &Path, config: &GlobalConfig, opts: &AddOptions) -> miette::Result<()> {
    let manifest_path = project_root.join(MANIFEST_FILE);
    let original = std::fs::read(&manifest_path).map_err(LodeError::Io)?;

    let name = add_dependency(&manifest_path, opts)?;
    match add_and_lock(project_root, config, opts, &name).await {
        Ok(()) => Ok(()),
        Err(e) => {
            lode_util::fs::atomic_write(&manifest_path, &original).map_err(LodeError::Io)?;
            Err(e.into())
        }
    }
}

async fn add_and_lock(
    project_root: &Path,
    config: &GlobalConfig,
    opts: &AddOptions,
    name: &PackageName,
) -> LodeResult<()> {
    let project = Project::load(project_root, config)?;
    let sources = project.sources()?;
    let lock = relock(&project, &sources, &Refresh::Keep).await?;

    let unconstrained = split_spec(&opts.spec).1.is_none();
    let pinned = match lock.get(name) {
        Some(entry) if unconstrained && opts.path.is_none() && opts.git.is_none() => {
            let constraint = format!("^{}", entry.version);
            set_constraint(&project.manifest_path(), name, &constraint)?;
            let project = Project::load(project_root, config)?;
            relock(&project, &sources, &Refresh::Keep).await?;
            Some(constraint)
        }
        _ => None,
    };

    let shown = pinned
        .or_else(|| split_spec(&opts.spec).1.map(str::to_string))
        .unwrap_or_else(|| "*".to_string());
    lode_util::progress::status("Added", &format!("{name} ({shown})"));
    Ok(())
}

/// `NAME@CONSTRAINT` into its parts.
fn split_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('@') {
        Some((name, constraint)) if !constraint.trim().is_empty() => {
            (name.trim(), Some(constraint.trim()))
        }
        Some((name, _)) => (name.trim(), None),
        None => (spec.trim(), None),
    }
}

fn manifest_error(message: impl Into<String>) -> LodeError {
    LodeError::Manifest {
        message: message.into(),
    }
}

/// Write the dependency described by `opts` into the manifest at
/// `manifest_path`, keeping the rest of the file as it is. An existing
/// entry for the same package is replaced.
pub fn add_dependency(manifest_path: &Path, opts: &AddOptions) -> LodeResult<PackageName> {
    let (raw_name, constraint) = split_spec(&opts.spec);
    let name = PackageName::new(raw_name).map_err(|e| manifest_error(e.to_string()))?;
    if let Some(text) = constraint {
        VersionConstraint::parse(text).map_err(|e| manifest_error(format!("{name}: {e}")))?;
    }
    if let Some(text) = &opts.markers {
        EnvironmentMarker::parse(text).map_err(|e| manifest_error(format!("{name}: {e}")))?;
    }
    if opts.path.is_some() && opts.git.is_some() {
        return Err(manifest_error("`--path` and `--git` are mutually exclusive"));
    }
    if opts.rev.is_some() && opts.git.is_none() {
        return Err(manifest_error("`--rev` requires `--git`"));
    }

    let mut doc = read_document(manifest_path)?;
    ensure_table(&mut doc, "dependencies");
    let deps = dependencies_table(&mut doc)?;
    if let Some(existing) = find_key(deps, &name) {
        deps.remove(&existing);
    }

    let detailed = opts.path.is_some()
        || opts.git.is_some()
        || opts.markers.is_some()
        || !opts.extras.is_empty();
    let value = if detailed {
        let mut table = InlineTable::new();
        if let Some(text) = constraint {
            table.insert("version", Value::from(text));
        }
        if let Some(path) = &opts.path {
            table.insert("path", Value::from(path.to_string_lossy().into_owned()));
        }
        if let Some(url) = &opts.git {
            table.insert("git", Value::from(url.as_str()));
        }
        if let Some(rev) = &opts.rev {
            table.insert("rev", Value::from(rev.as_str()));
        }
        if !opts.extras.is_empty() {
            let extras: Array = opts.extras.iter().map(String::as_str).collect();
            table.insert("extras", Value::Array(extras));
        }
        if let Some(markers) = &opts.markers {
            table.insert("markers", Value::from(markers.as_str()));
        }
        Value::InlineTable(table)
    } else {
        Value::from(constraint.unwrap_or("*"))
    };
    deps.insert(raw_name, Item::Value(value));

    write_document(manifest_path, &doc)?;
    Ok(name)
}

/// Replace the version constraint of an existing dependency.
fn set_constraint(manifest_path: &Path, name: &PackageName, constraint: &str) -> LodeResult<()> {
    let mut doc = read_document(manifest_path)?;
    let deps = dependencies_table(&mut doc)?;
    let key = find_key(deps, name)
        .ok_or_else(|| manifest_error(format!("dependency `{name}` not found")))?;
    match deps.get_mut(&key) {
        Some(Item::Value(Value::InlineTable(table))) => {
            table.insert("version", Value::from(constraint));
        }
        Some(item) => *item = Item::Value(Value::from(constraint)),
        None => {}
    }
    write_document(manifest_path, &doc)
}

pub(crate) fn read_document(path: &Path) -> LodeResult<DocumentMut> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| manifest_error(format!("Failed to read {}: {e}", path.display())))?;
    content
        .parse()
        .map_err(|e| manifest_error(format!("Failed to parse {MANIFEST_FILE}: {e}")))
}

pub(crate) fn write_document(path: &Path, doc: &DocumentMut) -> LodeResult<()> {
    lode_util::fs::atomic_write(path, doc.to_string().as_bytes())?;
    Ok(())
}

pub(crate) fn dependencies_table(doc: &mut DocumentMut) -> LodeResult<&mut Table> {
    match doc.get_mut("dependencies") {
        Some(Item::Table(table)) => Ok(table),
        Some(_) => Err(manifest_error("`dependencies` must be a table")),
        None => Err(manifest_error("no [dependencies] table")),
    }
}

/// The key naming `name`, whatever its spelling.
pub(crate) fn find_key(table: &Table, name: &PackageName) -> Option<String> {
    table
        .iter()
        .map(|(key, _)| key)
        .find(|key| PackageName::new(key).ok().as_ref() == Some(name))
        .map(str::to_string)
}

fn ensure_table(doc: &mut DocumentMut, key: &str) {
    if !doc.contains_key(key) {
        doc.insert(key, Item::Table(Table::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"[package]
name = "app"
version = "0.1.0"

# runtime deps
[dependencies]
requests = "^2.31"
"#;

    fn manifest(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(MANIFEST_FILE);
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    fn opts(spec: &str) -> AddOptions {
        AddOptions {
            spec: spec.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn adds_short_form_and_keeps_comments() {
        let (_tmp, path) = manifest(MANIFEST);
        add_dependency(&path, &opts("httpx@>=0.27, <1.0")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# runtime deps"));
        assert!(content.contains("requests = \"^2.31\""));
        assert!(content.contains("httpx = \">=0.27, <1.0\""));
    }

    #[test]
    fn creates_missing_table() {
        let (_tmp, path) = manifest("[package]\nname = \"app\"\nversion = \"0.1.0\"\n");
        add_dependency(&path, &opts("six")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[dependencies]"));
        assert!(content.contains("six = \"*\""));
    }

    #[test]
    fn detailed_entry_is_an_inline_table() {
        let (_tmp, path) = manifest(MANIFEST);
        let options = AddOptions {
            spec: "colorama@>=0.4".into(),
            markers: Some("os == \"windows\"".into()),
            extras: vec!["ansi".into()],
            ..Default::default()
        };
        add_dependency(&path, &options).unwrap();
        let manifest = lode_core::manifest::Manifest::load(&path).unwrap();
        let deps = manifest.direct_dependencies(Path::new(".")).unwrap();
        let colorama = deps.iter().find(|d| d.name.as_str() == "colorama").unwrap();
        assert!(!colorama.marker.is_any());
        assert!(colorama.extras.contains("ansi"));
    }

    #[test]
    fn replaces_existing_spelling() {
        let (_tmp, path) = manifest(MANIFEST);
        add_dependency(&path, &opts("Requests@^2.32")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("^2.31"));
        assert!(content.contains("Requests = \"^2.32\""));
    }

    #[test]
    fn rejects_bad_input_without_touching_the_file() {
        let (_tmp, path) = manifest(MANIFEST);
        assert!(add_dependency(&path, &opts("bad name")).is_err());
        assert!(add_dependency(&path, &opts("ok@>>1")).is_err());
        let options = AddOptions {
            spec: "tool".into(),
            rev: Some("v1".into()),
            ..Default::default()
        };
        assert!(add_dependency(&path, &options).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MANIFEST);
    }

    #[test]
    fn set_constraint_updates_inline_tables() {
        let (_tmp, path) = manifest(
            "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n[dependencies]\nhttp = { extras = [\"socks\"] }\n",
        );
        set_constraint(&path, &PackageName::new("http").unwrap(), "^1.2.0").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("version = \"^1.2.0\""));
        assert!(content.contains("extras"));
    }
}
