use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use lode_util::errors::{LodeError, LodeResult};

use crate::dependency::{Dependency, DependencySpec};
use crate::marker::TargetEnvironment;
use crate::version::Version;

/// The parsed representation of a `Lode.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub package: PackageMetadata,

    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    /// Target attributes used when evaluating markers during resolution.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

/// Package identity from the `[package]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    /// Runtime identity, exposed to markers as `runtime_version`.
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Solver switches from `[resolver]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default, rename = "allow-prereleases")]
    pub allow_prereleases: bool,
    #[serde(default, rename = "prefer-prebuilt")]
    pub prefer_prebuilt: bool,
}

/// Per-project registry override from `[registry]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub url: String,
}

/// The inputs that decide a resolution, in a fixed shape for hashing.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    name: &'a str,
    version: &'a str,
    runtime: Option<&'a str>,
    dependencies: &'a BTreeMap<String, DependencySpec>,
    environment: &'a BTreeMap<String, String>,
    resolver: &'a ResolverConfig,
    registry: Option<&'a str>,
}

impl Manifest {
    /// Load and parse a `Lode.toml` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        Ok(Self::load(path)?)
    }

    /// Parse a `Lode.toml` from a string.
    pub fn from_str(content: &str) -> miette::Result<Self> {
        Ok(Self::parse(content)?)
    }

    /// Like [`Manifest::from_path`], for callers that classify errors.
    pub fn load(path: &Path) -> LodeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LodeError::Manifest {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> LodeResult<Self> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| LodeError::Manifest {
            message: format!("Failed to parse Lode.toml: {e}"),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> LodeResult<()> {
        crate::package::PackageName::new(&self.package.name).map_err(|e| {
            LodeError::Manifest {
                message: e.to_string(),
            }
        })?;
        Version::parse(&self.package.version).map_err(|e| LodeError::Manifest {
            message: format!("[package] version: {e}"),
        })?;
        Ok(())
    }

    /// The direct dependencies, in name order. Relative paths are resolved
    /// against `base_dir`.
    pub fn direct_dependencies(&self, base_dir: &Path) -> LodeResult<Vec<Dependency>> {
        self.dependencies
            .iter()
            .map(|(name, spec)| {
                spec.to_dependency(name, base_dir)
                    .map_err(|message| LodeError::Manifest { message })
            })
            .collect()
    }

    /// The environment markers are evaluated against during resolution:
    /// the host, overlaid with `[environment]` and the declared runtime.
    pub fn target_environment(&self) -> TargetEnvironment {
        let mut declared = TargetEnvironment::new();
        if let Some(runtime) = &self.package.runtime {
            declared.set("runtime_version", runtime.clone());
        }
        for (k, v) in &self.environment {
            declared.set(k.clone(), v.clone());
        }
        TargetEnvironment::host().merged(&declared)
    }

    /// `sha256:<hex>` over the resolution-relevant parts of the manifest.
    /// Comments, key order and whitespace do not change it.
    pub fn fingerprint(&self) -> String {
        let input = FingerprintInput {
            name: &self.package.name,
            version: &self.package.version,
            runtime: self.package.runtime.as_deref(),
            dependencies: &self.dependencies,
            environment: &self.environment,
            resolver: &self.resolver,
            registry: self.registry.as_ref().map(|r| r.url.as_str()),
        };
        let canonical = serde_json::to_vec(&input).unwrap_or_default();
        format!("sha256:{}", lode_util::hash::sha256_bytes(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
[package]
name = "app"
version = "0.1.0"
runtime = "3.11"

[environment]
os = "linux"

[dependencies]
requests = "^2.31"
colorama = { version = ">=0.4", markers = "os == \"windows\"" }
"#;

    #[test]
    fn parses_sections() {
        let manifest = Manifest::from_str(BASIC).unwrap();
        assert_eq!(manifest.package.name, "app");
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(!manifest.resolver.allow_prereleases);
        let deps = manifest.direct_dependencies(Path::new(".")).unwrap();
        assert_eq!(deps[0].name.as_str(), "colorama");
        assert_eq!(deps[1].name.as_str(), "requests");
    }

    #[test]
    fn target_environment_overlays_host() {
        let manifest = Manifest::from_str(BASIC).unwrap();
        let env = manifest.target_environment();
        assert_eq!(env.get("os"), Some("linux"));
        assert_eq!(env.get("runtime_version"), Some("3.11"));
        assert!(env.get("arch").is_some());
    }

    #[test]
    fn fingerprint_ignores_formatting() {
        let reformatted = r#"
# a comment
[dependencies]
colorama = { markers = "os == \"windows\"", version = ">=0.4" }
requests   =   "^2.31"

[environment]
os = "linux"

[package]
version = "0.1.0"
name = "app"
runtime = "3.11"
"#;
        let a = Manifest::from_str(BASIC).unwrap();
        let b = Manifest::from_str(reformatted).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("sha256:"));
    }

    #[test]
    fn fingerprint_tracks_dependency_changes() {
        let a = Manifest::from_str(BASIC).unwrap();
        let b = Manifest::from_str(&BASIC.replace("^2.31", "^2.32")).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn rejects_bad_package_identity() {
        assert!(Manifest::from_str("[package]\nname = \"\"\nversion = \"1.0\"\n").is_err());
        assert!(Manifest::from_str("[package]\nname = \"a\"\nversion = \"x\"\n").is_err());
    }
}
