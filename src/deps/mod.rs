//! External dependency resolution.
//!
//! `find_external_dependency` is the single public operation: given a
//! name and keyword arguments it consults the persisted cache, then a
//! hand-coded provider if one claims the name, then pkg-config, then (on
//! Apple hosts) the system framework directories. Every branch
//! distinguishes "required and missing", which halts configuration, from
//! "optional and missing", which yields a not-found sentinel.

pub mod pkgconfig;
pub mod providers;
pub mod version;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coredata::CoreData;
use crate::environment::Environment;
use crate::error::{ConfigureError, Result};

/// A pre-compile rule published by a dependency (e.g. Qt's moc); targets
/// that use the dependency gain generator steps from these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecompileRule {
    /// Ninja rule name, unique per tool.
    pub name: String,
    /// Command with `@INFILE@` / `@OUTFILE@` placeholders.
    pub cmd_list: Vec<String>,
    /// Output name template with `@BASENAME@`.
    pub name_template: String,
    /// Keyword under which targets list sources for this rule.
    pub src_keyword: String,
    pub description: String,
}

/// A resolved (or not-found) external dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub found: bool,
    pub version: Option<String>,
    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
    /// Extra sources the consumer must compile, e.g. a vendored
    /// single-translation-unit library.
    pub sources: Vec<String>,
    pub precompile_rules: Vec<PrecompileRule>,
}

impl Dependency {
    pub fn not_found(name: impl Into<String>) -> Self {
        Dependency {
            name: name.into(),
            found: false,
            version: None,
            compile_args: Vec::new(),
            link_args: Vec::new(),
            sources: Vec::new(),
            precompile_rules: Vec::new(),
        }
    }

    pub fn found(name: impl Into<String>, version: Option<String>) -> Self {
        Dependency {
            name: name.into(),
            found: true,
            version,
            compile_args: Vec::new(),
            link_args: Vec::new(),
            sources: Vec::new(),
            precompile_rules: Vec::new(),
        }
    }
}

/// Keyword arguments accepted by `dependency()`.
#[derive(Debug, Clone, Default)]
pub struct FindKwargs {
    pub required: bool,
    pub version: Vec<String>,
    pub modules: Vec<String>,
    pub static_link: bool,
    /// In cross builds, select the build machine's tool rather than the
    /// host machine's library.
    pub native: bool,
    /// (subproject name, variable name) to fall back to; consumed by the
    /// interpreter, part of the cache identity here.
    pub fallback: Option<(String, String)>,
}

impl FindKwargs {
    pub fn required() -> Self {
        FindKwargs {
            required: true,
            ..Default::default()
        }
    }
}

/// The order-independent cache key for one dependency lookup.
pub fn canonical_identifier(name: &str, kwargs: &FindKwargs) -> String {
    let mut modules = kwargs.modules.clone();
    modules.sort();
    let fallback = kwargs
        .fallback
        .as_ref()
        .map(|(s, v)| format!("{s}/{v}"))
        .unwrap_or_default();
    format!(
        "{}|{}|static={}|native={}|{}",
        name.to_lowercase(),
        modules.join(","),
        kwargs.static_link,
        kwargs.native,
        fallback
    )
}

fn not_found_error(name: &str, detail: &str) -> ConfigureError {
    ConfigureError::dependency(format!("required dependency '{name}' not found ({detail})"))
}

/// Resolve one external dependency, consulting and updating the cache in
/// core data.
pub fn find_external_dependency(
    name: &str,
    kwargs: &FindKwargs,
    env: &Environment,
    coredata: &mut CoreData,
) -> Result<Dependency> {
    let identifier = canonical_identifier(name, kwargs);
    if let Some(cached) = coredata.deps.get(&identifier) {
        // A cached miss cannot satisfy a required lookup; retry it.
        if cached.found || !kwargs.required {
            debug!("dependency '{name}' served from cache");
            return Ok(cached.clone());
        }
    }

    let dep = lookup(name, kwargs, env)?;
    if dep.found {
        info!(
            "dependency {} found: YES {}",
            name,
            dep.version.as_deref().unwrap_or("")
        );
    } else {
        info!("dependency {} found: NO", name);
    }

    if kwargs.required && !dep.found {
        return Err(not_found_error(name, &describe_strategy(name, env)));
    }
    if dep.found {
        if let Some(found_version) = &dep.version {
            if !version::satisfies_all(found_version, &kwargs.version) {
                if kwargs.required {
                    return Err(ConfigureError::dependency(format!(
                        "required dependency '{}' not found (version {} does not \
                         satisfy [{}])",
                        name,
                        found_version,
                        kwargs.version.join(", ")
                    )));
                }
                let miss = Dependency::not_found(name);
                coredata.deps.insert(identifier, miss.clone());
                return Ok(miss);
            }
        }
    }

    coredata.deps.insert(identifier, dep.clone());
    Ok(dep)
}

fn describe_strategy(name: &str, env: &Environment) -> String {
    if providers::provider_for(&name.to_lowercase()).is_some() {
        format!("tried the builtin {} detector", name.to_lowercase())
    } else if env.host_is_darwin() {
        "tried pkg-config and the system framework directories".to_string()
    } else {
        "tried pkg-config".to_string()
    }
}

fn lookup(name: &str, kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    let lower = name.to_lowercase();
    if let Some(provider) = providers::provider_for(&lower) {
        return provider(kwargs, env);
    }
    let dep = pkgconfig::query(name, kwargs, env)?;
    if dep.found {
        return Ok(dep);
    }
    if env.host_is_darwin() {
        if let Some(framework) = providers::extra_framework(name) {
            return Ok(framework);
        }
    }
    Ok(dep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_identifier_is_order_independent() {
        let mut a = FindKwargs::required();
        a.modules = vec!["gui".to_string(), "core".to_string()];
        let mut b = FindKwargs::required();
        b.modules = vec!["core".to_string(), "gui".to_string()];
        assert_eq!(canonical_identifier("Qt5", &a), canonical_identifier("qt5", &b));
    }

    #[test]
    fn test_canonical_identifier_distinguishes_static() {
        let shared = FindKwargs::required();
        let mut static_ = FindKwargs::required();
        static_.static_link = true;
        assert_ne!(
            canonical_identifier("zlib", &shared),
            canonical_identifier("zlib", &static_)
        );
    }

    #[test]
    fn test_missing_optional_dependency_is_not_found() {
        let env = Environment::new("/s", "/b", None, None);
        let mut core = CoreData::new();
        let kwargs = FindKwargs::default();
        let dep = find_external_dependency(
            "definitely-missing-xyz-drydock",
            &kwargs,
            &env,
            &mut core,
        )
        .unwrap();
        assert!(!dep.found);
        assert!(dep.compile_args.is_empty());
        assert!(dep.link_args.is_empty());
    }

    #[test]
    fn test_missing_required_dependency_fails() {
        let env = Environment::new("/s", "/b", None, None);
        let mut core = CoreData::new();
        let kwargs = FindKwargs::required();
        let err = find_external_dependency(
            "definitely-missing-xyz-drydock",
            &kwargs,
            &env,
            &mut core,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("definitely-missing-xyz-drydock"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_cache_round_trip_equality() {
        let env = Environment::new("/s", "/b", None, None);
        let mut core = CoreData::new();
        let kwargs = FindKwargs::default();
        let first =
            find_external_dependency("no-such-dep-abc", &kwargs, &env, &mut core).unwrap();
        let second =
            find_external_dependency("no-such-dep-abc", &kwargs, &env, &mut core).unwrap();
        assert_eq!(first.found, second.found);
        assert_eq!(first.version, second.version);
        assert_eq!(first.compile_args, second.compile_args);
        assert_eq!(first.link_args, second.link_args);
    }
}
