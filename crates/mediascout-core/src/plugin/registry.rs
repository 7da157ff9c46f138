//! Name → constructor table for plugins.
//!
//! Built once at startup and passed to whatever needs lookup. Tests build
//! their own instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Plugin, PluginError, avsox};

/// Free-form per-plugin arguments, taken from `[plugins.<name>]` in the config.
pub type PluginArgs = toml::Table;

pub type PluginCreator =
    Arc<dyn Fn(Option<&PluginArgs>) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

fn validate_name(name: &str) -> Result<(), PluginError> {
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(PluginError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn create_avsox(args: Option<&PluginArgs>) -> Result<Arc<dyn Plugin>, PluginError> {
    Ok(Arc::new(avsox::Avsox::create(args)?))
}

#[derive(Default, Clone)]
pub struct PluginRegistry {
    creators: HashMap<String, PluginCreator>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every plugin shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .creators
            .insert(avsox::AVSOX.to_string(), Arc::new(create_avsox));
        registry
    }

    /// Register `creator` under `name`. A later registration with the same
    /// name replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, creator: F) -> Result<(), PluginError>
    where
        F: Fn(Option<&PluginArgs>) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        let name = name.into();
        validate_name(&name)?;
        if self.creators.insert(name.clone(), Arc::new(creator)).is_some() {
            tracing::warn!(plugin = %name, "plugin registered twice, replacing earlier entry");
        }
        Ok(())
    }

    /// Instantiate the plugin registered under `name`.
    pub fn create(
        &self,
        name: &str,
        args: Option<&PluginArgs>,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        let creator = self
            .creators
            .get(name)
            .ok_or_else(|| PluginError::PluginNotFound(name.to_string()))?;
        creator(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.creators.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.creators.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Wrap an existing instance as a creator that ignores its arguments.
pub fn plugin_to_creator(
    plugin: Arc<dyn Plugin>,
) -> impl Fn(Option<&PluginArgs>) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static {
    move |_: Option<&PluginArgs>| Ok(Arc::clone(&plugin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::DefaultPlugin;

    #[test]
    fn create_unknown_plugin_fails() {
        let registry = PluginRegistry::new();
        let err = registry.create("nonexistent", None).err().unwrap();
        assert_eq!(err.to_string(), "plugin:nonexistent not found");
    }

    #[test]
    fn create_returns_what_the_creator_builds() {
        let instance: Arc<dyn Plugin> = Arc::new(DefaultPlugin);
        let mut registry = PluginRegistry::new();
        registry
            .register("x", plugin_to_creator(Arc::clone(&instance)))
            .unwrap();
        let created = registry.create("x", None).unwrap();
        assert!(Arc::ptr_eq(&created, &instance));
    }

    #[test]
    fn duplicate_registration_last_wins() {
        let first: Arc<dyn Plugin> = Arc::new(DefaultPlugin);
        let second: Arc<dyn Plugin> = Arc::new(DefaultPlugin);
        let mut registry = PluginRegistry::new();
        registry.register("x", plugin_to_creator(first)).unwrap();
        registry
            .register("x", plugin_to_creator(Arc::clone(&second)))
            .unwrap();
        assert_eq!(registry.names(), vec!["x"]);
        assert!(Arc::ptr_eq(&registry.create("x", None).unwrap(), &second));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = PluginRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(name, plugin_to_creator(Arc::new(DefaultPlugin)))
                .unwrap();
        }
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn rejects_blank_and_whitespace_names() {
        let mut registry = PluginRegistry::new();
        for bad in ["", "two words"] {
            let err = registry
                .register(bad, plugin_to_creator(Arc::new(DefaultPlugin)))
                .unwrap_err();
            assert!(matches!(err, PluginError::InvalidName(_)));
        }
    }

    #[test]
    fn builtin_registry_contains_avsox() {
        let registry = PluginRegistry::with_builtin();
        assert!(registry.contains("avsox"));
        assert!(registry.create("avsox", None).is_ok());
    }

    #[test]
    fn creator_errors_propagate() {
        let mut registry = PluginRegistry::new();
        registry
            .register("broken", |_| {
                Err(PluginError::InvalidArgs {
                    plugin: "broken".into(),
                    reason: "always".into(),
                })
            })
            .unwrap();
        assert!(matches!(
            registry.create("broken", None),
            Err(PluginError::InvalidArgs { .. })
        ));
    }
}
