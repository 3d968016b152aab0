//! `require` resolution and the per-environment module cache
//!
//! Lookup order, first match wins:
//!
//! 1. the module cache
//! 2. `<package path>/<name>.lua` when a package (mod) context is active
//! 3. scripts the host has already registered, matched by base name
//! 4. a recursive search of the scripts directory, matched by base name
//!
//! Module identity is the ASCII-lowercased name. The conventional exported
//! symbol `<name>_module` is a Lua global and is used verbatim.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Lua, MultiValue, RegistryKey, Value};
use tracing::{debug, error, trace};

use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;
use crate::registrar::ApiModule;
use crate::script_files;

/// Global holding the name of the package whose code is currently running
pub const PACKAGE_NAME_GLOBAL: &str = "__MOD_NAME";

/// Global holding the base path of the package whose code is currently running
pub const PACKAGE_PATH_GLOBAL: &str = "__MOD_PATH";

/// Name of the conventional exported symbol for a module
pub fn export_symbol(module_name: &str) -> String {
    format!("{module_name}_module")
}

fn cache_key(module_name: &str) -> String {
    module_name.to_ascii_lowercase()
}

/// A loaded top-level script the host tracks by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredScript {
    /// Logical name, usually the file name ("helpers.lua")
    pub name: String,
    /// Where the script's source lives
    pub path: PathBuf,
}

impl RegisteredScript {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Base name used to match `require` requests
    pub fn base_name(&self) -> Option<&str> {
        script_files::base_name(Path::new(&self.name))
    }
}

/// Package (mod) whose code is currently executing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageContext {
    pub name: String,
    pub base_path: PathBuf,
}

impl PackageContext {
    pub fn new(name: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
        }
    }

    /// Read the active package from the environment's globals
    ///
    /// Both the name and the path must be set for a context to be active.
    pub fn current(lua: &Lua) -> Result<Option<Self>, BridgeError> {
        let globals = lua.globals();
        let name: Option<String> = globals.get(PACKAGE_NAME_GLOBAL)?;
        let path: Option<String> = globals.get(PACKAGE_PATH_GLOBAL)?;

        Ok(match (name, path) {
            (Some(name), Some(path)) => Some(Self::new(name, path)),
            _ => None,
        })
    }

    pub(crate) fn apply(&self, lua: &Lua) -> Result<(), BridgeError> {
        let globals = lua.globals();
        globals.set(PACKAGE_NAME_GLOBAL, self.name.as_str())?;
        globals.set(PACKAGE_PATH_GLOBAL, self.base_path.to_string_lossy().as_ref())?;
        Ok(())
    }

    pub(crate) fn clear(lua: &Lua) -> Result<(), BridgeError> {
        let globals = lua.globals();
        globals.set(PACKAGE_NAME_GLOBAL, Value::Nil)?;
        globals.set(PACKAGE_PATH_GLOBAL, Value::Nil)?;
        Ok(())
    }
}

/// Values produced by successfully loaded modules
///
/// Entries live until the environment is torn down.
#[derive(Default)]
pub struct ModuleCache {
    entries: HashMap<String, RegistryKey>,
    loading: HashSet<String>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lua: &Lua, module_name: &str) -> Result<Option<Value>, BridgeError> {
        match self.entries.get(&cache_key(module_name)) {
            Some(key) => Ok(Some(lua.registry_value(key)?)),
            None => Ok(None),
        }
    }

    pub fn insert(&mut self, lua: &Lua, module_name: &str, value: Value) -> Result<(), BridgeError> {
        let key = lua.create_registry_value(value)?;
        self.entries.insert(cache_key(module_name), key);
        Ok(())
    }

    pub fn contains(&self, module_name: &str) -> bool {
        self.entries.contains_key(&cache_key(module_name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark a module as loading; fails if it is already being loaded
    pub fn begin_load(&mut self, module_name: &str) -> Result<(), BridgeError> {
        if !self.loading.insert(cache_key(module_name)) {
            return Err(BridgeError::CircularModule {
                name: module_name.to_string(),
            });
        }
        Ok(())
    }

    pub fn end_load(&mut self, module_name: &str) {
        self.loading.remove(&cache_key(module_name));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.loading.clear();
    }
}

/// Set of scripts the host has loaded, searched read-only by the resolver
pub type SharedScripts = Rc<RefCell<Vec<RegisteredScript>>>;

/// Implements `require` against one environment's state
#[derive(Clone)]
pub struct ModuleResolver {
    cache: Rc<RefCell<ModuleCache>>,
    scripts: SharedScripts,
    scripts_dir: PathBuf,
}

impl ModuleResolver {
    pub fn new(scripts: SharedScripts, scripts_dir: PathBuf) -> Self {
        Self {
            cache: Rc::new(RefCell::new(ModuleCache::new())),
            scripts,
            scripts_dir,
        }
    }

    pub fn cache(&self) -> &Rc<RefCell<ModuleCache>> {
        &self.cache
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Resolve a module by name, loading and caching it on first use
    pub fn require(&self, lua: &Lua, module_name: &str) -> Result<Value, BridgeError> {
        if let Some(cached) = self.cache.borrow().get(lua, module_name)? {
            trace!(target: "scripting", "Module {} served from cache", module_name);
            return Ok(cached);
        }

        let package = PackageContext::current(lua)?;

        if let Some(package) = &package {
            let path = package.base_path.join(format!("{module_name}.lua"));
            if path.is_file() {
                debug!(
                    target: "scripting",
                    "Loading module {} from mod {} ({})",
                    module_name,
                    package.name,
                    path.display()
                );
                return self.load_package_module(lua, module_name, &path);
            }
        }

        let registered = self
            .scripts
            .borrow()
            .iter()
            .find(|script| {
                script
                    .base_name()
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(module_name))
            })
            .cloned();

        if let Some(script) = registered {
            debug!(
                target: "scripting",
                "Loading module {} from registered script {}",
                module_name,
                script.name
            );
            return self.load_registered_script(lua, module_name, &script);
        }

        if let Some(path) = script_files::find_script(&self.scripts_dir, module_name) {
            debug!(
                target: "scripting",
                "Loading module {} from {}",
                module_name,
                path.display()
            );
            return self.load_script_file(lua, module_name, &path);
        }

        let err = BridgeError::ModuleNotFound {
            name: module_name.to_string(),
            package: package.map(|p| p.name),
        };
        error!(target: "scripting", "{}", err);
        Err(err)
    }

    fn load_package_module(
        &self,
        lua: &Lua,
        module_name: &str,
        path: &Path,
    ) -> Result<Value, BridgeError> {
        let symbol = export_symbol(module_name);
        let mut value = self.execute_file(lua, module_name, path)?;

        if value.is_nil() {
            value = lua.globals().get(symbol.as_str())?;
        }
        if value.is_nil() {
            value = Value::Table(lua.create_table()?);
        }

        // Assigning a global can run script code that requires other modules
        lua.globals().set(symbol.as_str(), value.clone())?;

        let mut cache = self.cache.borrow_mut();
        cache.insert(lua, module_name, value.clone())?;
        cache.insert(lua, &symbol, value.clone())?;
        Ok(value)
    }

    fn load_registered_script(
        &self,
        lua: &Lua,
        module_name: &str,
        script: &RegisteredScript,
    ) -> Result<Value, BridgeError> {
        // A registered script already ran once; prefer what it exported
        let mut symbols = vec![export_symbol(module_name)];
        if let Some(stem) = script.base_name() {
            if stem != module_name {
                symbols.push(export_symbol(stem));
            }
        }
        for symbol in &symbols {
            let exported: Value = lua.globals().get(symbol.as_str())?;
            if !exported.is_nil() {
                self.cache.borrow_mut().insert(lua, module_name, exported.clone())?;
                return Ok(exported);
            }
        }

        self.load_script_file(lua, module_name, &script.path)
    }

    fn load_script_file(
        &self,
        lua: &Lua,
        module_name: &str,
        path: &Path,
    ) -> Result<Value, BridgeError> {
        let mut value = self.execute_file(lua, module_name, path)?;
        if value.is_nil() {
            value = Value::Table(lua.create_table()?);
        }

        lua.globals().set(export_symbol(module_name), value.clone())?;
        self.cache.borrow_mut().insert(lua, module_name, value.clone())?;
        Ok(value)
    }

    fn execute_file(&self, lua: &Lua, module_name: &str, path: &Path) -> Result<Value, BridgeError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            let err = BridgeError::ModuleLoad {
                name: module_name.to_string(),
                message: format!("failed to read {}: {}", path.display(), e),
            };
            error!(target: "scripting", "{}", err);
            err
        })?;

        self.execute_chunk(lua, module_name, &source)
    }

    /// Run module source as a chunk named after the module
    ///
    /// The module is marked as loading for the duration, so a nested require
    /// of the same name fails with `CircularModule` instead of recursing.
    fn execute_chunk(&self, lua: &Lua, module_name: &str, source: &str) -> Result<Value, BridgeError> {
        self.cache.borrow_mut().begin_load(module_name)?;
        let result = lua.load(source).set_name(module_name).eval::<MultiValue>();
        self.cache.borrow_mut().end_load(module_name);

        match result {
            Ok(values) => Ok(values.into_iter().next().unwrap_or(Value::Nil)),
            Err(err) => {
                if let Some(circular @ BridgeError::CircularModule { .. }) = BridgeError::find_in(&err)
                {
                    return Err(circular.clone());
                }

                let err = BridgeError::ModuleLoad {
                    name: module_name.to_string(),
                    message: err.to_string(),
                };
                error!(target: "scripting", "{}", err);
                Err(err)
            }
        }
    }
}

/// Installs the `require` global
pub struct RequireApi;

impl ApiModule for RequireApi {
    fn name(&self) -> &'static str {
        "require"
    }

    fn register(&self, env: &ScriptEnvironment) -> Result<(), BridgeError> {
        let resolver = env.resolver().clone();
        env.register_function("require", move |lua, module_name: String| {
            resolver
                .require(lua, &module_name)
                .map_err(BridgeError::into_lua)
        })
    }
}
