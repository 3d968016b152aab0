//! One live scripting environment
//!
//! A `ScriptEnvironment` owns the Lua state together with everything scripts
//! can observe across calls: the module cache, the pending callback queue, the
//! registered scripts and the scene. Built-in API modules are installed when
//! the environment is created. Dropping or tearing it down discards all of it.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use mlua::{FromLua, FromLuaMulti, IntoLua, IntoLuaMulti, Lua, Value};
use tracing::{debug, error, info, warn};

use crate::api::{CoreApi, ExplosionApi, TimingApi};
use crate::error::BridgeError;
use crate::modules::{ModuleResolver, PackageContext, RegisteredScript, RequireApi, SharedScripts};
use crate::proxy::{ProxyApi, SharedScene};
use crate::registrar::{self, install_modules};
use crate::scheduler::{clamp_delay, CallbackId, CallbackScheduler, HostAction};

/// Settings fixed for the lifetime of an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentOptions {
    /// Directory searched recursively by `require`
    pub scripts_dir: PathBuf,
    /// Value of `MOONBRIDGE_VERSION`
    pub host_version: String,
    /// Value of `GAME_VERSION`
    pub game_version: String,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            game_version: "unknown".to_string(),
        }
    }
}

/// Lua state plus the bridge state attached to it
pub struct ScriptEnvironment {
    /// `None` once torn down
    lua: Option<Lua>,
    options: EnvironmentOptions,
    scheduler: Rc<RefCell<CallbackScheduler>>,
    scripts: SharedScripts,
    resolver: ModuleResolver,
    scene: SharedScene,
}

impl ScriptEnvironment {
    /// Create a new environment and install the built-in API modules
    pub fn new(options: EnvironmentOptions, scene: SharedScene) -> Result<Self, BridgeError> {
        let scripts: SharedScripts = Rc::new(RefCell::new(Vec::new()));
        let resolver = ModuleResolver::new(scripts.clone(), options.scripts_dir.clone());

        let env = Self {
            lua: Some(Lua::new()),
            options,
            scheduler: Rc::new(RefCell::new(CallbackScheduler::new())),
            scripts,
            resolver,
            scene,
        };

        install_modules(
            &env,
            &[&CoreApi, &RequireApi, &TimingApi, &ProxyApi, &ExplosionApi],
        )?;

        info!(
            target: "scripting",
            "Script environment ready (scripts dir: {})",
            env.options.scripts_dir.display()
        );
        Ok(env)
    }

    fn lua(&self) -> Result<&Lua, BridgeError> {
        self.lua.as_ref().ok_or(BridgeError::EnvironmentNotReady)
    }

    /// Whether the environment still has a live Lua state
    pub fn is_ready(&self) -> bool {
        self.lua.is_some()
    }

    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    /// Get the scene shared with the handle functions
    pub fn scene(&self) -> SharedScene {
        self.scene.clone()
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &Rc<RefCell<CallbackScheduler>> {
        &self.scheduler
    }

    // ===== Registration =====

    /// Install `value` under `name`; the last registration wins
    pub fn register<V: IntoLua>(&self, name: &str, value: V) -> Result<(), BridgeError> {
        registrar::register(self.lua.as_ref(), name, value)
    }

    /// Wrap a Rust closure as a Lua function and register it under `name`
    pub fn register_function<A, R, F>(&self, name: &str, func: F) -> Result<(), BridgeError>
    where
        A: FromLuaMulti,
        R: IntoLuaMulti,
        F: Fn(&Lua, A) -> mlua::Result<R> + 'static,
    {
        let function = self.lua()?.create_function(func)?;
        self.register(name, function)
    }

    // ===== Execution =====

    /// Run a chunk of script source
    pub fn exec(&self, source: &str) -> Result<(), BridgeError> {
        self.lua()?.load(source).exec()?;
        Ok(())
    }

    /// Run a chunk under a chunk name that shows up in error messages
    pub fn exec_named(&self, name: &str, source: &str) -> Result<(), BridgeError> {
        self.lua()?.load(source).set_name(name).exec()?;
        Ok(())
    }

    /// Evaluate an expression or chunk and convert its result
    pub fn eval<T: FromLuaMulti>(&self, source: &str) -> Result<T, BridgeError> {
        Ok(self.lua()?.load(source).eval::<T>()?)
    }

    /// Read a global value
    pub fn global<T: FromLua>(&self, name: &str) -> Result<T, BridgeError> {
        Ok(self.lua()?.globals().get::<T>(name)?)
    }

    // ===== Modules =====

    /// Resolve a module exactly as a script's `require` would
    pub fn require(&self, module_name: &str) -> Result<Value, BridgeError> {
        self.resolver.require(self.lua()?, module_name)
    }

    /// Mark `context` as the package whose code runs next
    pub fn set_package_context(&self, context: &PackageContext) -> Result<(), BridgeError> {
        debug!(target: "scripting", "Entering mod {}", context.name);
        context.apply(self.lua()?)
    }

    pub fn clear_package_context(&self) -> Result<(), BridgeError> {
        PackageContext::clear(self.lua()?)
    }

    /// Add a script to the set `require` searches by name
    ///
    /// Registering the same name again replaces the earlier entry.
    pub fn register_script(&self, script: RegisteredScript) {
        let mut scripts = self.scripts.borrow_mut();
        scripts.retain(|existing| existing.name != script.name);
        scripts.push(script);
    }

    pub fn registered_scripts(&self) -> Vec<RegisteredScript> {
        self.scripts.borrow().clone()
    }

    /// Check if a module is in the cache (case-insensitive)
    pub fn is_cached(&self, module_name: &str) -> bool {
        self.resolver.cache().borrow().contains(module_name)
    }

    pub fn cached_module_count(&self) -> usize {
        self.resolver.cache().borrow().len()
    }

    // ===== Callbacks =====

    /// Schedule a script value to run after `delay_seconds`
    ///
    /// Mirrors `Wait`: a non-function is logged and ignored.
    pub fn schedule(
        &self,
        delay_seconds: f64,
        callback: Value,
    ) -> Result<Option<CallbackId>, BridgeError> {
        let lua = self.lua()?;
        let callback = match callback {
            Value::Function(callback) => callback,
            other => {
                warn!(
                    target: "scripting",
                    "{}",
                    BridgeError::InvalidCallback {
                        type_name: other.type_name()
                    }
                );
                return Ok(None);
            }
        };

        let id = self
            .scheduler
            .borrow_mut()
            .schedule_script(lua, clamp_delay(delay_seconds), callback)?;
        Ok(Some(id))
    }

    /// Schedule a Rust-side action to run after `delay`
    pub fn schedule_host(&self, delay: Duration, action: HostAction) -> CallbackId {
        self.scheduler.borrow_mut().schedule_host(delay, action)
    }

    /// Cancel a pending callback before it fires
    pub fn cancel_callback(&self, id: CallbackId) -> bool {
        self.scheduler.borrow_mut().cancel(id)
    }

    /// Get the number of pending callbacks
    pub fn pending_callbacks(&self) -> usize {
        self.scheduler.borrow().pending_count()
    }

    /// Advance the scheduler clock and run every callback that is now due
    ///
    /// A failing callback is logged and the rest still run. Returns how many
    /// callbacks were invoked.
    pub fn tick(&self, delta: Duration) -> usize {
        let Some(lua) = self.lua.as_ref() else {
            return 0;
        };

        let due = self.scheduler.borrow_mut().advance(delta);
        let count = due.len();
        for callback in due {
            let id = callback.id();
            if let Err(e) = callback.invoke(lua) {
                error!(target: "scripting", "Callback {:?} failed: {}", id, e);
            }
        }
        count
    }

    // ===== Lifecycle =====

    /// Drop pending callbacks, the module cache and the Lua state
    ///
    /// Registration and execution fail with `EnvironmentNotReady` afterwards.
    pub fn teardown(&mut self) {
        if self.lua.is_none() {
            return;
        }

        let dropped = self.scheduler.borrow_mut().clear();
        self.resolver.cache().borrow_mut().clear();
        self.scripts.borrow_mut().clear();
        self.lua = None;

        info!(
            target: "scripting",
            "Script environment torn down ({} pending callbacks discarded)",
            dropped
        );
    }
}

impl Drop for ScriptEnvironment {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::SceneGraph;

    fn new_env() -> ScriptEnvironment {
        ScriptEnvironment::new(EnvironmentOptions::default(), SceneGraph::new().shared()).unwrap()
    }

    #[test]
    fn test_builtins_installed() {
        let env = new_env();
        let kinds: String = env
            .eval("return type(require) .. type(Wait) .. type(Delay) .. type(Vector3) .. type(Log)")
            .unwrap();
        assert_eq!(kinds, "functionfunctionfunctionfunctionfunction");
    }

    #[test]
    fn test_teardown_rejects_use() {
        let mut env = new_env();
        assert!(env.is_ready());
        env.teardown();

        assert!(!env.is_ready());
        assert!(matches!(env.exec("x = 1"), Err(BridgeError::EnvironmentNotReady)));
        assert!(matches!(env.require("x"), Err(BridgeError::EnvironmentNotReady)));
        assert_eq!(env.tick(Duration::from_secs(1)), 0);

        // Second teardown is a no-op
        env.teardown();
    }

    #[test]
    fn test_teardown_discards_pending_callbacks() {
        let mut env = new_env();
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = fired.clone();
        env.schedule_host(
            Duration::ZERO,
            Box::new(move |_: &Lua| {
                *fired_clone.borrow_mut() = true;
                Ok(())
            }),
        );
        env.exec("Wait(0, function() end)").unwrap();
        assert_eq!(env.pending_callbacks(), 2);

        env.teardown();
        assert_eq!(env.pending_callbacks(), 0);
        assert_eq!(env.tick(Duration::from_secs(1)), 0);
        assert!(!*fired.borrow());
    }

    #[test]
    fn test_schedule_from_host() {
        let env = new_env();
        let callback: Value = env.eval("return function() hits = (hits or 0) + 1 end").unwrap();

        let id = env.schedule(1.0, callback.clone()).unwrap();
        assert!(id.is_some());
        let cancelled = env.schedule(1.0, callback).unwrap().unwrap();
        assert!(env.cancel_callback(cancelled));

        assert_eq!(env.schedule(1.0, Value::Boolean(true)).unwrap(), None);

        assert_eq!(env.tick(Duration::from_secs(1)), 1);
        assert_eq!(env.global::<i64>("hits").unwrap(), 1);
    }

    #[test]
    fn test_failing_callback_does_not_stop_others() {
        let env = new_env();
        env.exec(
            r#"
            Wait(1, function() error('first fails') end)
            Wait(1, function() second = true end)
            "#,
        )
        .unwrap();

        assert_eq!(env.tick(Duration::from_secs(1)), 2);
        assert!(env.global::<bool>("second").unwrap());
    }

    #[test]
    fn test_register_script_replaces_same_name() {
        let env = new_env();
        env.register_script(RegisteredScript::new("helpers.lua", "/a/helpers.lua"));
        env.register_script(RegisteredScript::new("helpers.lua", "/b/helpers.lua"));

        assert_eq!(
            env.registered_scripts(),
            vec![RegisteredScript::new("helpers.lua", "/b/helpers.lua")]
        );
    }
}
