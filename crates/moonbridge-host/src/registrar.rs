use mlua::{IntoLua, Lua};
use tracing::{debug, trace};

use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;

/// A group of host functions exposed to scripts
///
/// Each domain module implements this once and is registered during startup.
/// Implementations call back into [`ScriptEnvironment::register`] and
/// [`ScriptEnvironment::register_function`] for every global they add.
pub trait ApiModule {
    /// Short name used in logs (e.g., "timing")
    fn name(&self) -> &'static str;

    /// Install this module's globals into the environment
    fn register(&self, env: &ScriptEnvironment) -> Result<(), BridgeError>;
}

/// Install `value` under `name` in the global namespace
///
/// An existing global with the same name is silently replaced.
pub fn register<V: IntoLua>(lua: Option<&Lua>, name: &str, value: V) -> Result<(), BridgeError> {
    let lua = lua.ok_or(BridgeError::EnvironmentNotReady)?;
    lua.globals().set(name, value)?;
    trace!(target: "scripting", "Registered global {}", name);
    Ok(())
}

/// Register a list of API modules in order
pub fn install_modules(
    env: &ScriptEnvironment,
    modules: &[&dyn ApiModule],
) -> Result<(), BridgeError> {
    for module in modules {
        debug!(target: "scripting", "Registering {} API", module.name());
        module.register(env)?;
    }
    Ok(())
}
