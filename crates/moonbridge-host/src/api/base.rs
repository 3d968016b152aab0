use tracing::{error, info, warn};

use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;
use crate::registrar::ApiModule;

/// Global holding the bridge (mod) version
pub const HOST_VERSION_GLOBAL: &str = "MOONBRIDGE_VERSION";

/// Global holding the host application's version
pub const GAME_VERSION_GLOBAL: &str = "GAME_VERSION";

/// Logging functions and version values
pub struct CoreApi;

impl ApiModule for CoreApi {
    fn name(&self) -> &'static str {
        "core"
    }

    fn register(&self, env: &ScriptEnvironment) -> Result<(), BridgeError> {
        let options = env.options();
        env.register(HOST_VERSION_GLOBAL, options.host_version.as_str())?;
        env.register(GAME_VERSION_GLOBAL, options.game_version.as_str())?;

        env.register_function("Log", |_, message: String| {
            info!(target: "lua", "{}", message);
            Ok(())
        })?;
        env.register_function("LogWarning", |_, message: String| {
            warn!(target: "lua", "{}", message);
            Ok(())
        })?;
        env.register_function("LogError", |_, message: String| {
            error!(target: "lua", "{}", message);
            Ok(())
        })?;

        Ok(())
    }
}
