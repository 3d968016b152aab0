use mlua::{FromLua, Lua, Value};
use tracing::{error, info, warn};

use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;
use crate::proxy::{SceneEvent, Vector3};
use crate::registrar::ApiModule;
use crate::api::timing::script_delay;
use crate::scheduler::clamp_delay;

/// Example domain module: `TriggerExplosion(position, seconds)`
///
/// The explosion is a host action scheduled on the same queue as script
/// callbacks, so it fires on the host tick after the delay.
pub struct ExplosionApi;

impl ApiModule for ExplosionApi {
    fn name(&self) -> &'static str {
        "explosion"
    }

    fn register(&self, env: &ScriptEnvironment) -> Result<(), BridgeError> {
        let scheduler = env.scheduler().clone();
        let scene = env.scene();

        env.register_function(
            "TriggerExplosion",
            move |lua: &Lua, (position, seconds): (Value, Value)| {
                let position = match position {
                    Value::Table(_) | Value::UserData(_) => Vector3::from_lua(position, lua),
                    other => Err(mlua::Error::RuntimeError(format!(
                        "got {}",
                        other.type_name()
                    ))),
                };
                let position = match position {
                    Ok(position) => position,
                    Err(e) => {
                        error!(target: "lua", "TriggerExplosion expects a table with x, y, z ({})", e);
                        return Ok(());
                    }
                };

                let delay = match script_delay(&seconds) {
                    Ok(seconds) => clamp_delay(seconds),
                    Err(e) => {
                        error!(target: "lua", "TriggerExplosion: {}", e);
                        return Ok(());
                    }
                };
                info!(target: "scripting", "Delayed explosion in {:?} at {}", delay, position);

                let scene = scene.clone();
                scheduler.borrow_mut().schedule_host(
                    delay,
                    Box::new(move |_lua: &Lua| {
                        let mut scene = scene.borrow_mut();
                        if scene.is_server() {
                            info!(target: "scripting", "Explosion triggered at {}", position);
                            scene.push_event(SceneEvent::Explosion { position });
                        } else {
                            warn!(target: "scripting", "Not on server, cannot trigger explosion");
                        }
                        Ok(())
                    }),
                );
                Ok(())
            },
        )
    }
}
