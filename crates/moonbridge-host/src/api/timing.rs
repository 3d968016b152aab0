use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Lua, Value};
use tracing::{error, trace, warn};

use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;
use crate::registrar::ApiModule;
use crate::scheduler::{clamp_delay, CallbackScheduler};

/// `Wait(seconds, callback)` and its alias `Delay`
pub struct TimingApi;

impl ApiModule for TimingApi {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn register(&self, env: &ScriptEnvironment) -> Result<(), BridgeError> {
        for name in ["Wait", "Delay"] {
            let scheduler = env.scheduler().clone();
            env.register_function(
                name,
                move |lua, (seconds, callback): (Value, Value)| {
                    match script_delay(&seconds) {
                        Ok(seconds) => schedule_from_script(lua, &scheduler, seconds, callback),
                        Err(e) => warn!(target: "lua", "{}: {}", name, e),
                    }
                    Ok(())
                },
            )?;
        }
        Ok(())
    }
}

/// Seconds from a script argument; nil means no delay
pub(crate) fn script_delay(value: &Value) -> Result<f64, BridgeError> {
    match value {
        Value::Nil => Ok(0.0),
        Value::Integer(n) => Ok(*n as f64),
        Value::Number(n) => Ok(*n),
        other => Err(BridgeError::InvalidDelay {
            type_name: other.type_name(),
        }),
    }
}

/// Queue a script callback; never raises back into the script
fn schedule_from_script(
    lua: &Lua,
    scheduler: &Rc<RefCell<CallbackScheduler>>,
    seconds: f64,
    callback: Value,
) {
    let callback = match callback {
        Value::Function(callback) => callback,
        other => {
            warn!(
                target: "lua",
                "{}",
                BridgeError::InvalidCallback {
                    type_name: other.type_name()
                }
            );
            return;
        }
    };

    let delay = clamp_delay(seconds);
    match scheduler.borrow_mut().schedule_script(lua, delay, callback) {
        Ok(id) => trace!(target: "scripting", "Scheduled callback {:?} in {:?}", id, delay),
        Err(e) => error!(target: "scripting", "Failed to schedule callback: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::environment::{EnvironmentOptions, ScriptEnvironment};
    use crate::proxy::SceneGraph;

    fn new_env() -> ScriptEnvironment {
        ScriptEnvironment::new(EnvironmentOptions::default(), SceneGraph::new().shared()).unwrap()
    }

    #[test]
    fn test_wait_with_non_function_is_noop() {
        let env = new_env();
        env.exec("Wait(1, 'not a function'); Delay(1); Wait(1, {})").unwrap();
        assert_eq!(env.pending_callbacks(), 0);
    }

    #[test]
    fn test_wait_with_non_number_delay_is_noop() {
        let env = new_env();
        env.exec("Wait({}, function() end); Delay('soon', function() end)")
            .unwrap();
        assert_eq!(env.pending_callbacks(), 0);

        // A missing delay still schedules for the next tick
        env.exec("Wait(nil, function() fired = true end)").unwrap();
        assert_eq!(env.tick(Duration::ZERO), 1);
        assert!(env.global::<bool>("fired").unwrap());
    }

    #[test]
    fn test_script_delay_accepts_numbers_and_nil() {
        use mlua::Value;

        assert_eq!(super::script_delay(&Value::Nil).unwrap(), 0.0);
        assert_eq!(super::script_delay(&Value::Integer(2)).unwrap(), 2.0);
        assert_eq!(super::script_delay(&Value::Number(0.25)).unwrap(), 0.25);
        assert!(matches!(
            super::script_delay(&Value::Boolean(true)),
            Err(crate::error::BridgeError::InvalidDelay { type_name: "boolean" })
        ));
    }

    #[test]
    fn test_delay_is_alias_for_wait() {
        let env = new_env();
        env.exec("Delay(0.5, function() order = (order or '') .. 'd' end)")
            .unwrap();
        env.exec("Wait(0.5, function() order = (order or '') .. 'w' end)")
            .unwrap();
        assert_eq!(env.pending_callbacks(), 2);

        env.tick(Duration::from_millis(500));
        assert_eq!(env.global::<String>("order").unwrap(), "dw");
    }

    #[test]
    fn test_callback_can_schedule_more_callbacks() {
        let env = new_env();
        env.exec(
            r#"
            count = 0
            local function again()
                count = count + 1
                if count < 3 then Wait(0, again) end
            end
            Wait(0, again)
            "#,
        )
        .unwrap();

        // Each tick runs only the callbacks that were due before it started
        env.tick(Duration::ZERO);
        assert_eq!(env.global::<i64>("count").unwrap(), 1);
        env.tick(Duration::ZERO);
        env.tick(Duration::ZERO);
        assert_eq!(env.global::<i64>("count").unwrap(), 3);
        assert_eq!(env.pending_callbacks(), 0);
    }
}
