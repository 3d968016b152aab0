use thiserror::Error;

/// Errors raised by the scripting bridge
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// The environment was torn down (or never created) before the call
    #[error("Script environment is not ready")]
    EnvironmentNotReady,

    /// No lookup tier resolved the requested module
    #[error("Module '{name}' not found{}", package_suffix(.package))]
    ModuleNotFound {
        name: String,
        package: Option<String>,
    },

    /// A tier found the module source but executing it failed
    #[error("Error loading module '{name}': {message}")]
    ModuleLoad { name: String, message: String },

    /// The module is already being loaded further up the require chain
    #[error("Circular require detected for module '{name}'")]
    CircularModule { name: String },

    /// A non-callable value was handed to the scheduler
    #[error("Wait: callback is not a function (got {type_name})")]
    InvalidCallback { type_name: &'static str },

    /// A delay that is neither a number nor nil
    #[error("Delay is not a number (got {type_name})")]
    InvalidDelay { type_name: &'static str },

    /// A deferred callback raised while it was being invoked
    #[error("Error in Wait callback: {message}")]
    CallbackInvocation { message: String },

    /// A handle function received a nil, foreign or stale handle
    #[error("Invalid object handle")]
    InvalidHandle,

    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

fn package_suffix(package: &Option<String>) -> String {
    match package {
        Some(package) => format!(" in mod {package}"),
        None => String::new(),
    }
}

impl BridgeError {
    /// Convert into an error that can be raised inside a running script
    pub fn into_lua(self) -> mlua::Error {
        match self {
            BridgeError::Lua(err) => err,
            other => mlua::Error::external(other),
        }
    }

    /// Find a bridge error wrapped somewhere inside a Lua error chain
    pub fn find_in(err: &mlua::Error) -> Option<&BridgeError> {
        match err {
            mlua::Error::CallbackError { cause, .. } => Self::find_in(cause),
            mlua::Error::WithContext { cause, .. } => Self::find_in(cause),
            mlua::Error::ExternalError(inner) => inner.downcast_ref::<BridgeError>(),
            _ => None,
        }
    }
}
