//! Proxies for host values and objects that cannot cross into scripts directly
//!
//! Value types are mirrored structurally (`Vector3`). Object types stay on the
//! host side and are reached through free functions over opaque handles.

mod handles;
mod scene;
mod vector;

pub use handles::{object_id, transform_id, ObjectHandle, TransformHandle};
pub use scene::{ObjectId, SceneEvent, SceneGraph, SceneObject, SharedScene};
pub use vector::Vector3;

use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;
use crate::registrar::ApiModule;

/// Registers the vector proxy and the scene handle functions
pub struct ProxyApi;

impl ApiModule for ProxyApi {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn register(&self, env: &ScriptEnvironment) -> Result<(), BridgeError> {
        env.register_function(
            "Vector3",
            |_, (x, y, z): (Option<f32>, Option<f32>, Option<f32>)| {
                Ok(Vector3::new(
                    x.unwrap_or_default(),
                    y.unwrap_or_default(),
                    z.unwrap_or_default(),
                ))
            },
        )?;
        env.register_function("Vector3Distance", |_, (a, b): (Vector3, Vector3)| {
            Ok(a.distance(&b))
        })?;

        handles::register_handle_functions(env)
    }
}
