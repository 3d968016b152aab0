//! Free functions over opaque scene handles
//!
//! Scripts never see a scene object's fields or methods. They get an opaque
//! handle and pass it back to one of the functions registered here, each of
//! which performs a single operation. A nil, foreign or stale handle makes the
//! function return a safe default instead of raising.

use mlua::{Lua, MetaMethod, UserData, UserDataMethods, Value};
use tracing::trace;

use super::scene::{ObjectId, SceneObject, SharedScene};
use super::vector::Vector3;
use crate::environment::ScriptEnvironment;
use crate::error::BridgeError;

/// Identity-only reference to a scene object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHandle(pub ObjectId);

/// Identity-only reference to a scene object's transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformHandle(pub ObjectId);

impl UserData for ObjectHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: Value| {
            Ok(object_id(&other) == Some(this.0))
        });
    }
}

impl UserData for TransformHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: Value| {
            Ok(transform_id(&other) == Some(this.0))
        });
    }
}

/// Extract an object id from a script value, if it holds an `ObjectHandle`
pub fn object_id(value: &Value) -> Option<ObjectId> {
    match value {
        Value::UserData(ud) => ud.borrow::<ObjectHandle>().ok().map(|handle| handle.0),
        _ => None,
    }
}

/// Extract an object id from a script value, if it holds a `TransformHandle`
pub fn transform_id(value: &Value) -> Option<ObjectId> {
    match value {
        Value::UserData(ud) => ud.borrow::<TransformHandle>().ok().map(|handle| handle.0),
        _ => None,
    }
}

fn read_object<T>(
    scene: &SharedScene,
    id: Option<ObjectId>,
    function: &str,
    default: T,
    read: impl FnOnce(&SceneObject) -> T,
) -> T {
    let scene = scene.borrow();
    match id.ok_or(BridgeError::InvalidHandle).and_then(|id| scene.get(id)) {
        Ok(object) => read(object),
        Err(e) => {
            trace!(target: "scripting", "{}: {}", function, e);
            default
        }
    }
}

fn write_object(
    scene: &SharedScene,
    id: Option<ObjectId>,
    function: &str,
    write: impl FnOnce(&mut SceneObject),
) {
    let mut scene = scene.borrow_mut();
    match id.ok_or(BridgeError::InvalidHandle).and_then(|id| scene.get_mut(id)) {
        Ok(object) => write(object),
        Err(e) => trace!(target: "scripting", "{}: {}", function, e),
    }
}

/// Register every scene handle function into the environment
pub(crate) fn register_handle_functions(env: &ScriptEnvironment) -> Result<(), BridgeError> {
    let scene = env.scene();

    let s = scene.clone();
    env.register_function("CreateGameObject", move |_, name: String| {
        let id = s.borrow_mut().create(SceneObject::new(name));
        Ok(ObjectHandle(id))
    })?;

    let s = scene.clone();
    env.register_function("FindGameObject", move |_, name: String| {
        Ok(s.borrow().find(&name).map(ObjectHandle))
    })?;

    let s = scene.clone();
    env.register_function("GetGameObjectName", move |_, handle: Value| {
        Ok(read_object(&s, object_id(&handle), "GetGameObjectName", String::new(), |o| {
            o.name.clone()
        }))
    })?;

    let s = scene.clone();
    env.register_function(
        "SetGameObjectName",
        move |_, (handle, name): (Value, String)| {
            write_object(&s, object_id(&handle), "SetGameObjectName", |o| o.name = name);
            Ok(())
        },
    )?;

    let s = scene.clone();
    env.register_function(
        "SetGameObjectActive",
        move |_, (handle, active): (Value, bool)| {
            write_object(&s, object_id(&handle), "SetGameObjectActive", |o| {
                o.active = active
            });
            Ok(())
        },
    )?;

    let s = scene.clone();
    env.register_function("IsGameObjectActive", move |_, handle: Value| {
        Ok(read_object(&s, object_id(&handle), "IsGameObjectActive", false, |o| o.active))
    })?;

    let s = scene.clone();
    env.register_function("GetTransform", move |_, handle: Value| {
        Ok(read_object(&s, object_id(&handle), "GetTransform", None, |_| {
            object_id(&handle).map(TransformHandle)
        }))
    })?;

    let s = scene.clone();
    env.register_function("GetTransformPosition", move |_, handle: Value| {
        Ok(read_object(&s, transform_id(&handle), "GetTransformPosition", Vector3::ZERO, |o| {
            o.position
        }))
    })?;

    let s = scene.clone();
    env.register_function(
        "SetTransformPosition",
        move |_, (handle, position): (Value, Vector3)| {
            write_object(&s, transform_id(&handle), "SetTransformPosition", |o| {
                o.position = position
            });
            Ok(())
        },
    )?;

    let s = scene.clone();
    env.register_function("GetTransformRotation", move |_, handle: Value| {
        Ok(read_object(&s, transform_id(&handle), "GetTransformRotation", Vector3::ZERO, |o| {
            o.rotation
        }))
    })?;

    let s = scene.clone();
    env.register_function(
        "SetTransformRotation",
        move |_, (handle, rotation): (Value, Vector3)| {
            write_object(&s, transform_id(&handle), "SetTransformRotation", |o| {
                o.rotation = rotation
            });
            Ok(())
        },
    )?;

    let s = scene.clone();
    env.register_function("GetPosition", move |_, handle: Value| {
        Ok(read_object(&s, object_id(&handle), "GetPosition", Vector3::ZERO, |o| o.position))
    })?;

    let s = scene.clone();
    env.register_function(
        "SetPosition",
        move |_, (handle, x, y, z): (Value, f32, f32, f32)| {
            write_object(&s, object_id(&handle), "SetPosition", |o| {
                o.position = Vector3::new(x, y, z)
            });
            Ok(())
        },
    )?;

    let s = scene;
    env.register_function("GetAllMapRegions", move |lua: &Lua, ()| {
        let scene = s.borrow();
        lua.create_sequence_from(scene.map_regions().iter().cloned())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentOptions;
    use crate::proxy::scene::SceneGraph;

    fn env_with_scene() -> (ScriptEnvironment, SharedScene) {
        let scene = SceneGraph::new().shared();
        let env = ScriptEnvironment::new(EnvironmentOptions::default(), scene.clone()).unwrap();
        (env, scene)
    }

    #[test]
    fn test_create_and_rename_object() {
        let (env, scene) = env_with_scene();
        env.exec(
            r#"
            local go = CreateGameObject("Crate")
            SetGameObjectName(go, "Barrel")
            SetPosition(go, 1, 2, 3)
            name = GetGameObjectName(go)
            "#,
        )
        .unwrap();

        assert_eq!(env.global::<String>("name").unwrap(), "Barrel");
        let scene = scene.borrow();
        let id = scene.find("Barrel").unwrap();
        assert_eq!(scene.get(id).unwrap().position, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_transform_functions() {
        let (env, _scene) = env_with_scene();
        env.exec(
            r#"
            local go = CreateGameObject("Lamp")
            local t = GetTransform(go)
            SetTransformPosition(t, Vector3(4, 5, 6))
            SetTransformRotation(t, { x = 0, y = 90, z = 0 })
            pos = GetTransformPosition(t)
            rot = GetTransformRotation(t)
            same = GetPosition(go) == pos
            "#,
        )
        .unwrap();

        assert_eq!(env.global::<Vector3>("pos").unwrap(), Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(env.global::<Vector3>("rot").unwrap(), Vector3::new(0.0, 90.0, 0.0));
        assert!(env.global::<bool>("same").unwrap());
    }

    #[test]
    fn test_nil_handles_return_defaults() {
        let (env, _scene) = env_with_scene();
        env.exec(
            r#"
            name = GetGameObjectName(nil)
            active = IsGameObjectActive(nil)
            transform = GetTransform(nil)
            pos = GetTransformPosition(nil)
            SetGameObjectActive(nil, true)
            SetPosition(42, 1, 1, 1)
            missing = FindGameObject("nothing here")
            "#,
        )
        .unwrap();

        assert_eq!(env.global::<String>("name").unwrap(), "");
        assert!(!env.global::<bool>("active").unwrap());
        assert!(env.global::<Option<mlua::AnyUserData>>("transform").unwrap().is_none());
        assert_eq!(env.global::<Vector3>("pos").unwrap(), Vector3::ZERO);
        assert!(env.global::<Option<mlua::AnyUserData>>("missing").unwrap().is_none());
    }

    #[test]
    fn test_stale_handle_returns_default() {
        let (env, scene) = env_with_scene();
        env.exec(r#"go = CreateGameObject("Temp")"#).unwrap();

        let id = scene.borrow().find("Temp").unwrap();
        assert!(scene.borrow_mut().destroy(id));

        env.exec(r#"name = GetGameObjectName(go); active = IsGameObjectActive(go)"#)
            .unwrap();
        assert_eq!(env.global::<String>("name").unwrap(), "");
        assert!(!env.global::<bool>("active").unwrap());
    }

    #[test]
    fn test_handle_kinds_are_not_interchangeable() {
        let (env, _scene) = env_with_scene();
        env.exec(
            r#"
            local go = CreateGameObject("Sign")
            SetPosition(go, 1, 1, 1)
            from_object = GetTransformPosition(go)
            "#,
        )
        .unwrap();

        assert_eq!(env.global::<Vector3>("from_object").unwrap(), Vector3::ZERO);
    }

    #[test]
    fn test_handles_compare_by_identity() {
        let (env, _scene) = env_with_scene();
        env.exec(
            r#"
            local a = CreateGameObject("A")
            same = FindGameObject("A") == a
            different = CreateGameObject("B") == a
            "#,
        )
        .unwrap();

        assert!(env.global::<bool>("same").unwrap());
        assert!(!env.global::<bool>("different").unwrap());
    }

    #[test]
    fn test_map_regions() {
        let (env, scene) = env_with_scene();
        scene
            .borrow_mut()
            .set_map_regions(vec!["Downtown".to_string(), "Docks".to_string()]);

        env.exec("regions = GetAllMapRegions()").unwrap();
        let regions: Vec<String> = env.global("regions").unwrap();
        assert_eq!(regions, vec!["Downtown", "Docks"]);
    }
}
