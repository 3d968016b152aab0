use std::fmt;
use std::ops::{Add, Mul, Sub};

use mlua::{FromLua, Lua, MetaMethod, Table, UserData, UserDataFields, UserDataMethods, Value};

/// Script-visible mirror of a host 3D vector
///
/// Plain value with no identity. Scripts get a fresh copy every time a vector
/// crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        (*self - *other).magnitude()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    pub fn normalized(&self) -> Vector3 {
        let length = self.magnitude();
        if length <= f32::EPSILON {
            Vector3::ZERO
        } else {
            Vector3::new(self.x / length, self.y / length, self.z / length)
        }
    }

    fn from_table(table: &Table) -> mlua::Result<Self> {
        Ok(Self {
            x: table.get::<Option<f32>>("x")?.unwrap_or_default(),
            y: table.get::<Option<f32>>("y")?.unwrap_or_default(),
            z: table.get::<Option<f32>>("z")?.unwrap_or_default(),
        })
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

impl UserData for Vector3 {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.x));
        fields.add_field_method_get("y", |_, this| Ok(this.y));
        fields.add_field_method_get("z", |_, this| Ok(this.z));
        fields.add_field_method_set("x", |_, this, value: f32| {
            this.x = value;
            Ok(())
        });
        fields.add_field_method_set("y", |_, this, value: f32| {
            this.y = value;
            Ok(())
        });
        fields.add_field_method_set("z", |_, this, value: f32| {
            this.z = value;
            Ok(())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("Distance", |_, this, other: Vector3| Ok(this.distance(&other)));
        methods.add_method("Magnitude", |_, this, ()| Ok(this.magnitude()));
        methods.add_method("Normalized", |_, this, ()| Ok(this.normalized()));

        methods.add_meta_method(MetaMethod::Add, |_, this, other: Vector3| Ok(*this + other));
        methods.add_meta_method(MetaMethod::Sub, |_, this, other: Vector3| Ok(*this - other));
        methods.add_meta_method(MetaMethod::Mul, |_, this, scalar: f32| Ok(*this * scalar));
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: Vector3| Ok(*this == other));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.to_string()));
    }
}

// Scripts may hand over either a proxy or a plain {x=, y=, z=} table.
impl FromLua for Vector3 {
    fn from_lua(value: Value, _lua: &Lua) -> mlua::Result<Self> {
        match value {
            Value::UserData(ud) => Ok(*ud.borrow::<Vector3>()?),
            Value::Table(table) => Vector3::from_table(&table),
            other => Err(mlua::Error::RuntimeError(format!(
                "expected Vector3 or table with x, y, z, got {}",
                other.type_name()
            ))),
        }
    }
}
