//! Uniform declarations, per-frame values and their resolution into slots.
//!
//! A program declares its uniforms once, as a [`UniformTable`]. Each frame a
//! pass's binding function produces a [`Uniforms`] list of named, tagged
//! values. [`resolve`] matches the two up:
//!
//! - names the program does not declare are skipped (presets share binding
//!   functions across slightly different programs);
//! - values whose kind does not match the declared slot are skipped too;
//! - texture references are turned into the resource's current read target
//!   and given texture units 0, 1, 2, ... in binding order.
//!
//! ```
//! use flowline::{UniformDecl, UniformTable, Uniforms, resolve};
//!
//! let table = UniformTable::new(vec![
//!     UniformDecl::scalar("time"),
//!     UniformDecl::vec2("resolution"),
//! ]);
//! let values = Uniforms::new()
//!     .float("time", 1.5)
//!     .float("not_declared", 2.0)
//!     .vec2("resolution", [640.0, 480.0]);
//!
//! let bound = resolve(&table, &values, |_| None);
//! assert_eq!(bound.len(), 2);
//! ```

use glam::{Vec2, Vec3, Vec4};

use crate::pass_graph::ResourceId;
use crate::surface::TargetId;

/// Shape of a declared uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Texture,
}

/// One declared uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self { name, kind }
    }

    pub const fn scalar(name: &'static str) -> Self {
        Self::new(name, UniformKind::Scalar)
    }

    pub const fn vec2(name: &'static str) -> Self {
        Self::new(name, UniformKind::Vec2)
    }

    pub const fn vec3(name: &'static str) -> Self {
        Self::new(name, UniformKind::Vec3)
    }

    pub const fn vec4(name: &'static str) -> Self {
        Self::new(name, UniformKind::Vec4)
    }

    pub const fn texture(name: &'static str) -> Self {
        Self::new(name, UniformKind::Texture)
    }
}

/// The uniform slots of a compiled program, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformTable {
    decls: Vec<UniformDecl>,
}

impl UniformTable {
    pub fn new(decls: Vec<UniformDecl>) -> Self {
        Self { decls }
    }

    /// Slot index of `name`, if declared.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.decls.iter().position(|d| d.name == name)
    }

    pub fn get(&self, slot: usize) -> Option<&UniformDecl> {
        self.decls.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Name of the first declaration that appears twice, if any.
    pub fn duplicate(&self) -> Option<&'static str> {
        self.decls
            .iter()
            .enumerate()
            .find(|(i, d)| self.decls[..*i].iter().any(|e| e.name == d.name))
            .map(|(_, d)| d.name)
    }
}

/// A uniform value produced by a binding function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    /// The latest output of a graph resource. Feedback buffers resolve to
    /// their current read side.
    Texture(ResourceId),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Scalar(_) => UniformKind::Scalar,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }
}

/// Ordered list of named uniform values for one pass and one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Uniforms {
    entries: Vec<(&'static str, UniformValue)>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: UniformValue) -> Self {
        self.entries.push((name, value));
        self
    }

    pub fn float(self, name: &'static str, value: f32) -> Self {
        self.set(name, UniformValue::Scalar(value))
    }

    pub fn vec2(self, name: &'static str, value: impl Into<Vec2>) -> Self {
        self.set(name, UniformValue::Vec2(value.into()))
    }

    pub fn vec3(self, name: &'static str, value: impl Into<Vec3>) -> Self {
        self.set(name, UniformValue::Vec3(value.into()))
    }

    pub fn vec4(self, name: &'static str, value: impl Into<Vec4>) -> Self {
        self.set(name, UniformValue::Vec4(value.into()))
    }

    pub fn texture(self, name: &'static str, resource: ResourceId) -> Self {
        self.set(name, UniformValue::Texture(resource))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, UniformValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A uniform value ready for the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Texture { target: TargetId, unit: u32 },
}

/// A resolved uniform: declared slot plus concrete value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundUniform {
    pub slot: usize,
    pub name: &'static str,
    pub value: BoundValue,
}

/// Resolve `values` against `table`.
///
/// `lookup` maps a resource to the target that should be sampled right now.
/// Texture units are counted locally, starting at 0, and only resolved
/// textures consume a unit.
pub fn resolve<F>(table: &UniformTable, values: &Uniforms, lookup: F) -> Vec<BoundUniform>
where
    F: Fn(ResourceId) -> Option<TargetId>,
{
    let mut next_unit = 0u32;
    let mut bound = Vec::with_capacity(values.len());

    for &(name, value) in values.iter() {
        let Some(slot) = table.slot(name) else {
            log::trace!("uniform '{name}' not declared, skipped");
            continue;
        };
        let declared = table.decls[slot].kind;
        if declared != value.kind() {
            log::trace!("uniform '{name}' declared {declared:?}, got {:?}, skipped", value.kind());
            continue;
        }

        let value = match value {
            UniformValue::Scalar(v) => BoundValue::Scalar(v),
            UniformValue::Vec2(v) => BoundValue::Vec2(v.to_array()),
            UniformValue::Vec3(v) => BoundValue::Vec3(v.to_array()),
            UniformValue::Vec4(v) => BoundValue::Vec4(v.to_array()),
            UniformValue::Texture(resource) => {
                let Some(target) = lookup(resource) else {
                    log::trace!("uniform '{name}' references unknown resource {resource:?}");
                    continue;
                };
                let unit = next_unit;
                next_unit += 1;
                BoundValue::Texture { target, unit }
            }
        };
        bound.push(BoundUniform { slot, name, value });
    }

    bound
}
