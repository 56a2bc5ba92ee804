// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::context::{TextureHandle, TextureUsage};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Type token of a port, compared when linking
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    /// Read-only texture
    Texture,
    /// Color attachment
    RenderTarget,
    /// Depth/stencil attachment
    DepthStencil,
    /// Camera parameters
    Camera,
    /// Entities to draw
    EntityList,
    /// Floating point value
    Float,
    /// Integer value
    Int,
    /// Boolean value
    Bool,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// String value
    String,
    /// Links to any type
    Any,
    /// Custom type
    Custom(String),
}

impl PortType {
    /// Human-readable type name
    pub fn name(&self) -> &str {
        match self {
            Self::Texture => "Texture",
            Self::RenderTarget => "RenderTarget",
            Self::DepthStencil => "DepthStencil",
            Self::Camera => "Camera",
            Self::EntityList => "EntityList",
            Self::Float => "Float",
            Self::Int => "Int",
            Self::Bool => "Bool",
            Self::Vector4 => "Vector4",
            Self::Color => "Color",
            Self::String => "String",
            Self::Any => "Any",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decides which output types may feed which input types.
///
/// A link is allowed when both types are equal, when either side is
/// [`PortType::Any`], or when the conversion `source -> target` was declared.
#[derive(Debug, Clone, Default)]
pub struct PortTypeRegistry {
    conversions: HashSet<(PortType, PortType)>,
}

impl PortTypeRegistry {
    /// Create a registry that only accepts exact matches and `Any`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the standard render pipeline conversions
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.declare_conversion(PortType::Int, PortType::Float);
        registry.declare_conversion(PortType::Float, PortType::Int);
        registry.declare_conversion(PortType::Vector4, PortType::Color);
        registry.declare_conversion(PortType::Color, PortType::Vector4);
        // Attachments can be sampled once written.
        registry.declare_conversion(PortType::RenderTarget, PortType::Texture);
        registry.declare_conversion(PortType::DepthStencil, PortType::Texture);
        registry
    }

    /// Declare that values of `from` may feed inputs of type `to`.
    ///
    /// Returns false if the conversion was already declared.
    pub fn declare_conversion(&mut self, from: PortType, to: PortType) -> bool {
        self.conversions.insert((from, to))
    }

    /// Check if an output of type `source` can be linked to an input of type `target`
    pub fn is_compatible(&self, source: &PortType, target: &PortType) -> bool {
        if matches!(source, PortType::Any) || matches!(target, PortType::Any) {
            return true;
        }
        if source == target {
            return true;
        }
        self.conversions.contains(&(source.clone(), target.clone()))
    }

    /// Number of declared conversions
    pub fn conversion_count(&self) -> usize {
        self.conversions.len()
    }
}

/// Descriptor of a single port on a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Data type
    pub port_type: PortType,
    /// Whether an input must be linked before the graph can run
    pub required: bool,
}

impl PortInfo {
    /// Create a new optional input port
    pub fn input(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            port_type,
            required: false,
        }
    }

    /// Create a new output port
    pub fn output(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            port_type,
            required: false,
        }
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Value published on an output port for the current frame
#[derive(Clone)]
pub enum PortValue {
    /// Texture allocated this frame
    Texture(TextureHandle),
    /// Float
    Float(f32),
    /// Integer
    Int(i32),
    /// Boolean
    Bool(bool),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color
    Color([f32; 4]),
    /// String
    String(String),
    /// Opaque shared value, read back with [`PortValue::downcast`]
    Shared(Arc<dyn Any + Send + Sync>),
}

impl PortValue {
    /// Get the port type for this value
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Texture(handle) => match handle.desc.usage {
                TextureUsage::ShaderResource => PortType::Texture,
                TextureUsage::RenderTarget => PortType::RenderTarget,
                TextureUsage::DepthStencil => PortType::DepthStencil,
            },
            Self::Float(_) => PortType::Float,
            Self::Int(_) => PortType::Int,
            Self::Bool(_) => PortType::Bool,
            Self::Vector4(_) => PortType::Vector4,
            Self::Color(_) => PortType::Color,
            Self::String(_) => PortType::String,
            Self::Shared(_) => PortType::Any,
        }
    }

    /// Get the texture handle, if this is a texture
    pub fn as_texture(&self) -> Option<&TextureHandle> {
        match self {
            Self::Texture(handle) => Some(handle),
            _ => None,
        }
    }

    /// Get a shared value of a concrete type
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Shared(value) => Arc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture(handle) => f.debug_tuple("Texture").field(handle).finish(),
            Self::Float(value) => f.debug_tuple("Float").field(value).finish(),
            Self::Int(value) => f.debug_tuple("Int").field(value).finish(),
            Self::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Self::Vector4(value) => f.debug_tuple("Vector4").field(value).finish(),
            Self::Color(value) => f.debug_tuple("Color").field(value).finish(),
            Self::String(value) => f.debug_tuple("String").field(value).finish(),
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}
