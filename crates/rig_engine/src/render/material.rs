//! Material type definitions
//!
//! Materials are plain descriptions; the backend turns them into resources
//! and hands back a [`MaterialHandle`](super::MaterialHandle).

use crate::foundation::math::Vec3;

/// Parameters for lit surfaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardMaterialParams {
    /// Base color (linear RGB)
    pub base_color: Vec3,
    /// Opacity
    pub alpha: f32,
    /// Metalness in `[0, 1]`
    pub metallic: f32,
    /// Roughness in `[0, 1]`
    pub roughness: f32,
}

impl Default for StandardMaterialParams {
    fn default() -> Self {
        Self {
            base_color: Vec3::new(0.8, 0.8, 0.8),
            alpha: 1.0,
            metallic: 0.0,
            roughness: 0.7,
        }
    }
}

/// Parameters for flat-colored surfaces and lines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnlitMaterialParams {
    /// Color (linear RGB)
    pub color: Vec3,
    /// Opacity
    pub alpha: f32,
}

impl Default for UnlitMaterialParams {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 1.0),
            alpha: 1.0,
        }
    }
}

/// Blending behavior
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AlphaMode {
    /// Fully opaque
    #[default]
    Opaque,
    /// Alpha blended
    Blend,
}

/// Shading model of a material
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialType {
    /// Lit surface
    StandardPBR(StandardMaterialParams),
    /// Unlit surface
    Unlit(UnlitMaterialParams),
    /// Either of the above with blending
    Transparent {
        /// Underlying shading
        base_material: Box<MaterialType>,
        /// Blending mode
        alpha_mode: AlphaMode,
    },
}

/// Surface description
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Shading model and parameters
    pub material_type: MaterialType,
    /// Debug name
    pub name: Option<String>,
}

impl Material {
    /// Lit material
    pub fn standard_pbr(params: StandardMaterialParams) -> Self {
        Self {
            material_type: MaterialType::StandardPBR(params),
            name: None,
        }
    }

    /// Unlit material
    pub fn unlit(params: UnlitMaterialParams) -> Self {
        Self {
            material_type: MaterialType::Unlit(params),
            name: None,
        }
    }

    /// Blended unlit material
    pub fn transparent_unlit(params: UnlitMaterialParams) -> Self {
        Self {
            material_type: MaterialType::Transparent {
                base_material: Box::new(MaterialType::Unlit(params)),
                alpha_mode: AlphaMode::Blend,
            },
            name: None,
        }
    }

    /// Builder pattern: debug name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// RGBA color used by backends without lighting
    pub fn base_color(&self) -> [f32; 4] {
        fn rgba(material_type: &MaterialType) -> [f32; 4] {
            match material_type {
                MaterialType::StandardPBR(p) => [p.base_color.x, p.base_color.y, p.base_color.z, p.alpha],
                MaterialType::Unlit(p) => [p.color.x, p.color.y, p.color.z, p.alpha],
                MaterialType::Transparent { base_material, .. } => rgba(base_material),
            }
        }
        rgba(&self.material_type)
    }

    /// Whether the material blends
    pub fn is_transparent(&self) -> bool {
        matches!(
            self.material_type,
            MaterialType::Transparent {
                alpha_mode: AlphaMode::Blend,
                ..
            }
        )
    }
}

/// Color from a `0xRRGGBB` literal
pub fn hex_color(rgb: u32) -> Vec3 {
    Vec3::new(
        ((rgb >> 16) & 0xff) as f32 / 255.0,
        ((rgb >> 8) & 0xff) as f32 / 255.0,
        (rgb & 0xff) as f32 / 255.0,
    )
}
