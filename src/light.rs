use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Directional light; the only kind consumed by the render passes.
///
/// `direction` is used as given, without normalization. The shadow pass
/// places the light eye at `-direction * 10`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.2, -1.0, -0.3),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Point light. Stored but not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// Spot light. Stored but not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub cutoff_degrees: f32,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    pub fn color(&self) -> Vec3 {
        match self {
            Self::Directional(light) => light.color,
            Self::Point(light) => light.color,
            Self::Spot(light) => light.color,
        }
    }

    pub fn intensity(&self) -> f32 {
        match self {
            Self::Directional(light) => light.intensity,
            Self::Point(light) => light.intensity,
            Self::Spot(light) => light.intensity,
        }
    }

    pub fn as_directional(&self) -> Option<&DirectionalLight> {
        match self {
            Self::Directional(light) => Some(light),
            _ => None,
        }
    }
}

impl From<DirectionalLight> for Light {
    fn from(light: DirectionalLight) -> Self {
        Self::Directional(light)
    }
}
