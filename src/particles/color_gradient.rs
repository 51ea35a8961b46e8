//! Color over lifetime
//!
//! An ordered list of `(position, color)` marks. The front mark always
//! mirrors the owning emitter's base color: every write goes through
//! `ColorGradient::from_marks` or `sync_base_color`, which force it back.

use super::particle_data::GpuColorMark;
use super::particle_operations::sample_gradient;
use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Lifetime position in `[0, 1]` and the RGBA color at that point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorMark {
    pub position: f32,
    pub color: Vec4,
}

impl ColorMark {
    pub fn new(position: f32, color: Vec4) -> Self {
        Self { position, color }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredGradient")]
pub struct ColorGradient {
    marks: Vec<ColorMark>,
}

/// Serialized shape; an empty list is repaired on load
#[derive(Deserialize)]
struct StoredGradient {
    marks: Vec<ColorMark>,
}

impl From<StoredGradient> for ColorGradient {
    fn from(stored: StoredGradient) -> Self {
        match stored.marks.first() {
            Some(front) => ColorGradient::from_marks(&stored.marks, front.color),
            None => ColorGradient::new(Vec4::ONE),
        }
    }
}

impl ColorGradient {
    /// Single mark at position 0 holding `base_color`
    pub fn new(base_color: Vec4) -> Self {
        Self {
            marks: vec![ColorMark::new(0.0, base_color)],
        }
    }

    /// Build from caller-supplied marks. Empty input collapses to one mark at
    /// 0; otherwise marks are kept as supplied except the front color, which
    /// is replaced by `base_color`.
    pub fn from_marks(marks: &[ColorMark], base_color: Vec4) -> Self {
        if marks.is_empty() {
            return Self::new(base_color);
        }

        let mut gradient = Self {
            marks: marks.to_vec(),
        };
        gradient.sync_base_color(base_color);
        gradient
    }

    pub fn sync_base_color(&mut self, base_color: Vec4) {
        match self.marks.first_mut() {
            Some(front) => front.color = base_color,
            None => self.marks.push(ColorMark::new(0.0, base_color)),
        }
    }

    pub fn marks(&self) -> &[ColorMark] {
        &self.marks
    }

    pub fn front(&self) -> &ColorMark {
        // never empty: every constructor leaves at least one mark
        &self.marks[0]
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Color at lifetime fraction `t`, using the same interpolation as the kernel
    pub fn sample(&self, t: f32) -> Vec4 {
        Vec4::from(sample_gradient(&self.to_gpu(), t))
    }

    pub fn to_gpu(&self) -> Vec<GpuColorMark> {
        self.marks
            .iter()
            .map(|mark| GpuColorMark {
                color: mark.color.to_array(),
                position: mark.position,
                _padding: [0.0; 3],
            })
            .collect()
    }
}
