//! Texel storage and per-format write rules for headless textures.

use crate::device::{BlendEquation, BlendFactor, Readback, TextureFormat};

#[derive(Debug, Clone)]
pub struct Image {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl Image {
    pub fn new(format: TextureFormat, width: u32, height: u32) -> Self {
        let fill = if format.is_depth() { [1.0, 0.0, 0.0, 1.0] } else { [0.0, 0.0, 0.0, 1.0] };
        Self { format, width, height, texels: vec![fill; (width as usize) * (height as usize)] }
    }

    /// Apply the storage rules of the format: missing channels read back as
    /// 0 (alpha as 1) and normalized formats clamp and quantize to 8 bits.
    pub fn store(format: TextureFormat, texel: [f32; 4]) -> [f32; 4] {
        let mut t = texel;
        if format.is_depth() {
            t = [t[0], 0.0, 0.0, 1.0];
        } else if !format.has_alpha() {
            t[3] = 1.0;
        }
        if format.is_normalized() {
            for c in &mut t {
                *c = (c.clamp(0.0, 1.0) * 255.0).round() / 255.0;
            }
        }
        t
    }

    pub fn fill(&mut self, texel: [f32; 4]) {
        let stored = Self::store(self.format, texel);
        self.texels.iter_mut().for_each(|t| *t = stored);
    }

    /// Nearest sample at normalized coordinates.
    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        if self.texels.is_empty() {
            return [0.0; 4];
        }
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }

    pub fn readback(&self) -> Readback {
        Readback { width: self.width, height: self.height, texels: self.texels.clone() }
    }
}

/// Fixed-function blend state captured at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blend {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub equation: BlendEquation,
}

impl Blend {
    fn factor(factor: BlendFactor, src: [f32; 4], dst: [f32; 4]) -> f32 {
        match factor {
            BlendFactor::Zero => 0.0,
            BlendFactor::One => 1.0,
            BlendFactor::SrcAlpha => src[3],
            BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
            BlendFactor::DstAlpha => dst[3],
            BlendFactor::OneMinusDstAlpha => 1.0 - dst[3],
        }
    }

    pub fn apply(&self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let fs = Self::factor(self.src, src, dst);
        let fd = Self::factor(self.dst, src, dst);
        let mut out = [0.0; 4];
        for i in 0..4 {
            let (s, d) = (src[i] * fs, dst[i] * fd);
            out[i] = match self.equation {
                BlendEquation::Add => s + d,
                BlendEquation::Subtract => s - d,
                BlendEquation::ReverseSubtract => d - s,
                BlendEquation::Min => src[i].min(dst[i]),
                BlendEquation::Max => src[i].max(dst[i]),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_formats_quantize() {
        let t = Image::store(TextureFormat::Rgb8, [0.2, 1.5, -1.0, 0.3]);
        assert_eq!(t, [51.0 / 255.0, 1.0, 0.0, 1.0]);
        assert_eq!(Image::store(TextureFormat::Rgba32F, [0.2, 1.5, -1.0, 0.3]), [0.2, 1.5, -1.0, 0.3]);
    }

    #[test]
    fn additive_blend_accumulates() {
        let blend = Blend { src: BlendFactor::One, dst: BlendFactor::One, equation: BlendEquation::Add };
        assert_eq!(blend.apply([0.25, 0.5, 0.0, 1.0], [0.25, 0.0, 1.0, 0.0]), [0.5, 0.5, 1.0, 1.0]);
    }
}
