//! Decode policy and safety limits
//!
//! The parameter set handed to LibRaw before `dcraw_process`. The default is
//! the policy used by every boundary entry point; callers that need a
//! different trade-off build their own `DecodeOptions` and pass it to
//! `DecodeBridge::with_options`.

use serde::{Deserialize, Serialize};

/// White balance mode for RAW processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhiteBalance {
    /// Use camera's white balance
    Camera,
    /// Auto white balance (average whole image)
    Auto,
    /// No white balance adjustment (raw sensor values)
    None,
    /// Custom RGB multipliers [r, g, b, g2]
    Custom([f32; 4]),
}

/// Output color space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Raw color space
    Raw = 0,
    /// sRGB (D65)
    SRGB = 1,
    /// Adobe RGB (1998) (D65)
    AdobeRGB = 2,
    /// Wide-gamut RGB (D50)
    WideGamutRGB = 3,
    /// Kodak ProPhoto RGB (D50)
    ProPhotoRGB = 4,
    /// XYZ
    XYZ = 5,
}

/// Demosaic interpolation quality (LibRaw `user_qual`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    /// Linear interpolation, fastest
    Linear = 0,
    /// VNG
    Vng = 1,
    /// PPG
    Ppg = 2,
    /// AHD
    Ahd = 3,
    /// DCB, highest quality and slowest
    Dcb = 4,
}

/// Gamma curve as (power, toe slope)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gamma {
    pub power: f64,
    pub slope: f64,
}

impl Gamma {
    /// sRGB transfer curve
    pub const SRGB: Gamma = Gamma { power: 2.4, slope: 12.92 };
}

/// RAW processing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    pub interpolation: Interpolation,

    /// Output bit depth. The RGB result layout only accepts 8.
    pub bit_depth: u8,

    pub color_space: ColorSpace,

    pub gamma: Gamma,

    /// Chromatic aberration scale [red, blue]. 1.0 means no correction.
    pub chromatic_aberration: (f64, f64),

    /// Median filter passes for noise reduction
    pub median_filter_passes: u8,

    pub white_balance: WhiteBalance,

    pub auto_brightness: bool,

    /// Half-size color image (2x2 downsampling)
    pub half_size: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Dcb,
            bit_depth: 8,
            color_space: ColorSpace::SRGB,
            gamma: Gamma::SRGB,
            chromatic_aberration: (1.0, 1.0),
            median_filter_passes: 1,
            white_balance: WhiteBalance::Camera,
            auto_brightness: false,
            half_size: false,
        }
    }
}

impl DecodeOptions {
    /// Fast preview preset
    /// Linear interpolation on a half-size image, no denoising
    pub fn preview() -> Self {
        Self {
            interpolation: Interpolation::Linear,
            median_filter_passes: 0,
            half_size: true,
            ..Self::default()
        }
    }

    /// Same output contract as the default, AHD instead of DCB and no median pass.
    pub fn balanced() -> Self {
        Self {
            interpolation: Interpolation::Ahd,
            median_filter_passes: 0,
            ..Self::default()
        }
    }
}

/// Bounds applied to a processed image before the result buffer is allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest accepted width or height
    pub max_dimension: u32,
    /// Largest accepted RGB payload (width * height * 3)
    pub max_pixel_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: 65_535,
            // ~500 megapixels at 3 bytes per pixel
            max_pixel_bytes: 1_500_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let opts = DecodeOptions::default();
        assert_eq!(opts.interpolation, Interpolation::Dcb);
        assert_eq!(opts.bit_depth, 8);
        assert_eq!(opts.color_space, ColorSpace::SRGB);
        assert_eq!(opts.gamma, Gamma::SRGB);
        assert_eq!(opts.chromatic_aberration, (1.0, 1.0));
        assert_eq!(opts.median_filter_passes, 1);
        assert_eq!(opts.white_balance, WhiteBalance::Camera);
        assert!(!opts.auto_brightness);
        assert!(!opts.half_size);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let opts: DecodeOptions =
            serde_json::from_str(r#"{ "interpolation": "Ahd", "half_size": true }"#).unwrap();
        assert_eq!(opts.interpolation, Interpolation::Ahd);
        assert!(opts.half_size);
        assert_eq!(opts.color_space, ColorSpace::SRGB);
        assert_eq!(opts.median_filter_passes, 1);
    }

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_dimension, 65_535);
        assert_eq!(limits.max_pixel_bytes, 1_500_000_000);
    }
}
