//! Maps matrix values to display colors.
//!
//! Pure functions only; how a color is rendered is up to the caller.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::Cell;

/// Default magnitude at which the diverging scale saturates
pub const DEFAULT_SATURATION: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColorScale {
    /// White at zero, red for negative, blue for positive. Full intensity at
    /// `|value| >= saturation`.
    DivergingRedBlue { saturation: f64 },
    /// Text only
    None,
}

impl Default for ColorScale {
    fn default() -> Self {
        Self::DivergingRedBlue {
            saturation: DEFAULT_SATURATION,
        }
    }
}

impl ColorScale {
    /// Diverging scale with a checked saturation magnitude
    pub fn diverging(saturation: f64) -> Result<Self, ValidationError> {
        if !saturation.is_finite() || saturation <= 0.0 {
            return Err(ValidationError::InvalidSaturation(saturation));
        }
        Ok(Self::DivergingRedBlue { saturation })
    }
}

/// Color for one value, `None` when the scale is textual or the value is not
/// finite
#[must_use]
pub fn color_of(value: f64, scale: ColorScale) -> Option<Rgb> {
    let ColorScale::DivergingRedBlue { saturation } = scale else {
        return None;
    };
    if !value.is_finite() || !saturation.is_finite() || saturation <= 0.0 {
        return None;
    }

    let t = (value.abs() / saturation).min(1.0);
    let fade = (255.0 * (1.0 - t)).round() as u8;
    Some(if value < 0.0 {
        Rgb::new(255, fade, fade)
    } else if value > 0.0 {
        Rgb::new(fade, fade, 255)
    } else {
        Rgb::WHITE
    })
}

/// Sentinel cells are never colored
#[must_use]
pub fn cell_color(cell: &Cell, scale: ColorScale) -> Option<Rgb> {
    cell.value().and_then(|v| color_of(v, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE: ColorScale = ColorScale::DivergingRedBlue { saturation: 10.0 };

    #[test]
    fn test_zero_is_white() {
        assert_eq!(color_of(0.0, SCALE), Some(Rgb::WHITE));
        assert_eq!(color_of(-0.0, SCALE), Some(Rgb::WHITE));
    }

    #[test]
    fn test_sign_picks_hue() {
        assert_eq!(color_of(5.0, SCALE), Some(Rgb::new(128, 128, 255)));
        assert_eq!(color_of(-5.0, SCALE), Some(Rgb::new(255, 128, 128)));
    }

    #[test]
    fn test_saturates_at_magnitude() {
        assert_eq!(color_of(10.0, SCALE), Some(Rgb::new(0, 0, 255)));
        assert_eq!(color_of(250.0, SCALE), Some(Rgb::new(0, 0, 255)));
        assert_eq!(color_of(-1e9, SCALE), Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_no_color() {
        assert_eq!(color_of(5.0, ColorScale::None), None);
        assert_eq!(color_of(f64::NAN, SCALE), None);
        assert_eq!(color_of(f64::INFINITY, SCALE), None);
        assert_eq!(
            color_of(1.0, ColorScale::DivergingRedBlue { saturation: 0.0 }),
            None
        );
    }

    #[test]
    fn test_cell_color() {
        assert_eq!(cell_color(&Cell::Failed, SCALE), None);
        assert_eq!(cell_color(&Cell::NotComputable, SCALE), None);
        assert_eq!(cell_color(&Cell::Value(0.0), SCALE), Some(Rgb::WHITE));
    }

    #[test]
    fn test_diverging_rejects_bad_saturation() {
        assert!(ColorScale::diverging(0.0).is_err());
        assert!(ColorScale::diverging(f64::NAN).is_err());
        assert_eq!(
            ColorScale::diverging(25.0),
            Ok(ColorScale::DivergingRedBlue { saturation: 25.0 })
        );
    }
}
