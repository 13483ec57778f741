//! Risk color ramp and the small numeric helpers behind it.
//!
//! The thresholds and stop colors are fixed: dashboards consuming the
//! snapshot render these exact hex values.

use crate::error::ColorError;

pub const GREEN: &str = "#2ecc71";
pub const YELLOW: &str = "#f1c40f";
pub const RED: &str = "#e74c3c";

pub const T_LOW: f64 = 0.0;
pub const T_MED: f64 = 0.6;
pub const T_HIGH: f64 = 1.2;

/// Luminance above which dark text is used on top of a color.
pub const DARK_TEXT_LUMINANCE: f64 = 0.55;

const GREEN_RGB: Rgb = Rgb::new(0x2e, 0xcc, 0x71);
const YELLOW_RGB: Rgb = Rgb::new(0xf1, 0xc4, 0x0f);
const RED_RGB: Rgb = Rgb::new(0xe7, 0x4c, 0x3c);

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorError::Format(hex.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| ColorError::Format(hex.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Component-wise interpolation, rounded back onto the 0..=255 grid.
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        Rgb::new(
            round_channel(lerp(self.r as f64, other.r as f64, t)),
            round_channel(lerp(self.g as f64, other.g as f64, t)),
            round_channel(lerp(self.b as f64, other.b as f64, t)),
        )
    }

    /// WCAG relative luminance in [0, 1].
    pub fn relative_luminance(self) -> f64 {
        let linear = |channel: u8| {
            let c = channel as f64 / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }
}

fn round_channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

pub fn hex_to_rgb(hex: &str) -> Result<(u8, u8, u8), ColorError> {
    let rgb = Rgb::from_hex(hex)?;
    Ok((rgb.r, rgb.g, rgb.b))
}

pub fn rgb_to_hex(r: f64, g: f64, b: f64) -> String {
    Rgb::new(round_channel(r), round_channel(g), round_channel(b)).to_hex()
}

pub fn lerp_color(hex_a: &str, hex_b: &str, t: f64) -> Result<String, ColorError> {
    let a = Rgb::from_hex(hex_a)?;
    let b = Rgb::from_hex(hex_b)?;
    Ok(a.lerp(b, t).to_hex())
}

pub fn relative_luminance(hex: &str) -> Result<f64, ColorError> {
    Ok(Rgb::from_hex(hex)?.relative_luminance())
}

pub(crate) fn intensity_to_rgb(intensity: f64) -> Rgb {
    if intensity <= T_MED {
        let t = (intensity - T_LOW) / (T_MED - T_LOW);
        GREEN_RGB.lerp(YELLOW_RGB, t.clamp(0.0, 1.0))
    } else if intensity <= T_HIGH {
        let t = (intensity - T_MED) / (T_HIGH - T_MED);
        YELLOW_RGB.lerp(RED_RGB, t.clamp(0.0, 1.0))
    } else {
        RED_RGB
    }
}

/// Green to yellow up to `T_MED`, yellow to red up to `T_HIGH`, red beyond.
pub fn intensity_to_color(intensity: f64) -> String {
    intensity_to_rgb(intensity).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ramp_hits_stop_colors_at_thresholds() {
        assert_eq!(intensity_to_color(0.0), GREEN);
        assert_eq!(intensity_to_color(T_MED), YELLOW);
        assert_eq!(intensity_to_color(T_HIGH), RED);
        assert_eq!(intensity_to_color(5.0), RED);
        assert_eq!(intensity_to_color(-1.0), GREEN);
    }

    #[test]
    fn ramp_interpolates_between_stops() {
        assert_eq!(intensity_to_color(0.12), "#55ca5d");
        // (46 + 241) / 2 = 143.5 -> 144
        assert_eq!(lerp_color(GREEN, YELLOW, 0.5).unwrap(), "#90c840");
    }

    #[test]
    fn luminance_bounds() {
        let white = relative_luminance("#ffffff").unwrap();
        let black = relative_luminance("#000000").unwrap();
        assert_relative_eq!(white, 1.0, epsilon = 1e-9);
        assert_relative_eq!(black, 0.0, epsilon = 1e-12);
        assert!(white > black);
    }

    #[test]
    fn stop_colors_pick_expected_text_contrast() {
        assert!(relative_luminance(YELLOW).unwrap() > DARK_TEXT_LUMINANCE);
        assert!(relative_luminance(GREEN).unwrap() <= DARK_TEXT_LUMINANCE);
        assert!(relative_luminance(RED).unwrap() <= DARK_TEXT_LUMINANCE);
    }

    #[test]
    fn hex_round_trip_is_case_insensitive() {
        for hex in ["#2ecc71", "#F1C40F", "e74c3c", "#000000", "#FfFfFf", "#0a0b0c"] {
            let (r, g, b) = hex_to_rgb(hex).unwrap();
            let back = rgb_to_hex(r as f64, g as f64, b as f64);
            let normalized = format!("#{}", hex.trim_start_matches('#').to_ascii_lowercase());
            assert_eq!(back, normalized);
        }
    }

    #[test]
    fn malformed_hex_is_rejected() {
        for bad in ["", "#fff", "#12345", "#1234567", "#gg0000", "12 456"] {
            assert_eq!(
                hex_to_rgb(bad),
                Err(ColorError::Format(bad.to_string())),
                "{bad} should not parse"
            );
        }
        assert!(lerp_color("#zzzzzz", GREEN, 0.5).is_err());
        assert!(relative_luminance("red").is_err());
    }

    #[test]
    fn rgb_to_hex_clamps_and_rounds() {
        assert_eq!(rgb_to_hex(-4.0, 255.6, 15.49), "#00ff0f");
        assert_eq!(rgb_to_hex(0.5, 1.5, 254.5), "#0102ff");
    }

    #[test]
    fn lerp_does_not_clamp_t() {
        assert_relative_eq!(lerp(0.0, 10.0, 1.5), 15.0);
        assert_relative_eq!(lerp(2.0, 4.0, -0.5), 1.0);
        assert_eq!(lerp_color(GREEN, RED, 1.0).unwrap(), RED);
    }
}
