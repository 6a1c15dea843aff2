use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{LightSyncError, Result};

pub const MAX_HUE: u16 = 360;
pub const MAX_SATURATION: u8 = 100;
pub const MAX_VALUE: u8 = 100;

/// Color in the units smart bulbs accept: hue in degrees, saturation and
/// value in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HsvFields")]
pub struct Hsv {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl Hsv {
    /// Builds a color, rejecting channels outside their ranges.
    pub fn new(hue: u16, saturation: u8, value: u8) -> Result<Self> {
        if hue > MAX_HUE {
            return Err(LightSyncError::validation(format!(
                "hue {hue} must be between 0 and {MAX_HUE} inclusive"
            )));
        }
        if saturation > MAX_SATURATION || value > MAX_VALUE {
            return Err(LightSyncError::validation(format!(
                "saturation {saturation} and value {value} must be between 0 and 100 inclusive"
            )));
        }
        Ok(Self {
            hue,
            saturation,
            value,
        })
    }

    /// Fully saturated, full brightness color at `hue` degrees.
    pub fn from_hue(hue: u16) -> Self {
        Self {
            hue: hue.min(MAX_HUE),
            saturation: MAX_SATURATION,
            value: MAX_VALUE,
        }
    }

    /// Blends each channel independently between `self` (weight 0) and
    /// `other` (weight 1). Results are truncated, not rounded.
    ///
    /// Hue is treated as a plain number, so blending 350 and 10 passes
    /// through green rather than across red.
    pub fn lerp(self, other: Hsv, weight: f32) -> Hsv {
        let weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        Hsv {
            hue: lerp_channel(self.hue as f32, other.hue as f32, weight) as u16,
            saturation: lerp_channel(self.saturation as f32, other.saturation as f32, weight)
                as u8,
            value: lerp_channel(self.value as f32, other.value as f32, weight) as u8,
        }
    }
}

#[derive(Deserialize)]
struct HsvFields {
    hue: u16,
    saturation: u8,
    value: u8,
}

impl TryFrom<HsvFields> for Hsv {
    type Error = LightSyncError;

    fn try_from(fields: HsvFields) -> Result<Self> {
        Hsv::new(fields.hue, fields.saturation, fields.value)
    }
}

fn lerp_channel(low: f32, high: f32, weight: f32) -> f32 {
    low + (high - low) * weight
}

impl fmt::Display for Hsv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsv({}, {}%, {}%)", self.hue, self.saturation, self.value)
    }
}

/// 8-bit RGB triple as typed by users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Converts to bulb HSV units, truncating each normalised ratio.
    pub fn to_hsv(self) -> Hsv {
        let r = self.red as f64;
        let g = self.green as f64;
        let b = self.blue as f64;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);

        let (hue, saturation) = if max == min {
            (0.0, 0.0)
        } else {
            let span = max - min;
            let rc = (max - r) / span;
            let gc = (max - g) / span;
            let bc = (max - b) / span;
            let sector = if r == max {
                bc - gc
            } else if g == max {
                2.0 + rc - bc
            } else {
                4.0 + gc - rc
            };
            ((sector / 6.0).rem_euclid(1.0), span / max)
        };

        Hsv {
            hue: ((hue * 360.0) as u16).min(MAX_HUE),
            saturation: ((saturation * 100.0) as u8).min(MAX_SATURATION),
            value: ((max * 100.0 / 255.0) as u8).min(MAX_VALUE),
        }
    }
}

impl From<Rgb> for Hsv {
    fn from(value: Rgb) -> Self {
        value.to_hsv()
    }
}

/// Ordered list of colors a run cycles or blends through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaletteFields")]
pub struct Palette {
    colors: Vec<Hsv>,
}

#[derive(Deserialize)]
struct PaletteFields {
    colors: Vec<Hsv>,
}

impl TryFrom<PaletteFields> for Palette {
    type Error = LightSyncError;

    fn try_from(fields: PaletteFields) -> Result<Self> {
        Palette::new(fields.colors)
    }
}

impl Palette {
    pub fn new(colors: Vec<Hsv>) -> Result<Self> {
        if colors.is_empty() {
            return Err(LightSyncError::validation(
                "palette must contain at least one color",
            ));
        }
        Ok(Self { colors })
    }

    pub fn colors(&self) -> &[Hsv] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color for the `index`-th emitted event, wrapping around the palette.
    pub fn cycle(&self, index: usize) -> Hsv {
        self.colors[index % self.colors.len()]
    }
}

/// Parses `r,g,b;r,g,b;...` with every channel in 0..=255.
impl FromStr for Palette {
    type Err = LightSyncError;

    fn from_str(text: &str) -> Result<Self> {
        let colors = text
            .split(';')
            .map(parse_rgb)
            .map(|rgb| rgb.map(Rgb::to_hsv))
            .collect::<Result<Vec<_>>>()?;
        Palette::new(colors)
    }
}

fn parse_rgb(fragment: &str) -> Result<Rgb> {
    let components: Vec<&str> = fragment.split(',').collect();
    if components.len() != 3 {
        return Err(LightSyncError::validation(format!(
            "`{fragment}` is not a comma-separated set of three numbers"
        )));
    }

    let mut channels = [0u8; 3];
    for (slot, component) in channels.iter_mut().zip(&components) {
        let trimmed = component.trim();
        let value: i64 = trimmed.parse().map_err(|_| {
            LightSyncError::validation(format!("`{trimmed}` is not a valid number"))
        })?;
        *slot = u8::try_from(value).map_err(|_| {
            LightSyncError::validation(format!("{value} must be between 0 and 255 inclusive"))
        })?;
    }

    Ok(Rgb::new(channels[0], channels[1], channels[2]))
}
