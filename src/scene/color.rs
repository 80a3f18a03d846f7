use std::fmt;

use serde::{Deserialize, Serialize};

/// 8-bit sRGB color, carried on the wire as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` or `#rgb`, with or without the leading `#`,
    /// case-insensitive. Anything else (named CSS colors, `rgb(...)`) is
    /// `None`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            6 => Some(Self {
                r: channel(&digits[0..2])?,
                g: channel(&digits[2..4])?,
                b: channel(&digits[4..6])?,
            }),
            3 => {
                // #abc expands to #aabbcc
                let short = |i: usize| channel(&digits[i..i + 1]).map(|v| v * 17);
                Some(Self {
                    r: short(0)?,
                    g: short(1)?,
                    b: short(2)?,
                })
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Channels scaled to `0.0..=1.0`.
    pub fn to_unit(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }

    /// Inverse of [`Rgb::to_unit`], clamping out-of-range channels.
    pub fn from_unit(unit: [f32; 3]) -> Self {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            r: quantize(unit[0]),
            g: quantize(unit[1]),
            b: quantize(unit[2]),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from(color: (u8, u8, u8)) -> Self {
        Self::new(color.0, color.1, color.2)
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_hex()
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value).ok_or_else(|| format!("\"{value}\" is not a #rrggbb color"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("#af00F0", Rgb::new(0xaf, 0x00, 0xf0) ; "long with hash")]
    #[test_case("0FFF00", Rgb::new(0x0f, 0xff, 0x00) ; "long without hash")]
    #[test_case("#0ff", Rgb::new(0x00, 0xff, 0xff) ; "short form")]
    #[test_case("  #ffffff ", Rgb::new(255, 255, 255) ; "surrounding whitespace")]
    fn test_from_hex_accepts(input: &str, expected: Rgb) {
        assert_eq!(Rgb::from_hex(input), Some(expected));
    }

    #[test_case("red" ; "named color")]
    #[test_case("#12345" ; "wrong length")]
    #[test_case("#gg0000" ; "non hex digit")]
    #[test_case("#ééé" ; "non ascii")]
    fn test_from_hex_rejects(input: &str) {
        assert_eq!(Rgb::from_hex(input), None);
    }

    #[test]
    fn test_hex_formatting_is_lowercase() {
        assert_eq!(Rgb::new(0xAF, 0x00, 0xF0).to_hex(), "#af00f0");
        assert_eq!(Rgb::new(1, 2, 3).to_string(), "#010203");
    }

    #[test]
    fn test_unit_conversion_clamps() {
        assert_eq!(Rgb::from_unit([1.5, -0.2, 0.5]), Rgb::new(255, 0, 128));
        assert_eq!(Rgb::from_unit(Rgb::new(12, 200, 99).to_unit()), Rgb::new(12, 200, 99));
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let json = serde_json::to_string(&Rgb::new(0, 255, 16)).unwrap();
        assert_eq!(json, "\"#00ff10\"");
        let parsed: Rgb = serde_json::from_str("\"#00FF10\"").unwrap();
        assert_eq!(parsed, Rgb::new(0, 255, 16));
        assert!(serde_json::from_str::<Rgb>("\"blue\"").is_err());
    }
}
