// SPDX-License-Identifier: MIT OR Apache-2.0
//! Color conversion nodes.
//!
//! Every node here accepts the `Color` union, so an input may receive HSV,
//! HSL, RGB or hex values interchangeably.

use crate::schemas::{color, hex, rgb};
use bitspace_circuit::{IdGenerator, Node, NodeCategory, NodeError, NodeRegistry, NodeType, Value};

/// Linear RGB triple in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    /// Red
    pub red: f64,
    /// Green
    pub green: f64,
    /// Blue
    pub blue: f64,
}

impl Rgb {
    /// Black
    pub const BLACK: Rgb = Rgb {
        red: 0.0,
        green: 0.0,
        blue: 0.0,
    };

    /// Interpret any value accepted by the `Color` schema
    pub fn from_value(value: &Value) -> Option<Rgb> {
        if let Some(s) = value.as_str() {
            return Self::from_hex(s);
        }
        let field = |name: &str| value.field(name).and_then(Value::as_number);
        if let (Some(red), Some(green), Some(blue)) = (field("red"), field("green"), field("blue")) {
            return Some(Rgb { red, green, blue }.clamped());
        }
        let (hue, saturation) = (field("hue")?, field("saturation")?);
        if let Some(v) = field("value") {
            return Some(Self::from_hsv(hue, saturation, v));
        }
        field("luminance").map(|l| Self::from_hsl(hue, saturation, l))
    }

    fn clamped(self) -> Rgb {
        Rgb {
            red: self.red.clamp(0.0, 1.0),
            green: self.green.clamp(0.0, 1.0),
            blue: self.blue.clamp(0.0, 1.0),
        }
    }

    fn from_sector(hue: f64, chroma: f64, offset: f64) -> Rgb {
        let h = (hue.rem_euclid(360.0)) / 60.0;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        Rgb {
            red: r + offset,
            green: g + offset,
            blue: b + offset,
        }
        .clamped()
    }

    /// Convert from hue (degrees), saturation and value
    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Rgb {
        let chroma = value * saturation;
        Self::from_sector(hue, chroma, value - chroma)
    }

    /// Convert from hue (degrees), saturation and luminance
    pub fn from_hsl(hue: f64, saturation: f64, luminance: f64) -> Rgb {
        let chroma = (1.0 - (2.0 * luminance - 1.0).abs()) * saturation;
        Self::from_sector(hue, chroma, luminance - chroma / 2.0)
    }

    /// Parse `#rgb` or `#rrggbb`
    pub fn from_hex(hex: &str) -> Option<Rgb> {
        let digits = hex.strip_prefix('#')?;
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return None,
        };
        let channel = |i: usize| {
            let byte = u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok()?;
            Some(f64::from(byte) / 255.0)
        };
        Some(Rgb {
            red: channel(0)?,
            green: channel(2)?,
            blue: channel(4)?,
        })
    }

    /// Format as `#rrggbb`
    pub fn to_hex(self) -> String {
        let byte = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", byte(self.red), byte(self.green), byte(self.blue))
    }

    /// As an RGB object value
    pub fn to_value(self) -> Value {
        Value::object([
            ("red", Value::Number(self.red)),
            ("green", Value::Number(self.green)),
            ("blue", Value::Number(self.blue)),
        ])
    }
}

/// Any color to `#rrggbb`
pub fn to_hex(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("color_to_hex", ids)
        .name("To Hex")
        .input("color", "Color", color(), Value::from("#000000"))
        .output("hex", "Hex", hex().shared(), &["color"], |values| {
            Value::String(Rgb::from_value(&values[0]).unwrap_or(Rgb::BLACK).to_hex())
        })
        .build()
}

/// Any color to an RGB object
pub fn to_rgb(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("color_to_rgb", ids)
        .name("To RGB")
        .input("color", "Color", color(), Value::from("#000000"))
        .output("rgb", "RGB", rgb().shared(), &["color"], |values| {
            Rgb::from_value(&values[0]).unwrap_or(Rgb::BLACK).to_value()
        })
        .build()
}

/// Register every color node
pub fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeType::new("color_to_hex", "To Hex", NodeCategory::Color, to_hex).with_description("Formats a color as a hex string"),
    );
    registry.register(
        NodeType::new("color_to_rgb", "To RGB", NodeCategory::Color, to_rgb).with_description("Converts a color to RGB channels"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitspace_circuit::SequentialIds;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(Rgb::from_hex("#fff").map(Rgb::to_hex), Some("#ffffff".to_string()));
        assert_eq!(Rgb::from_hex("#ff8000").map(Rgb::to_hex), Some("#ff8000".to_string()));
        assert_eq!(Rgb::from_hex("ff8000"), None);
        assert_eq!(Rgb::from_hex("#zzz"), None);
    }

    #[test]
    fn test_hsv_and_hsl_conversion() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0).to_hex(), "#ff0000");
        assert_eq!(Rgb::from_hsv(120.0, 1.0, 1.0).to_hex(), "#00ff00");
        assert_eq!(Rgb::from_hsl(240.0, 1.0, 0.5).to_hex(), "#0000ff");
        assert_eq!(Rgb::from_hsl(0.0, 0.0, 1.0).to_hex(), "#ffffff");
    }

    #[test]
    fn test_to_hex_node_accepts_every_color_variant() {
        let ids = SequentialIds::default();
        let node = to_hex(&ids).unwrap();
        let input = node.input("color").unwrap();
        let output = node.output("hex").unwrap();
        assert_eq!(output.value(), Some(Value::from("#000000")));

        let hsl = Value::object([
            ("hue", Value::from(120)),
            ("saturation", Value::from(1)),
            ("luminance", Value::from(0.5)),
        ]);
        input.next(hsl).unwrap();
        assert_eq!(output.value(), Some(Value::from("#00ff00")));

        input.next(Value::from("#abc")).unwrap();
        assert_eq!(output.value(), Some(Value::from("#aabbcc")));

        assert!(input.next(Value::from(12)).is_err());
        assert_eq!(output.value(), Some(Value::from("#aabbcc")));
    }
}
