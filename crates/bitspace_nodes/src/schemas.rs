// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schemas shared by the node catalog.

use bitspace_circuit::{Schema, SchemaKind};
use std::sync::Arc;

/// Accepts anything
pub fn any() -> Arc<Schema> {
    Schema::any("Any").shared()
}

/// Strings
pub fn string() -> Arc<Schema> {
    Schema::string("String").shared()
}

/// Numbers
pub fn number() -> Arc<Schema> {
    Schema::number("Number").shared()
}

/// Booleans
pub fn boolean() -> Arc<Schema> {
    Schema::boolean("Boolean").shared()
}

fn unit(max: f64) -> Schema {
    Schema::number_in("Number", 0.0, max)
}

/// `{ hue, saturation, value }`
pub fn hsv() -> Schema {
    Schema::object(
        "HSV",
        [("hue", unit(360.1)), ("saturation", unit(1.1)), ("value", unit(1.1))],
    )
}

/// `{ hue, saturation, luminance }`
pub fn hsl() -> Schema {
    Schema::object(
        "HSL",
        [("hue", unit(360.1)), ("saturation", unit(1.1)), ("luminance", unit(1.1))],
    )
}

/// `{ red, green, blue }` in `[0, 1]`
pub fn rgb() -> Schema {
    Schema::object(
        "RGB",
        [("red", unit(1.01)), ("green", unit(1.01)), ("blue", unit(1.01))],
    )
}

/// `#rgb` or `#rrggbb`
pub fn hex() -> Schema {
    Schema::new(
        "Hex",
        SchemaKind::String {
            starts_with: Some("#".to_string()),
            min_len: Some(4),
            max_len: Some(7),
        },
    )
}

/// Any of HSV, HSL, RGB or Hex, tried in that order
pub fn color() -> Arc<Schema> {
    Schema::union("Color", [hsv(), hsl(), rgb(), hex()]).shared()
}
