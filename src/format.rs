//! Raw video pixel formats.
//!
//! Maps the `format` field of negotiated `video/x-raw` caps to the channel count
//! and element type needed to reshape a buffer into an array.

use anyhow::{anyhow, Result};
use std::fmt;

/// Element type of a single channel sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    U8,
    U16Le,
    U16Be,
}

impl ElementType {
    /// Bytes per channel sample.
    pub fn byte_width(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::U16Le | ElementType::U16Be => 2,
        }
    }

    /// Array element type name as logged for each frame.
    pub fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::U16Le | ElementType::U16Be => "u16",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packed raw video formats the tap can reshape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Argb,
    Abgr,
    Rgbx,
    Bgrx,
    Xrgb,
    Xbgr,
    Gray8,
    Gray16Le,
    Gray16Be,
}

const CAPS_NAMES: &[(&str, PixelFormat)] = &[
    ("RGB", PixelFormat::Rgb),
    ("BGR", PixelFormat::Bgr),
    ("RGBA", PixelFormat::Rgba),
    ("BGRA", PixelFormat::Bgra),
    ("ARGB", PixelFormat::Argb),
    ("ABGR", PixelFormat::Abgr),
    ("RGBx", PixelFormat::Rgbx),
    ("BGRx", PixelFormat::Bgrx),
    ("xRGB", PixelFormat::Xrgb),
    ("xBGR", PixelFormat::Xbgr),
    ("GRAY8", PixelFormat::Gray8),
    ("GRAY16_LE", PixelFormat::Gray16Le),
    ("GRAY16_BE", PixelFormat::Gray16Be),
];

impl PixelFormat {
    /// Parse a caps format string (case-sensitive, as negotiated).
    pub fn from_caps_str(value: &str) -> Result<Self> {
        CAPS_NAMES
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, format)| *format)
            .ok_or_else(|| anyhow!("unsupported raw video format {:?}", value))
    }

    pub fn as_caps_str(self) -> &'static str {
        CAPS_NAMES
            .iter()
            .find(|(_, format)| *format == self)
            .map(|(name, _)| *name)
            .unwrap_or("RGB")
    }

    /// Channels per pixel. Padding bytes (`x`) count as a channel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Gray8 | PixelFormat::Gray16Le | PixelFormat::Gray16Be => 1,
            _ => 4,
        }
    }

    pub fn element(self) -> ElementType {
        match self {
            PixelFormat::Gray16Le => ElementType::U16Le,
            PixelFormat::Gray16Be => ElementType::U16Be,
            _ => ElementType::U8,
        }
    }

    /// Bytes per pixel.
    pub fn pixel_stride(self) -> usize {
        self.channels() * self.element().byte_width()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_caps_str())
    }
}
