//! Frame layout inspection and array reshaping.
//!
//! - `FrameLayout`: negotiated width, height, pixel format and row stride.
//! - `FrameView`: borrowed pointer+length view over a mapped pixel buffer.
//! - `FrameArray`: owned n-dimensional copy of the frame, `(height, width, channels)`
//!   when the buffer size matches the layout, a flat buffer otherwise.

use anyhow::{anyhow, Context, Result};
use ndarray::{ArrayD, ArrayView3, IxDyn, ShapeBuilder};

use crate::format::{ElementType, PixelFormat};

/// Negotiated layout of a single decoded frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes between the start of consecutive rows.
    pub stride: usize,
}

impl FrameLayout {
    /// Layout with tightly packed rows.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            stride: width as usize * format.pixel_stride(),
        }
    }

    /// Override the row stride reported by the engine.
    pub fn with_stride(mut self, stride: usize) -> Result<Self> {
        if stride < self.row_bytes() {
            return Err(anyhow!(
                "row stride {} is smaller than a packed {} row of {} bytes",
                stride,
                self.format,
                self.row_bytes()
            ));
        }
        self.stride = stride;
        Ok(self)
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn element(&self) -> ElementType {
        self.format.element()
    }

    /// Bytes of pixel data in one row, excluding stride padding.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.pixel_stride()
    }

    /// Minimum buffer length that covers every row at the current stride.
    pub fn required_len(&self) -> usize {
        if self.height == 0 || self.width == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + self.row_bytes()
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, self.channels()]
    }

    fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }
}

/// Borrowed view over the raw bytes of a mapped frame buffer.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    layout: FrameLayout,
    data: &'a [u8],
}

impl<'a> FrameView<'a> {
    pub fn new(layout: FrameLayout, data: &'a [u8]) -> Self {
        Self { layout, data }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Zero-copy `(height, width, channels)` view for 8-bit formats.
    ///
    /// Row padding is skipped through the outer stride, so the buffer is never copied.
    pub fn pixels(&self) -> Result<ArrayView3<'a, u8>> {
        if self.layout.element() != ElementType::U8 {
            return Err(anyhow!(
                "{} frames have {} samples; use to_array() instead",
                self.layout.format,
                self.layout.element()
            ));
        }
        let needed = self.layout.required_len();
        if self.data.len() < needed {
            return Err(anyhow!(
                "frame buffer too short: {} bytes for {}x{} {} at stride {} (need {})",
                self.data.len(),
                self.layout.width,
                self.layout.height,
                self.layout.format,
                self.layout.stride,
                needed
            ));
        }
        let [h, w, c] = self.layout.shape();
        ArrayView3::from_shape((h, w, c).strides((self.layout.stride, c, 1)), &self.data[..needed])
            .context("build strided frame view")
    }

    /// Pixel bytes with row padding removed.
    ///
    /// Buffers that do not cover the padded layout are returned whole.
    fn compact_bytes(&self) -> Vec<u8> {
        if self.layout.is_packed() || self.data.len() < self.layout.required_len() {
            return self.data.to_vec();
        }
        let row_bytes = self.layout.row_bytes();
        let mut pixels = Vec::with_capacity(row_bytes * self.layout.height as usize);
        for row in self.data.chunks(self.layout.stride).take(self.layout.height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        pixels
    }

    /// Copy the frame into an owned array.
    ///
    /// The shape is `(height, width, channels)` when that accounts for every element,
    /// otherwise the flat element count. Axes of length 1 are then squeezed out.
    pub fn to_array(&self) -> Result<FrameArray> {
        let bytes = self.compact_bytes();
        let element = self.layout.element();
        let width = element.byte_width();
        if bytes.len() % width != 0 {
            return Err(anyhow!(
                "frame buffer of {} bytes is not a whole number of {} samples",
                bytes.len(),
                element
            ));
        }
        let count = bytes.len() / width;
        let [h, w, c] = self.layout.shape();
        let mut shape = if h * w * c == count {
            vec![h, w, c]
        } else {
            log::debug!(
                "frame buffer holds {} samples, expected {}x{}x{}; keeping it flat",
                count,
                h,
                w,
                c
            );
            vec![count]
        };
        shape.retain(|&dim| dim != 1);

        let array = match element {
            ElementType::U8 => FrameArray::U8(
                ArrayD::from_shape_vec(IxDyn(&shape), bytes).context("reshape u8 frame")?,
            ),
            ElementType::U16Le => {
                let samples: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                FrameArray::U16(
                    ArrayD::from_shape_vec(IxDyn(&shape), samples).context("reshape u16 frame")?,
                )
            }
            ElementType::U16Be => {
                let samples: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                FrameArray::U16(
                    ArrayD::from_shape_vec(IxDyn(&shape), samples).context("reshape u16 frame")?,
                )
            }
        };
        Ok(array)
    }
}

/// Owned frame array.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameArray {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
}

impl FrameArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            FrameArray::U8(array) => array.shape(),
            FrameArray::U16(array) => array.shape(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            FrameArray::U8(_) => ElementType::U8.name(),
            FrameArray::U16(_) => ElementType::U16Le.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FrameArray::U8(array) => array.len(),
            FrameArray::U16(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_layout(width: u32, height: u32) -> FrameLayout {
        FrameLayout::new(width, height, PixelFormat::Rgb)
    }

    #[test]
    fn packed_rgb_reshapes_to_hwc() -> Result<()> {
        let data: Vec<u8> = (0..4 * 2 * 3).map(|i| i as u8).collect();
        let view = FrameView::new(rgb_layout(4, 2), &data);
        let array = view.to_array()?;
        assert_eq!(array.shape(), &[2, 4, 3]);
        assert_eq!(array.dtype(), "u8");
        Ok(())
    }

    #[test]
    fn size_mismatch_falls_back_to_flat() -> Result<()> {
        let data = vec![0u8; 25];
        let view = FrameView::new(rgb_layout(4, 2), &data);
        assert_eq!(view.to_array()?.shape(), &[25]);
        Ok(())
    }

    #[test]
    fn single_length_axes_are_squeezed() -> Result<()> {
        let data = vec![7u8; 5];
        let view = FrameView::new(FrameLayout::new(5, 1, PixelFormat::Gray8), &data);
        assert_eq!(view.to_array()?.shape(), &[5]);

        let one = vec![9u8; 3];
        let view = FrameView::new(rgb_layout(1, 1), &one);
        assert_eq!(view.to_array()?.shape(), &[3]);
        Ok(())
    }

    #[test]
    fn padded_rows_are_compacted() -> Result<()> {
        // 2x2 RGB with 8-byte stride: 6 pixel bytes + 2 padding per row.
        let data = vec![1, 2, 3, 4, 5, 6, 0xEE, 0xEE, 7, 8, 9, 10, 11, 12, 0xEE, 0xEE];
        let layout = rgb_layout(2, 2).with_stride(8)?;
        let view = FrameView::new(layout, &data);

        let FrameArray::U8(array) = view.to_array()? else {
            panic!("expected u8 array");
        };
        assert_eq!(array.shape(), &[2, 2, 3]);
        assert!(array.iter().all(|&b| b != 0xEE));

        let pixels = view.pixels()?;
        assert_eq!(pixels[[1, 0, 0]], 7);
        assert_eq!(pixels[[1, 1, 2]], 12);
        Ok(())
    }

    #[test]
    fn strided_view_rejects_short_buffer() -> Result<()> {
        let data = vec![0u8; 10];
        let view = FrameView::new(rgb_layout(2, 2), &data);
        assert!(view.pixels().is_err());
        Ok(())
    }

    #[test]
    fn stride_below_row_width_is_rejected() {
        assert!(rgb_layout(4, 4).with_stride(11).is_err());
    }

    #[test]
    fn gray16_decodes_little_endian_samples() -> Result<()> {
        let data = vec![0x01, 0x00, 0x00, 0x01, 0xff, 0xff, 0x02, 0x00];
        let view = FrameView::new(FrameLayout::new(2, 2, PixelFormat::Gray16Le), &data);
        let FrameArray::U16(array) = view.to_array()? else {
            panic!("expected u16 array");
        };
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array[[0, 1]], 256);
        assert_eq!(array[[1, 0]], u16::MAX);
        assert!(view.pixels().is_err());
        Ok(())
    }

    #[test]
    fn odd_length_gray16_buffer_is_an_error() {
        let data = vec![0u8; 7];
        let view = FrameView::new(FrameLayout::new(2, 2, PixelFormat::Gray16Be), &data);
        assert!(view.to_array().is_err());
    }

    #[test]
    fn view_exposes_pointer_and_length() {
        let data = vec![0u8; 12];
        let view = FrameView::new(rgb_layout(2, 2), &data);
        assert_eq!(view.len(), 12);
        assert_eq!(view.as_ptr(), data.as_ptr());
        assert!(!view.is_empty());
    }
}
