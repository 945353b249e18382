// THEORY:
// The `PixelBuffer` is the raw material of the whole sketch. It is a "dumb" data
// container: a flat, row-major run of RGBA8 samples plus the dimensions needed to
// interpret it. It knows how to address single pixels and how to copy itself in
// place, but it does not know how to compare itself to anything. Comparison is
// the `FrameDiffer`'s job.
//
// Buffers are sized once and then reused for the life of the sketch. Every
// per-frame operation writes into an existing buffer rather than allocating.

use image::RgbaImage;

/// Number of channels per pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// A flat RGBA8 pixel buffer with known dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a zeroed (transparent black) buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * CHANNELS],
        }
    }

    /// Wraps an existing RGBA8 byte vector. Panics if the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize * CHANNELS,
            "pixel data length does not match {width}x{height} RGBA"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// Creates a buffer where every pixel holds the same RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut buffer = Self::new(width, height);
        buffer.fill(rgba);
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (not bytes).
    pub fn pixel_count(&self) -> usize {
        self.data.len() / CHANNELS
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, index: usize) -> [u8; 4] {
        let i = index * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn set_pixel(&mut self, index: usize, rgba: [u8; 4]) {
        let i = index * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&rgba);
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Overwrites this buffer with the contents of `other`. Panics on a size mismatch.
    pub fn copy_from(&mut self, other: &PixelBuffer) {
        assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "pixel buffer dimensions differ"
        );
        self.data.copy_from_slice(&other.data);
    }

    /// Copies an already-resampled RGBA image into this buffer in place.
    pub fn copy_from_image(&mut self, image: &RgbaImage) {
        assert_eq!(
            (self.width, self.height),
            image.dimensions(),
            "image dimensions differ from pixel buffer"
        );
        self.data.copy_from_slice(image.as_raw());
    }

    /// Copies the buffer out into an `image` buffer, e.g. for saving a debug overlay.
    pub fn to_image(&self) -> RgbaImage {
        // Length is guaranteed by construction, so this never returns None.
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let buffer = PixelBuffer::new(4, 3);
        assert_eq!(buffer.pixel_count(), 12);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn set_and_read_pixel() {
        let mut buffer = PixelBuffer::filled(2, 2, [10, 20, 30, 255]);
        buffer.set_pixel(3, [1, 2, 3, 4]);
        assert_eq!(buffer.pixel(0), [10, 20, 30, 255]);
        assert_eq!(buffer.pixel(3), [1, 2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn from_raw_rejects_wrong_length() {
        let _ = PixelBuffer::from_raw(2, 2, vec![0; 15]);
    }

    #[test]
    fn image_round_trip_keeps_layout() {
        let mut buffer = PixelBuffer::new(3, 2);
        buffer.set_pixel(4, [9, 8, 7, 6]);
        let image = buffer.to_image();
        assert_eq!(image.get_pixel(1, 1).0, [9, 8, 7, 6]);

        let mut copy = PixelBuffer::new(3, 2);
        copy.copy_from_image(&image);
        assert_eq!(copy, buffer);
    }
}
