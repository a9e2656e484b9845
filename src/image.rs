use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create a black image of the given size
    pub fn new(width: usize, height: usize) -> Image {
        Image {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    /// Clear the image storage
    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn value_i32(&self, x: i32, y: i32) -> u8 {
        self.data[y as usize * self.width + x as usize]
    }

    /// Pixel value with coordinates clamped to the image border
    #[inline(always)]
    pub fn value_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width as i32 - 1);
        let y = y.clamp(0, self.height as i32 - 1);
        self.value_i32(x, y)
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }
}

/// Bilinear interpolation, pixel centers on integer coordinates.
/// Samples outside the image are clamped to the border.
pub fn bilinear(image: &Image, p: Vector2d) -> f64 {
    let x0 = p[0].floor();
    let y0 = p[1].floor();
    let ax = p[0] - x0;
    let ay = p[1] - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);
    let v = |x: i32, y: i32| image.value_clamped(x, y) as f64;
    (1. - ay) * ((1. - ax) * v(x0, y0) + ax * v(x0 + 1, y0))
        + ay * ((1. - ax) * v(x0, y0 + 1) + ax * v(x0 + 1, y0 + 1))
}

/// Row-major interleaved RGB image, the usual shape of a decoded video frame
#[derive(Clone, Debug)]
pub struct ColorImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl ColorImage {
    pub fn new(width: usize, height: usize) -> ColorImage {
        ColorImage {
            data: vec![0; width * height * 3],
            width,
            height,
        }
    }

    #[inline(always)]
    pub fn set_rgb(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = 3 * (y * self.width + x);
        self.data[i..i + 3].copy_from_slice(&rgb);
    }
}

/// Anything that can be converted into a grayscale [`Image`].
pub trait GrayscaleSource {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Overwrite `out` with the grayscale version of `self`, reusing its buffer
    fn write_grayscale(&self, out: &mut Image);
}

impl GrayscaleSource for Image {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn write_grayscale(&self, out: &mut Image) {
        out.data.clear();
        out.data.extend_from_slice(&self.data);
        out.width = self.width;
        out.height = self.height;
    }
}

impl GrayscaleSource for ColorImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    /// ITU-R BT.601 luma in 14 bit fixed point
    fn write_grayscale(&self, out: &mut Image) {
        const R: u32 = 4899;
        const G: u32 = 9617;
        const B: u32 = 1868;
        out.data.clear();
        out.data.extend(self.data.chunks_exact(3).map(|px| {
            ((px[0] as u32 * R + px[1] as u32 * G + px[2] as u32 * B + (1 << 13)) >> 14) as u8
        }));
        out.width = self.width;
        out.height = self.height;
    }
}
