use anyhow::{bail, Result};

use crate::image::{GrayscaleSource, Image};
use crate::pyramid::Pyramid;

/// A grayscale frame together with its downscaled levels
#[derive(Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    pub fn empty() -> Self {
        PyramidFrame {
            image: Image::empty(),
            pyramid: Pyramid::empty(),
        }
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len() + 1
    }

    /// Converts `source` to grayscale and rebuilds the pyramid, reusing the
    /// buffers of the previous content to avoid allocation
    pub fn refresh<F: GrayscaleSource + ?Sized>(&mut self, source: &F, levels: usize) -> Result<()> {
        if source.width() == 0 || source.height() == 0 {
            bail!("empty frame {} x {}", source.width(), source.height());
        }
        source.write_grayscale(&mut self.image);
        self.pyramid.compute(&self.image, levels)
    }

    pub fn clone_from_frame(&mut self, other: &PyramidFrame) -> Result<()> {
        other.image.write_grayscale(&mut self.image);
        self.pyramid.compute(&self.image, other.pyramid.levels.len())
    }

    pub fn clear(&mut self) {
        self.image.clear();
        self.pyramid.clear();
    }
}
