use anyhow::{bail, Result};
use log::debug;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::image::{bilinear, ColorImage, Image};
use crate::math::rotate_vector;
use crate::my_types::*;
use crate::rigid_box::{RigidBox, RigidTransform};

#[derive(Clone, Debug)]
pub struct SceneParams {
    pub width: usize,
    pub height: usize,
    /// pose of the object in the first frame
    pub object: RigidBox,
    /// applied to the object after every frame
    pub motion: RigidTransform,
    pub frame_count: usize,
    pub object_blobs: usize,
    pub background_blobs: usize,
    pub seed: u64,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            object: RigidBox::new(110., 130., 72., 44., 0.),
            motion: RigidTransform::new(1.5, -0.5, 0.),
            frame_count: 60,
            object_blobs: 60,
            background_blobs: 300,
            seed: 0,
        }
    }
}

pub struct SyntheticFrame {
    pub number: usize,
    pub image: ColorImage,
    /// where the object is in this frame
    pub truth: RigidBox,
}

/// A textured rectangle sliding over a textured static background with a
/// constant rigid motion per frame
pub struct SyntheticVideo {
    params: SceneParams,
    background: Image,
    /// object appearance in box coordinates
    texture: Image,
    pose: RigidBox,
    number: usize,
}

impl SyntheticVideo {
    pub fn new(params: SceneParams) -> Result<Self> {
        if params.width == 0 || params.height == 0 {
            bail!("empty video size {} x {}", params.width, params.height);
        }
        if params.object.is_degenerate() {
            bail!("degenerate object {}", params.object);
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
        let background = blob_texture(params.width, params.height, params.background_blobs, 50., &mut rng);
        let texture = blob_texture(
            params.object.w.ceil() as usize + 2,
            params.object.h.ceil() as usize + 2,
            params.object_blobs,
            100.,
            &mut rng,
        );
        debug!(
            "synthetic video {} x {}, {} frames, object {}",
            params.width, params.height, params.frame_count, params.object
        );

        Ok(Self {
            pose: params.object,
            params,
            background,
            texture,
            number: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.params.frame_count
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    fn render(&self) -> ColorImage {
        let (w, h) = (self.params.width, self.params.height);
        let mut image = ColorImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = self.background.value(x, y);
                image.set_rgb(x, y, [v, v, v]);
            }
        }

        let corners = self.pose.corner_points();
        let min_x = corners.iter().map(|p| p.x).min().unwrap_or(0) - 1;
        let max_x = corners.iter().map(|p| p.x).max().unwrap_or(0) + 1;
        let min_y = corners.iter().map(|p| p.y).min().unwrap_or(0) - 1;
        let max_y = corners.iter().map(|p| p.y).max().unwrap_or(0) + 1;

        let half = Vector2f::new(self.pose.w / 2., self.pose.h / 2.);
        let texture_center = Vector2d::new(
            (self.texture.width as f64 - 1.) / 2.,
            (self.texture.height as f64 - 1.) / 2.,
        );
        for y in min_y.max(0)..=max_y.min(h as i32 - 1) {
            for x in min_x.max(0)..=max_x.min(w as i32 - 1) {
                let p = Vector2f::new(x as f32, y as f32);
                let local = rotate_vector(p - self.pose.center(), -self.pose.phi);
                if local.x.abs() > half.x || local.y.abs() > half.y {
                    continue;
                }
                let v = bilinear(&self.texture, local.cast::<f64>() + texture_center);
                let v = v.round().clamp(0., 255.) as u8;
                image.set_rgb(x as usize, y as usize, [v, v, v]);
            }
        }
        image
    }
}

impl Iterator for SyntheticVideo {
    type Item = SyntheticFrame;

    fn next(&mut self) -> Option<SyntheticFrame> {
        if self.number >= self.params.frame_count {
            return None;
        }
        let frame = SyntheticFrame {
            number: self.number,
            image: self.render(),
            truth: self.pose,
        };
        self.pose.apply_transform(self.params.motion);
        self.number += 1;
        Some(frame)
    }
}

/// Mid gray with randomly placed bright and dark Gaussian blobs
fn blob_texture<R: Rng>(width: usize, height: usize, blobs: usize, contrast: f32, rng: &mut R) -> Image {
    let mut values = vec![128f32; width * height];
    for _ in 0..blobs {
        let cx = rng.gen_range(0.0..width as f32);
        let cy = rng.gen_range(0.0..height as f32);
        let sigma = rng.gen_range(1.5f32..4.);
        let amplitude = contrast * rng.gen_range(0.4f32..1.) * if rng.gen::<bool>() { 1. } else { -1. };

        let r = (3. * sigma).ceil() as i32;
        let (x0, y0) = (cx as i32, cy as i32);
        for y in (y0 - r).max(0)..=(y0 + r).min(height as i32 - 1) {
            for x in (x0 - r).max(0)..=(x0 + r).min(width as i32 - 1) {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                values[y as usize * width + x as usize] += amplitude * (-d2 / (2. * sigma * sigma)).exp();
            }
        }
    }

    let mut image = Image::new(width, height);
    for (out, v) in image.data.iter_mut().zip(values) {
        *out = v.round().clamp(0., 255.) as u8;
    }
    image
}
