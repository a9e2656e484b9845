use ndarray::Array2;

use crate::my_types::*;
use crate::rigid_box::RigidBox;

/// Rim extents relative to the box
const RIM_SCALE_W: f32 = 2.;
const RIM_SCALE_H: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Region {
    Outside = 0,
    InsideBox = 2,
    InsideRim = 64,
}

impl Region {
    fn from_raw(value: u8) -> Region {
        match value {
            v if v == Region::InsideBox as u8 => Region::InsideBox,
            v if v == Region::InsideRim as u8 => Region::InsideRim,
            _ => Region::Outside,
        }
    }

    pub fn is_inside(self) -> bool {
        self != Region::Outside
    }
}

/// Which regions of a mask admit new features
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Box,
    BoxAndRim,
}

impl Selection {
    pub fn admits(self, region: Region) -> bool {
        match self {
            Selection::Box => region == Region::InsideBox,
            Selection::BoxAndRim => region.is_inside(),
        }
    }
}

/// Classification raster the size of the video frame.
///
/// The box is painted as [`Region::InsideBox`] on top of an enlarged rectangle
/// (twice as wide, one and a half times as high, same center and rotation)
/// painted as [`Region::InsideRim`].
#[derive(Clone, Debug)]
pub struct RegionMask {
    /// rows x cols
    raster: Array2<u8>,
}

impl RegionMask {
    pub fn empty() -> Self {
        Self {
            raster: Array2::zeros((0, 0)),
        }
    }

    pub fn init(&mut self, width: usize, height: usize) {
        self.raster = Array2::zeros((height, width));
    }

    pub fn release(&mut self) {
        self.raster = Array2::zeros((0, 0));
    }

    pub fn clear(&mut self) {
        self.raster.fill(0);
    }

    pub fn width(&self) -> usize {
        self.raster.ncols()
    }

    pub fn height(&self) -> usize {
        self.raster.nrows()
    }

    /// Rasterize `bb`. A degenerate box leaves the mask cleared.
    pub fn set(&mut self, bb: &RigidBox) {
        self.clear();

        if bb.is_degenerate() {
            return;
        }

        let rim = bb.scaled(RIM_SCALE_W, RIM_SCALE_H);
        self.fill_convex(rim.corner_points(), Region::InsideRim);
        self.fill_convex(bb.corner_points(), Region::InsideBox);
    }

    /// The bounds check compares the truncated coordinate against the raster
    /// size itself; the row/column equal to the size has no cell and is outside.
    pub fn classify(&self, p: Vector2f) -> Region {
        if !(p.x >= 0.) || !(p.y >= 0.) {
            return Region::Outside;
        }
        let (x, y) = (p.x as i64, p.y as i64);
        if x > self.width() as i64 || y > self.height() as i64 {
            return Region::Outside;
        }
        self.raster
            .get((y as usize, x as usize))
            .map(|&v| Region::from_raw(v))
            .unwrap_or(Region::Outside)
    }

    #[inline(always)]
    pub fn region_at(&self, x: usize, y: usize) -> Region {
        Region::from_raw(self.raster[(y, x)])
    }

    pub fn count(&self, region: Region) -> usize {
        self.raster.iter().filter(|&&v| v == region as u8).count()
    }

    /// Half-plane test against every edge, inclusive. Works for either winding
    /// as long as the corners are ordered around the polygon.
    fn fill_convex(&mut self, corners: [Point2i; 4], region: Region) {
        if self.width() == 0 || self.height() == 0 {
            return;
        }
        let min_x = corners.iter().map(|p| p.x).min().unwrap_or(0).max(0);
        let max_x = corners.iter().map(|p| p.x).max().unwrap_or(-1).min(self.width() as i32 - 1);
        let min_y = corners.iter().map(|p| p.y).min().unwrap_or(0).max(0);
        let max_y = corners.iter().map(|p| p.y).max().unwrap_or(-1).min(self.height() as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let mut positive = false;
                let mut negative = false;
                for i in 0..4 {
                    let a = corners[i];
                    let b = corners[(i + 1) % 4];
                    let cross = (b.x - a.x) as i64 * (y - a.y) as i64
                        - (b.y - a.y) as i64 * (x - a.x) as i64;
                    positive |= cross > 0;
                    negative |= cross < 0;
                }
                if !(positive && negative) {
                    self.raster[(y as usize, x as usize)] = region as u8;
                }
            }
        }
    }
}

/// A mask restricted to the regions admitted by a [`Selection`]
#[derive(Clone, Copy, Debug)]
pub struct MaskFilter<'a> {
    pub mask: &'a RegionMask,
    pub selection: Selection,
}

impl<'a> MaskFilter<'a> {
    pub fn new(mask: &'a RegionMask, selection: Selection) -> Self {
        Self { mask, selection }
    }

    #[inline(always)]
    pub fn admits(&self, x: usize, y: usize) -> bool {
        x < self.mask.width()
            && y < self.mask.height()
            && self.selection.admits(self.mask.region_at(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_for(bb: &RigidBox) -> RegionMask {
        let mut mask = RegionMask::empty();
        mask.init(100, 100);
        mask.set(bb);
        mask
    }

    #[test]
    fn test_classification() {
        let mask = mask_for(&RigidBox::new(50., 50., 20., 10., 0.));
        assert_eq!(mask.classify(Vector2f::new(50., 50.)), Region::InsideBox);
        assert_eq!(mask.classify(Vector2f::new(60.5, 55.5)), Region::InsideBox);
        // between box and rim
        assert_eq!(mask.classify(Vector2f::new(65., 50.)), Region::InsideRim);
        assert_eq!(mask.classify(Vector2f::new(50., 56.)), Region::InsideRim);
        // beyond the rim
        assert_eq!(mask.classify(Vector2f::new(75., 50.)), Region::Outside);
        assert_eq!(mask.classify(Vector2f::new(50., 58.)), Region::Outside);
    }

    #[test]
    fn test_box_dominates_rim() {
        let mask = mask_for(&RigidBox::new(50., 50., 20., 10., 30.));
        let inside_box = mask.count(Region::InsideBox);
        let inside_rim = mask.count(Region::InsideRim);
        assert!(inside_box > 150 && inside_box < 300, "{inside_box}");
        // the enlarged rectangle is three times the box area
        assert!(inside_rim > inside_box, "{inside_rim}");
        assert_eq!(mask.classify(Vector2f::new(50., 50.)), Region::InsideBox);
    }

    #[test]
    fn test_degenerate_box() {
        for bb in [RigidBox::new(50., 50., 0., 10., 0.), RigidBox::new(50., 50., 10., 0., 45.)] {
            let mask = mask_for(&bb);
            assert_eq!(mask.count(Region::Outside), 100 * 100);
        }
    }

    #[test]
    fn test_bounds() {
        let mask = mask_for(&RigidBox::new(95., 95., 30., 30., 0.));
        assert_eq!(mask.classify(Vector2f::new(99.5, 99.5)), Region::InsideBox);
        // the coordinate equal to the raster size passes the bounds check but has no cell
        assert_eq!(mask.classify(Vector2f::new(100.5, 50.)), Region::Outside);
        assert_eq!(mask.classify(Vector2f::new(50., 100.)), Region::Outside);
        assert_eq!(mask.classify(Vector2f::new(101., 50.)), Region::Outside);
        assert_eq!(mask.classify(Vector2f::new(-1., -1.)), Region::Outside);
        assert_eq!(mask.classify(Vector2f::new(f32::NAN, 3.)), Region::Outside);
    }

    #[test]
    fn test_released_mask() {
        let mut mask = mask_for(&RigidBox::new(50., 50., 20., 10., 0.));
        mask.release();
        mask.set(&RigidBox::new(50., 50., 20., 10., 0.));
        assert_eq!(mask.classify(Vector2f::new(50., 50.)), Region::Outside);
    }

    #[test]
    fn test_filter() {
        let mask = mask_for(&RigidBox::new(50., 50., 20., 10., 0.));
        let box_only = MaskFilter::new(&mask, Selection::Box);
        let with_rim = MaskFilter::new(&mask, Selection::BoxAndRim);
        assert!(box_only.admits(50, 50));
        assert!(!box_only.admits(65, 50));
        assert!(with_rim.admits(65, 50));
        assert!(!with_rim.admits(75, 50));
        assert!(!with_rim.admits(500, 50));
    }
}
