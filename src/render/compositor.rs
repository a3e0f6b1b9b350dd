//! Software quad-warp compositor
//!
//! Maps a mouth sprite onto an arbitrary 4-point quadrilateral by splitting
//! the quad into two triangles and solving, per triangle, the 6-parameter
//! affine transform from the three vertex correspondences. Rasterization is
//! plain inverse mapping into an RGBA8 surface: walk the destination
//! triangle's bounding box, map each pixel center back into sprite space,
//! sample, and source-over blend.

use std::path::Path;

/// Owned straight-alpha RGBA8 raster.
#[derive(Clone, Debug)]
pub struct RasterImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterImage {
    /// Decode an image file into RGBA8.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let decoded = image::open(path)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            data: decoded.into_raw(),
        })
    }

    /// Build from raw RGBA8 bytes. Panics if the buffer does not match the
    /// dimensions; only used by tests and generated assets.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    /// Uniform-color image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// 2D affine transform in canvas order: `x' = a·x + c·y + e`,
/// `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    /// Closed-form solve of the affine map taking the three source points
    /// onto the three destination points. Returns `None` for a degenerate
    /// (zero-area) source triangle.
    pub fn from_triangles(src: &[[f64; 2]; 3], dst: &[[f64; 2]; 3]) -> Option<Self> {
        let [[sx0, sy0], [sx1, sy1], [sx2, sy2]] = *src;
        let [[dx0, dy0], [dx1, dy1], [dx2, dy2]] = *dst;

        let denom = sx0 * (sy1 - sy2) + sx1 * (sy2 - sy0) + sx2 * (sy0 - sy1);
        if denom == 0.0 {
            return None;
        }

        Some(Self {
            a: (dx0 * (sy1 - sy2) + dx1 * (sy2 - sy0) + dx2 * (sy0 - sy1)) / denom,
            b: (dy0 * (sy1 - sy2) + dy1 * (sy2 - sy0) + dy2 * (sy0 - sy1)) / denom,
            c: (dx0 * (sx2 - sx1) + dx1 * (sx0 - sx2) + dx2 * (sx1 - sx0)) / denom,
            d: (dy0 * (sx2 - sx1) + dy1 * (sx0 - sx2) + dy2 * (sx1 - sx0)) / denom,
            e: (dx0 * (sx1 * sy2 - sx2 * sy1)
                + dx1 * (sx2 * sy0 - sx0 * sy2)
                + dx2 * (sx0 * sy1 - sx1 * sy0))
                / denom,
            f: (dy0 * (sx1 * sy2 - sx2 * sy1)
                + dy1 * (sx2 * sy0 - sx0 * sy2)
                + dy2 * (sx0 * sy1 - sx1 * sy0))
                / denom,
        })
    }

    pub fn apply(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        [
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        ]
    }

    /// Inverse transform, or `None` when this map collapses area.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

/// Draw-image-into-clipped-triangle capability over some 2D raster surface.
pub trait RasterCompositor {
    fn surface_width(&self) -> u32;
    fn surface_height(&self) -> u32;

    /// Clear to transparent black.
    fn clear(&mut self);

    /// Copy a full-surface background layer, top-left aligned, no blending.
    fn blit(&mut self, image: &RasterImage);

    /// Warp `image` so that `src` lands on `dst`, clipped to the `dst`
    /// triangle. Degenerate triangles are skipped, not drawn.
    fn draw_triangle(&mut self, image: &RasterImage, src: &[[f64; 2]; 3], dst: &[[f64; 2]; 3]);
}

/// CPU-backed RGBA8 surface.
pub struct PixelSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }

    /// Raw RGBA8 pixels, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Resize and clear. Used when a newly loaded bundle has a different
    /// native size.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize((width * height * 4) as usize, 0);
    }

    fn blend_pixel(&mut self, x: u32, y: u32, src: [u8; 4]) {
        let i = ((y * self.width + x) * 4) as usize;
        let alpha = src[3] as u32;
        if alpha == 0 {
            return;
        }
        if alpha == 255 {
            self.data[i..i + 4].copy_from_slice(&src);
            return;
        }
        let inv = 255 - alpha;
        for ch in 0..3 {
            let over = src[ch] as u32 * alpha;
            let under = self.data[i + ch] as u32 * inv;
            self.data[i + ch] = ((over + under) / 255) as u8;
        }
        let out_a = alpha + (self.data[i + 3] as u32 * inv) / 255;
        self.data[i + 3] = out_a.min(255) as u8;
    }
}

impl RasterCompositor for PixelSurface {
    fn surface_width(&self) -> u32 {
        self.width
    }

    fn surface_height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }

    fn blit(&mut self, image: &RasterImage) {
        let w = self.width.min(image.width());
        let h = self.height.min(image.height());
        for y in 0..h {
            let dst_start = ((y * self.width) * 4) as usize;
            let src_start = ((y * image.width()) * 4) as usize;
            let row = (w * 4) as usize;
            self.data[dst_start..dst_start + row]
                .copy_from_slice(&image.data[src_start..src_start + row]);
        }
    }

    fn draw_triangle(&mut self, image: &RasterImage, src: &[[f64; 2]; 3], dst: &[[f64; 2]; 3]) {
        let forward = match Affine::from_triangles(src, dst) {
            Some(m) => m,
            None => return,
        };
        let inverse = match forward.inverse() {
            Some(m) => m,
            None => return,
        };

        let [[x0, y0], [x1, y1], [x2, y2]] = *dst;

        // Destination triangle signed area; zero means nothing to cover
        let area = (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0);
        if area == 0.0 {
            return;
        }

        let min_x = x0.min(x1).min(x2).floor().max(0.0) as u32;
        let max_x = (x0.max(x1).max(x2).ceil() as i64).min(self.width as i64 - 1);
        let min_y = y0.min(y1).min(y2).floor().max(0.0) as u32;
        let max_y = (y0.max(y1).max(y2).ceil() as i64).min(self.height as i64 - 1);
        if max_x < min_x as i64 || max_y < min_y as i64 {
            return;
        }

        for py in min_y..=max_y as u32 {
            for px in min_x..=max_x as u32 {
                let cx = px as f64 + 0.5;
                let cy = py as f64 + 0.5;

                // Barycentric sign test against all three edges, tolerant
                // of either winding
                let w0 = (x1 - x0) * (cy - y0) - (y1 - y0) * (cx - x0);
                let w1 = (x2 - x1) * (cy - y1) - (y2 - y1) * (cx - x1);
                let w2 = (x0 - x2) * (cy - y2) - (y0 - y2) * (cx - x2);
                let inside = if area > 0.0 {
                    w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
                } else {
                    w0 <= 0.0 && w1 <= 0.0 && w2 <= 0.0
                };
                if !inside {
                    continue;
                }

                let [sx, sy] = inverse.apply([cx, cy]);
                let sx = sx.floor() as i64;
                let sy = sy.floor() as i64;
                if sx < 0 || sy < 0 || sx >= image.width() as i64 || sy >= image.height() as i64 {
                    continue;
                }

                let texel = image.pixel(sx as u32, sy as u32);
                self.blend_pixel(px, py, texel);
            }
        }
    }
}

/// Warp a sprite onto a quadrilateral: the sprite rectangle's corners map
/// onto the quad's corners, via the quad's two triangles.
pub fn draw_warped_sprite<C: RasterCompositor>(
    surface: &mut C,
    sprite: &RasterImage,
    quad: &[[f64; 2]; 4],
) {
    let sw = sprite.width() as f64;
    let sh = sprite.height() as f64;
    if sw == 0.0 || sh == 0.0 {
        return;
    }

    let s0 = [0.0, 0.0];
    let s1 = [sw, 0.0];
    let s2 = [sw, sh];
    let s3 = [0.0, sh];

    surface.draw_triangle(sprite, &[s0, s1, s2], &[quad[0], quad[1], quad[2]]);
    surface.draw_triangle(sprite, &[s0, s2, s3], &[quad[0], quad[2], quad[3]]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_round_trip_hits_destination_vertices() {
        let src = [[0.0, 0.0], [64.0, 0.0], [64.0, 32.0]];
        let dst = [[10.5, 20.25], [70.0, 18.0], [66.0, 55.5]];
        let m = Affine::from_triangles(&src, &dst).unwrap();

        for (s, d) in src.iter().zip(dst.iter()) {
            let [x, y] = m.apply(*s);
            assert!((x - d[0]).abs() < 1e-9, "x: {} vs {}", x, d[0]);
            assert!((y - d[1]).abs() < 1e-9, "y: {} vs {}", y, d[1]);
        }
    }

    #[test]
    fn test_affine_degenerate_source_is_none() {
        // Collinear source points span no area
        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let dst = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(Affine::from_triangles(&src, &dst).is_none());
    }

    #[test]
    fn test_affine_inverse_round_trips() {
        let src = [[0.0, 0.0], [64.0, 0.0], [64.0, 32.0]];
        let dst = [[10.0, 20.0], [70.0, 18.0], [66.0, 55.0]];
        let m = Affine::from_triangles(&src, &dst).unwrap();
        let inv = m.inverse().unwrap();

        let p = [33.3, 12.7];
        let [x, y] = inv.apply(m.apply(p));
        assert!((x - p[0]).abs() < 1e-9);
        assert!((y - p[1]).abs() < 1e-9);
    }

    #[test]
    fn test_identity_warp_copies_sprite() {
        let sprite = RasterImage::solid(4, 4, [255, 0, 0, 255]);
        let mut surface = PixelSurface::new(4, 4);

        let quad = [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        draw_warped_sprite(&mut surface, &sprite, &quad);

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(surface.pixel(x, y), [255, 0, 0, 255], "at {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_degenerate_quad_draws_nothing() {
        let sprite = RasterImage::solid(4, 4, [255, 0, 0, 255]);
        let mut surface = PixelSurface::new(8, 8);

        // All four corners coincide
        let quad = [[2.0, 2.0], [2.0, 2.0], [2.0, 2.0], [2.0, 2.0]];
        draw_warped_sprite(&mut surface, &sprite, &quad);

        assert!(surface.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_warp_clips_to_surface() {
        let sprite = RasterImage::solid(4, 4, [0, 255, 0, 255]);
        let mut surface = PixelSurface::new(4, 4);

        // Quad mostly off-surface; must not panic and must fill the overlap
        let quad = [[-2.0, -2.0], [2.0, -2.0], [2.0, 2.0], [-2.0, 2.0]];
        draw_warped_sprite(&mut surface, &sprite, &quad);

        assert_eq!(surface.pixel(0, 0), [0, 255, 0, 255]);
        assert_eq!(surface.pixel(3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn test_alpha_blends_over_background() {
        let background = RasterImage::solid(2, 2, [0, 0, 200, 255]);
        let mut surface = PixelSurface::new(2, 2);
        surface.blit(&background);

        // Half-transparent white sprite over blue background
        let sprite = RasterImage::solid(2, 2, [255, 255, 255, 128]);
        let quad = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        draw_warped_sprite(&mut surface, &sprite, &quad);

        let [r, g, b, a] = surface.pixel(0, 0);
        assert!(r > 100 && g > 100, "blended toward white: {:?}", [r, g, b]);
        assert!(b > 100, "background blue retained: {}", b);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_blit_clips_oversized_background() {
        let background = RasterImage::solid(8, 8, [9, 9, 9, 255]);
        let mut surface = PixelSurface::new(4, 2);
        surface.blit(&background);
        assert_eq!(surface.pixel(3, 1), [9, 9, 9, 255]);
    }

    #[test]
    fn test_reset_resizes_and_clears() {
        let mut surface = PixelSurface::new(2, 2);
        surface.blit(&RasterImage::solid(2, 2, [1, 2, 3, 4]));
        surface.reset(3, 3);
        assert_eq!(surface.surface_width(), 3);
        assert_eq!(surface.surface_height(), 3);
        assert!(surface.data().iter().all(|&b| b == 0));
    }
}
