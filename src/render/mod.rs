//! Render module - software compositor and stage display

pub mod compositor;
mod viewer;

pub use compositor::{draw_warped_sprite, Affine, PixelSurface, RasterCompositor, RasterImage};
pub use viewer::StageView;
