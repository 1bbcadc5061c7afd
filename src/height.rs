use anyhow::{ensure, Context, Result};
use ndarray::Array2;
use std::path::Path;

/// A height field over the normalized terrain footprint.
///
/// `u` and `v` are defined for `[0, 1]`; implementations must be pure, the
/// quadtrees sample the source many times during construction and rely on
/// identical results for identical coordinates.
pub trait HeightSource: Send + Sync + 'static {
    fn height(&self, u: f32, v: f32) -> f32;

    /// Samples the source with the coordinates clamped to the footprint.
    /// Used wherever grid arithmetic may step marginally outside `[0, 1]`.
    fn height_clamped(&self, u: f32, v: f32) -> f32 {
        self.height(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0))
    }
}

impl<F> HeightSource for F
where
    F: Fn(f32, f32) -> f32 + Send + Sync + 'static,
{
    fn height(&self, u: f32, v: f32) -> f32 {
        self(u, v)
    }
}

/// A height field backed by a grid of samples, filtered bilinearly.
pub struct HeightRaster {
    samples: Array2<f32>,
}

impl HeightRaster {
    /// Wraps an existing sample grid. Indexed as `[[y, x]]`, row `y = 0`
    /// corresponds to `v = 0`.
    pub fn from_array(samples: Array2<f32>) -> Result<Self> {
        let (rows, columns) = samples.dim();
        ensure!(
            rows >= 2 && columns >= 2,
            "height raster needs at least 2x2 samples, got {rows}x{columns}"
        );

        Ok(Self { samples })
    }

    /// Fills a `resolution x resolution` grid by sampling `f` over the
    /// normalized footprint.
    pub fn from_fn(resolution: usize, f: impl Fn(f32, f32) -> f32) -> Result<Self> {
        ensure!(
            resolution >= 2,
            "height raster needs a resolution of at least 2, got {resolution}"
        );

        let step = 1.0 / (resolution - 1) as f32;
        let samples = Array2::from_shape_fn((resolution, resolution), |(y, x)| {
            f(x as f32 * step, y as f32 * step)
        });

        Ok(Self { samples })
    }

    /// Loads a grayscale height map image. Sample values are mapped linearly
    /// from the image's full range onto `[min_height, max_height]`.
    pub fn load(path: impl AsRef<Path>, min_height: f32, max_height: f32) -> Result<Self> {
        let path = path.as_ref();
        ensure!(
            max_height > min_height,
            "invalid height range [{min_height}, {max_height}]"
        );

        let image = image::open(path)
            .with_context(|| format!("failed to load height map {}", path.display()))?
            .into_luma16();
        let (width, height) = image.dimensions();

        let scale = (max_height - min_height) / u16::MAX as f32;
        let samples = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            min_height + image.get_pixel(x as u32, y as u32).0[0] as f32 * scale
        });

        Self::from_array(samples)
    }
}

impl HeightSource for HeightRaster {
    fn height(&self, u: f32, v: f32) -> f32 {
        let (rows, columns) = self.samples.dim();

        let x = u.clamp(0.0, 1.0) * (columns - 1) as f32;
        let y = v.clamp(0.0, 1.0) * (rows - 1) as f32;

        let x0 = (x.floor() as usize).min(columns - 1);
        let y0 = (y.floor() as usize).min(rows - 1);
        let x1 = (x0 + 1).min(columns - 1);
        let y1 = (y0 + 1).min(rows - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.samples[[y0, x0]] * (1.0 - fx) + self.samples[[y0, x1]] * fx;
        let bottom = self.samples[[y1, x0]] * (1.0 - fx) + self.samples[[y1, x1]] * fx;

        top * (1.0 - fy) + bottom * fy
    }
}
