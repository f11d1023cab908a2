//! Random affine augmentation applied to every sample as it is loaded.
//!
//! Coordinates follow the row/column convention: a transform maps each output
//! pixel `(row, col)` back to a source position, which is then sampled
//! bilinearly.

use burn::config::Config;
use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How samples that fall outside the source image are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    /// Repeat the nearest edge pixel.
    Nearest,
}

#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Multiplier applied to raw `0..=255` pixel values after the transform.
    ///
    /// Kept at `0.2` to match the model this pipeline was tuned with. Inference
    /// normalises by `1/255` instead, so training inputs span `[0, 51]` while
    /// inference inputs span `[0, 1]`.
    #[config(default = 0.2)]
    pub rescale: f32,
    /// Degrees.
    #[config(default = 20.0)]
    pub rotation_range: f32,
    /// Fraction of the image width.
    #[config(default = 0.2)]
    pub width_shift_range: f32,
    /// Fraction of the image height.
    #[config(default = 0.2)]
    pub height_shift_range: f32,
    /// Shear angle in degrees.
    #[config(default = 0.2)]
    pub shear_range: f32,
    /// Each axis is zoomed by a factor drawn from `[1 - zoom_range, 1 + zoom_range]`.
    #[config(default = 0.2)]
    pub zoom_range: f32,
    #[config(default = true)]
    pub horizontal_flip: bool,
    #[config(default = "FillMode::Nearest")]
    pub fill_mode: FillMode,
    /// Fraction of every class held out for validation.
    #[config(default = 0.2)]
    pub validation_split: f64,
}

/// One draw of the random transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub theta: f32,
    pub tx: f32,
    pub ty: f32,
    pub shear: f32,
    pub zx: f32,
    pub zy: f32,
    pub flip_horizontal: bool,
}

impl TransformParams {
    pub fn identity() -> Self {
        Self {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
        }
    }

    /// Composes rotation, shift, shear and zoom around the image centre.
    /// Returns `None` for the identity so callers can skip resampling.
    fn affine(&self, height: f32, width: f32) -> Option<Affine> {
        let mut matrix: Option<Mat3> = None;
        let mut compose = |m: Mat3| {
            matrix = Some(match matrix {
                Some(acc) => mul(&acc, &m),
                None => m,
            });
        };

        if self.theta != 0.0 {
            let (sin, cos) = self.theta.to_radians().sin_cos();
            compose([[cos, -sin, 0.0], [sin, cos, 0.0], [0.0, 0.0, 1.0]]);
        }
        if self.tx != 0.0 || self.ty != 0.0 {
            compose([[1.0, 0.0, self.tx], [0.0, 1.0, self.ty], [0.0, 0.0, 1.0]]);
        }
        if self.shear != 0.0 {
            let (sin, cos) = self.shear.to_radians().sin_cos();
            compose([[1.0, -sin, 0.0], [0.0, cos, 0.0], [0.0, 0.0, 1.0]]);
        }
        if self.zx != 1.0 || self.zy != 1.0 {
            compose([[self.zx, 0.0, 0.0], [0.0, self.zy, 0.0], [0.0, 0.0, 1.0]]);
        }

        let matrix = matrix?;
        let o_row = height / 2.0 - 0.5;
        let o_col = width / 2.0 - 0.5;
        let offset = [[1.0, 0.0, o_row], [0.0, 1.0, o_col], [0.0, 0.0, 1.0]];
        let reset = [[1.0, 0.0, -o_row], [0.0, 1.0, -o_col], [0.0, 0.0, 1.0]];
        let centred = mul(&mul(&offset, &matrix), &reset);

        Some(Affine([centred[0], centred[1]]))
    }
}

type Mat3 = [[f32; 3]; 3];

fn mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

struct Affine([[f32; 3]; 2]);

impl Affine {
    fn map(&self, row: f32, col: f32) -> (f32, f32) {
        let [r, c] = &self.0;
        (
            r[0] * row + r[1] * col + r[2],
            c[0] * row + c[1] * col + c[2],
        )
    }
}

#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    pub fn random_params<R: Rng + ?Sized>(&self, height: u32, width: u32, rng: &mut R) -> TransformParams {
        let c = &self.config;
        let theta = symmetric(rng, c.rotation_range);
        let tx = symmetric(rng, c.height_shift_range) * height as f32;
        let ty = symmetric(rng, c.width_shift_range) * width as f32;
        let shear = symmetric(rng, c.shear_range);
        let (zx, zy) = if c.zoom_range > 0.0 {
            let bounds = (1.0 - c.zoom_range)..=(1.0 + c.zoom_range);
            (rng.gen_range(bounds.clone()), rng.gen_range(bounds))
        } else {
            (1.0, 1.0)
        };
        let flip_horizontal = c.horizontal_flip && rng.gen_bool(0.5);

        TransformParams {
            theta,
            tx,
            ty,
            shear,
            zx,
            zy,
            flip_horizontal,
        }
    }

    /// Draws a transform and applies it, returning rescaled CHW pixel data.
    pub fn transform<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> Vec<f32> {
        let params = self.random_params(image.height(), image.width(), rng);
        self.apply(image, &params)
    }

    pub fn apply(&self, image: &RgbImage, params: &TransformParams) -> Vec<f32> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;
        let affine = params.affine(height as f32, width as f32);
        let mut out = vec![0.0f32; 3 * plane];

        for row in 0..height {
            for col in 0..width {
                let dst_col = if params.flip_horizontal {
                    width - 1 - col
                } else {
                    col
                };
                let idx = row * width + dst_col;

                match &affine {
                    Some(affine) => {
                        let (src_row, src_col) = affine.map(row as f32, col as f32);
                        for channel in 0..3 {
                            out[channel * plane + idx] =
                                sample_clamped(image, src_row, src_col, channel) * self.config.rescale;
                        }
                    }
                    None => {
                        let pixel = image.get_pixel(col as u32, row as u32);
                        for channel in 0..3 {
                            out[channel * plane + idx] = pixel[channel] as f32 * self.config.rescale;
                        }
                    }
                }
            }
        }

        out
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

/// Bilinear sample; positions outside the image clamp to the edge.
fn sample_clamped(image: &RgbImage, row: f32, col: f32, channel: usize) -> f32 {
    let max_row = image.height() - 1;
    let max_col = image.width() - 1;
    let row = row.clamp(0.0, max_row as f32);
    let col = col.clamp(0.0, max_col as f32);

    let r0 = row.floor() as u32;
    let c0 = col.floor() as u32;
    let r1 = (r0 + 1).min(max_row);
    let c1 = (c0 + 1).min(max_col);
    let fr = row - r0 as f32;
    let fc = col - c0 as f32;

    let at = |r: u32, c: u32| image.get_pixel(c, r)[channel] as f32;
    let top = at(r0, c0) * (1.0 - fc) + at(r0, c1) * fc;
    let bottom = at(r1, c0) * (1.0 - fc) + at(r1, c1) * fc;
    top * (1.0 - fr) + bottom * fr
}
