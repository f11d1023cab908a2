use std::fs;
use std::path::Path;

use burn::{prelude::*, tensor::TensorData};
use log::info;

use crate::{
    dataset::load_rgb,
    error::{Error, Result},
    model::Model,
    persist::load_artifact,
    report::escape_xml,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    /// Softmax output, one entry per class in label order.
    pub probabilities: Vec<f32>,
}

/// A trained model together with the class labels its outputs map to.
pub struct Predictor<B: Backend> {
    model: Model<B>,
    classes: Vec<String>,
    image_size: u32,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: Model<B>, classes: Vec<String>, image_size: u32, device: B::Device) -> Result<Self> {
        if model.num_classes() != classes.len() {
            return Err(Error::LabelMismatch {
                outputs: model.num_classes(),
                labels: classes.len(),
            });
        }

        Ok(Self {
            model,
            classes,
            image_size,
            device,
        })
    }

    /// Loads the artifact written by training, including its class order.
    pub fn load(artifact_dir: &Path, device: B::Device) -> Result<Self> {
        let artifact = load_artifact::<B>(artifact_dir, &device)?;
        let image_size = artifact.config.model.image_size as u32;
        Self::new(artifact.model, artifact.classes, image_size, device)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn predict_image(&self, path: &Path) -> Result<Prediction> {
        let input = load_and_preprocess_image::<B>(path, self.image_size, &self.device)?;
        let probabilities = self
            .model
            .forward_softmax(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| Error::Tensor(format!("{err:?}")))?;

        let index = argmax(&probabilities).ok_or_else(|| Error::Tensor("empty model output".into()))?;
        let label = self.classes[index].clone();
        info!("{:?}: predicted {} ({:.3})", path, label, probabilities[index]);

        Ok(Prediction {
            label,
            index,
            probabilities,
        })
    }
}

/// Decodes `path`, resizes it to `size`×`size` and scales pixels into `[0, 1]`.
/// Returns a single-image batch `[1, 3, size, size]`.
pub fn load_and_preprocess_image<B: Backend>(path: &Path, size: u32, device: &B::Device) -> Result<Tensor<B, 4>> {
    let img = load_rgb(path, size)?;
    let side = size as usize;
    let plane = side * side;

    let mut pixels = vec![0.0f32; 3 * plane];
    for (i, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            pixels[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }

    Ok(Tensor::from_floats(TensorData::new(pixels, [1, 3, side, side]), device))
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Writes an SVG showing the input image titled with the predicted label.
pub fn render_prediction(image_path: &Path, label: &str, out: &Path) -> Result<()> {
    let (width, height) = image::image_dimensions(image_path).map_err(|err| Error::image(image_path, err))?;
    let href = format!("file://{}", fs::canonicalize(image_path)?.display());
    let title_height = 40;

    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<rect width="{w}" height="{h}" fill="white"/>"#,
            r#"<text x="{cx}" y="27" text-anchor="middle" font-family="Arial, sans-serif" font-size="18">Predicted: {label}</text>"#,
            r#"<image href="{href}" x="0" y="{th}" width="{iw}" height="{ih}"/>"#,
            "</svg>"
        ),
        w = width,
        h = height + title_height,
        cx = width / 2,
        th = title_height,
        iw = width,
        ih = height,
        label = escape_xml(label),
        href = escape_xml(&href),
    );

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, svg)?;
    info!("prediction rendered to {:?}", out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type B = NdArray;

    fn classes() -> Vec<String> {
        vec!["garbage".into(), "paper".into(), "plastic".into()]
    }

    fn write_image(dir: &Path, name: &str, size: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(size, size, Rgb([255, 0, 51])).save(&path).unwrap();
        path
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.5, 0.3]), Some(1));
        assert_eq!(argmax(&[0.4, 0.2, 0.4]), Some(0));
        assert_eq!(argmax(&[1.0 / 3.0; 3]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn preprocessing_scales_to_unit_range() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "red.png", 40);

        let tensor = load_and_preprocess_image::<B>(&path, 10, &Default::default()).unwrap();
        assert_eq!(tensor.dims(), [1, 3, 10, 10]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!(values[100..200].iter().all(|&v| v == 0.0));
        assert!((values[200] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn prediction_is_one_of_the_classes() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "sample.png", 30);
        let device = Default::default();
        let model = ModelConfig::new()
            .with_image_size(22)
            .with_hidden_size(8)
            .init::<B>(&device);

        let predictor = Predictor::new(model, classes(), 22, device).unwrap();
        let prediction = predictor.predict_image(&path).unwrap();

        assert_eq!(prediction.probabilities.len(), 3);
        assert!((prediction.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(prediction.label, classes()[prediction.index]);
    }

    #[test]
    fn label_count_must_match_outputs() {
        let device = Default::default();
        let model = ModelConfig::new()
            .with_image_size(22)
            .with_hidden_size(8)
            .init::<B>(&device);

        let result = Predictor::new(model, vec!["paper".into(), "plastic".into()], 22, device);
        assert!(matches!(
            result,
            Err(Error::LabelMismatch { outputs: 3, labels: 2 })
        ));
    }

    #[test]
    fn missing_image_is_reported() {
        let dir = TempDir::new().unwrap();
        let result = load_and_preprocess_image::<B>(&dir.path().join("nope.png"), 10, &Default::default());
        assert!(matches!(result, Err(Error::Image { .. })));
    }

    #[test]
    fn render_writes_titled_svg() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "in.png", 16);
        let out = dir.path().join("out").join("prediction.svg");

        render_prediction(&path, "paper & cardboard", &out).unwrap();

        let svg = fs::read_to_string(&out).unwrap();
        assert!(svg.contains("Predicted: paper &amp; cardboard"));
        assert!(svg.contains("file://"));
        assert!(svg.contains(r#"height="56""#));
    }
}
