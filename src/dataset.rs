use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::Backend,
    tensor::{Tensor, TensorData},
};
use image::{imageops::FilterType, RgbImage};
use log::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::NUM_CLASSES;

/// Notebook cache directory that would otherwise be picked up as a class.
pub const CHECKPOINT_DIR: &str = ".ipynb_checkpoints";

pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Lists the class directories under `root`, sorted by name.
///
/// Removes a stray checkpoint directory first and fails unless exactly
/// [`NUM_CLASSES`] directories remain. The returned order is the label order
/// used by training and, once persisted, by inference.
pub fn discover_classes(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(Error::DatasetNotFound(root.to_path_buf()));
    }

    let checkpoints = root.join(CHECKPOINT_DIR);
    if checkpoints.exists() {
        debug!("removing {:?}", checkpoints);
        fs::remove_dir_all(&checkpoints)?;
    }

    let mut classes = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    classes.sort();

    info!("Classes found: {:?}", classes);

    if classes.len() != NUM_CLASSES {
        return Err(Error::ClassCount {
            expected: NUM_CLASSES,
            found: classes,
        });
    }

    Ok(classes)
}

/// Which side of the per-class split a dataset draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Training,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct ImageFolder {
    items: Vec<ImageSample>,
}

impl ImageFolder {
    /// Collects the image files of every class in `classes` and keeps one side
    /// of the split.
    ///
    /// Files are split per class on their sorted order: the first
    /// `floor(validation_split * n)` go to validation, the rest to training.
    pub fn new(root: &Path, classes: &[String], subset: Subset, validation_split: f64) -> Result<Self> {
        let mut items = Vec::new();

        for (label, class) in classes.iter().enumerate() {
            let files = list_images(&root.join(class))?;
            let cut = (validation_split * files.len() as f64) as usize;
            let kept = match subset {
                Subset::Validation => &files[..cut],
                Subset::Training => &files[cut..],
            };
            debug!("class '{}' (label {}): {} of {} files", class, label, kept.len(), files.len());

            items.extend(kept.iter().map(|path| ImageSample {
                path: path.clone(),
                label,
            }));
        }

        info!(
            "Found {} images belonging to {} classes ({:?})",
            items.len(),
            classes.len(),
            subset
        );

        Ok(Self { items })
    }

    pub fn from_samples(items: Vec<ImageSample>) -> Self {
        Self { items }
    }
}

impl Dataset<ImageSample> for ImageFolder {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| Error::Io(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_image = entry
            .path()
            .extension()
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Decodes an image as RGB and resizes it to `size`×`size` with nearest-neighbour sampling.
pub fn load_rgb(path: &Path, size: u32) -> Result<RgbImage> {
    let img = image::open(path).map_err(|err| Error::image(path, err))?;
    Ok(img.resize_exact(size, size, FilterType::Nearest).to_rgb8())
}

/// A decoded sample: CHW pixel data and its class index.
#[derive(Debug, Clone)]
pub struct ClassificationItem {
    pub pixels: Vec<f32>,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    /// `[batch, 3, size, size]`
    pub images: Tensor<B, 4>,
    /// One-hot `[batch, num_classes]`
    pub labels: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct ClassificationBatcher<B: Backend> {
    image_size: usize,
    num_classes: usize,
    device: B::Device,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(image_size: usize, num_classes: usize, device: B::Device) -> Self {
        Self {
            image_size,
            num_classes,
            device,
        }
    }
}

impl<B: Backend> Batcher<ClassificationItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<ClassificationItem>) -> ClassificationBatch<B> {
        let batch_size = items.len();
        let mut pixels = Vec::with_capacity(batch_size * 3 * self.image_size * self.image_size);
        let mut one_hot = vec![0.0f32; batch_size * self.num_classes];

        for (i, item) in items.into_iter().enumerate() {
            one_hot[i * self.num_classes + item.label] = 1.0;
            pixels.extend(item.pixels);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, 3, self.image_size, self.image_size]),
            &self.device,
        );
        let labels = Tensor::<B, 2>::from_floats(
            TensorData::new(one_hot, [batch_size, self.num_classes]),
            &self.device,
        );

        ClassificationBatch { images, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::Rgb;
    use tempfile::TempDir;

    fn write_image(path: &Path) {
        RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])).save(path).unwrap();
    }

    fn dataset_with(classes: &[&str], per_class: usize) -> TempDir {
        let dir = TempDir::new().unwrap();
        for class in classes {
            let class_dir = dir.path().join(class);
            fs::create_dir_all(&class_dir).unwrap();
            for i in 0..per_class {
                write_image(&class_dir.join(format!("{i:03}.png")));
            }
        }
        dir
    }

    #[test]
    fn three_classes_are_returned_sorted() {
        let dir = dataset_with(&["plastic", "garbage", "paper"], 1);
        let classes = discover_classes(dir.path()).unwrap();
        assert_eq!(classes, vec!["garbage", "paper", "plastic"]);
    }

    #[test]
    fn checkpoint_directory_is_purged() {
        let dir = dataset_with(&["garbage", "paper", "plastic"], 1);
        fs::create_dir_all(dir.path().join(CHECKPOINT_DIR).join("nested")).unwrap();

        let classes = discover_classes(dir.path()).unwrap();

        assert_eq!(classes.len(), 3);
        assert!(!dir.path().join(CHECKPOINT_DIR).exists());
    }

    #[test]
    fn wrong_class_count_aborts() {
        for names in [&["paper", "plastic"][..], &["a", "b", "c", "d"][..]] {
            let dir = dataset_with(names, 0);
            match discover_classes(dir.path()) {
                Err(Error::ClassCount { expected, found }) => {
                    assert_eq!(expected, 3);
                    assert_eq!(found.len(), names.len());
                }
                other => panic!("expected ClassCount, got {other:?}"),
            }
        }
    }

    #[test]
    fn loose_files_are_not_classes() {
        let dir = dataset_with(&["garbage", "paper", "plastic"], 0);
        fs::write(dir.path().join("README.txt"), "notes").unwrap();
        assert_eq!(discover_classes(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(discover_classes(&missing), Err(Error::DatasetNotFound(_))));
    }

    #[test]
    fn split_takes_first_fifth_of_each_class_for_validation() {
        let dir = dataset_with(&["garbage", "paper", "plastic"], 10);
        fs::write(dir.path().join("paper").join("notes.txt"), "skip").unwrap();
        let classes = discover_classes(dir.path()).unwrap();

        let train = ImageFolder::new(dir.path(), &classes, Subset::Training, 0.2).unwrap();
        let valid = ImageFolder::new(dir.path(), &classes, Subset::Validation, 0.2).unwrap();

        assert_eq!(train.len(), 24);
        assert_eq!(valid.len(), 6);

        let first = valid.get(0).unwrap();
        assert_eq!(first.label, 0);
        assert!(first.path.ends_with("garbage/000.png"));
        let last = valid.get(5).unwrap();
        assert_eq!(last.label, 2);
        assert!(last.path.ends_with("plastic/001.png"));
        assert!(train.get(0).unwrap().path.ends_with("garbage/002.png"));
    }

    #[test]
    fn images_are_resized_square() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.jpg");
        write_image(&path);

        let rgb = load_rgb(&path, 5).unwrap();
        assert_eq!(rgb.dimensions(), (5, 5));
    }

    #[test]
    fn batcher_builds_one_hot_labels() {
        let device = Default::default();
        let batcher = ClassificationBatcher::<NdArray>::new(2, 3, device);
        let items = vec![
            ClassificationItem {
                pixels: vec![0.5; 12],
                label: 2,
            },
            ClassificationItem {
                pixels: vec![1.0; 12],
                label: 0,
            },
        ];

        let batch = batcher.batch(items);

        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        let labels = batch.labels.into_data().to_vec::<f32>().unwrap();
        assert_eq!(labels, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
