//! Restartable per-epoch batch streams over an [`ImageFolder`].

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::Backend,
};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::augmentation::Augmenter;
use crate::dataset::{load_rgb, ClassificationBatch, ClassificationBatcher, ClassificationItem, ImageFolder};
use crate::error::{Error, Result};

/// Whole batches that fit in `samples`; a trailing partial batch is not counted.
pub fn steps_per_epoch(samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    samples / batch_size
}

pub struct DataStream<B: Backend> {
    dataset: ImageFolder,
    augmenter: Augmenter,
    batcher: ClassificationBatcher<B>,
    batch_size: usize,
    image_size: u32,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl<B: Backend> DataStream<B> {
    pub fn new(
        dataset: ImageFolder,
        augmenter: Augmenter,
        batcher: ClassificationBatcher<B>,
        batch_size: usize,
        image_size: u32,
        seed: u64,
    ) -> Self {
        Self {
            dataset,
            augmenter,
            batcher,
            batch_size,
            image_size,
            shuffle: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn samples(&self) -> usize {
        self.dataset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn steps_per_epoch(&self) -> usize {
        steps_per_epoch(self.samples(), self.batch_size)
    }

    /// Starts a new pass over the data.
    ///
    /// Yields full batches, then one shorter batch holding the remainder if
    /// the sample count is not a multiple of the batch size. Images are
    /// loaded and augmented lazily as each batch is requested.
    pub fn epoch(&mut self) -> EpochIter<'_, B> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }

        EpochIter {
            stream: self,
            order,
            cursor: 0,
        }
    }

    fn load_batch(&mut self, indices: &[usize]) -> Result<ClassificationBatch<B>> {
        let mut items = Vec::with_capacity(indices.len());
        for &index in indices {
            let sample = self
                .dataset
                .get(index)
                .ok_or(Error::SampleOutOfRange {
                    index,
                    len: self.dataset.len(),
                })?;
            let image = load_rgb(&sample.path, self.image_size)?;
            let pixels = self.augmenter.transform(&image, &mut self.rng);
            items.push(ClassificationItem {
                pixels,
                label: sample.label,
            });
        }

        Ok(self.batcher.batch(items))
    }
}

pub struct EpochIter<'a, B: Backend> {
    stream: &'a mut DataStream<B>,
    order: Vec<usize>,
    cursor: usize,
}

impl<B: Backend> Iterator for EpochIter<'_, B> {
    type Item = Result<ClassificationBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() || self.stream.batch_size == 0 {
            return None;
        }

        let end = (self.cursor + self.stream.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        Some(self.stream.load_batch(&indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augmentation::AugmentationConfig;
    use crate::dataset::ImageSample;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn steps_per_epoch_is_floor_division() {
        let cases = [(0, 0), (31, 0), (32, 1), (33, 1), (320, 10)];
        for (samples, steps) in cases {
            assert_eq!(steps_per_epoch(samples, 32), steps, "samples = {samples}");
        }
    }

    fn folder(dir: &TempDir, count: usize) -> ImageFolder {
        let samples = (0..count)
            .map(|i| {
                let path = dir.path().join(format!("{i}.png"));
                RgbImage::from_fn(9, 7, |x, y| Rgb([(x * 20) as u8, (y * 30) as u8, i as u8]))
                    .save(&path)
                    .unwrap();
                ImageSample { path, label: i % 3 }
            })
            .collect();
        ImageFolder::from_samples(samples)
    }

    fn stream(dataset: ImageFolder, batch_size: usize, seed: u64) -> DataStream<NdArray> {
        DataStream::new(
            dataset,
            Augmenter::new(AugmentationConfig::new()),
            ClassificationBatcher::new(6, 3, Default::default()),
            batch_size,
            6,
            seed,
        )
    }

    #[test]
    fn final_batch_holds_the_remainder() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream(folder(&dir, 7), 3, 1);

        let shapes: Vec<[usize; 4]> = stream
            .epoch()
            .map(|batch| batch.unwrap().images.dims())
            .collect();

        assert_eq!(shapes, vec![[3, 3, 6, 6], [3, 3, 6, 6], [1, 3, 6, 6]]);
        assert_eq!(stream.steps_per_epoch(), 2);
    }

    #[test]
    fn same_seed_gives_same_batches() {
        let dir = TempDir::new().unwrap();
        let dataset = folder(&dir, 5);
        let mut a = stream(dataset.clone(), 2, 9);
        let mut b = stream(dataset, 2, 9);

        for _ in 0..2 {
            let left: Vec<Vec<f32>> = a
                .epoch()
                .map(|batch| batch.unwrap().images.into_data().to_vec::<f32>().unwrap())
                .collect();
            let right: Vec<Vec<f32>> = b
                .epoch()
                .map(|batch| batch.unwrap().images.into_data().to_vec::<f32>().unwrap())
                .collect();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn every_sample_is_visited_once_per_epoch() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream(folder(&dir, 6), 4, 5);

        for _ in 0..3 {
            let mut per_class = [0.0f32; 3];
            for batch in stream.epoch() {
                let labels = batch.unwrap().labels.into_data().to_vec::<f32>().unwrap();
                for (i, value) in labels.iter().enumerate() {
                    per_class[i % 3] += value;
                }
            }
            assert_eq!(per_class, [2.0, 2.0, 2.0]);
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let dataset = ImageFolder::from_samples(vec![ImageSample {
            path: dir.path().join("gone.png"),
            label: 0,
        }]);
        let mut stream = stream(dataset, 1, 0);

        let first = stream.epoch().next().unwrap();
        assert!(first.is_err());
    }

    #[test]
    fn out_of_range_index_fails_instead_of_shrinking_the_batch() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream(folder(&dir, 2), 2, 0);

        let result = stream.load_batch(&[0, 5]);
        assert!(matches!(result, Err(Error::SampleOutOfRange { index: 5, len: 2 })));
    }
}
