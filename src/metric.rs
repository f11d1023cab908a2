use burn::{
    prelude::Backend,
    tensor::{ElementConversion, Tensor},
};
use serde::{Deserialize, Serialize};

/// Number of rows whose highest output matches the one-hot label.
pub fn correct_predictions<B: Backend>(output: Tensor<B, 2>, labels: Tensor<B, 2>) -> usize {
    let predicted = output.argmax(1);
    let expected = labels.argmax(1);
    let correct: i64 = predicted.equal(expected).int().sum().into_scalar().elem();
    correct as usize
}

/// Running mean of loss and accuracy over the batches of one epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpochAccumulator {
    loss_sum: f64,
    batches: usize,
    correct: usize,
    seen: usize,
}

impl EpochAccumulator {
    pub fn update(&mut self, loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += loss;
        self.batches += 1;
        self.correct += correct;
        self.seen += batch_size;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// `NaN` when no batch was seen.
    pub fn loss(&self) -> f64 {
        self.loss_sum / self.batches as f64
    }

    /// `NaN` when no sample was seen.
    pub fn accuracy(&self) -> f64 {
        self.correct as f64 / self.seen as f64
    }
}

pub const ACCURACY: &str = "accuracy";
pub const LOSS: &str = "loss";
pub const VAL_ACCURACY: &str = "val_accuracy";
pub const VAL_LOSS: &str = "val_loss";

/// Per-epoch metrics of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub accuracy: Vec<f64>,
    pub loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    /// Learning rate used during each epoch.
    pub lr: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub accuracy: f64,
    pub loss: f64,
    pub val_accuracy: f64,
    pub val_loss: f64,
    pub lr: f64,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.accuracy.push(record.accuracy);
        self.loss.push(record.loss);
        self.val_accuracy.push(record.val_accuracy);
        self.val_loss.push(record.val_loss);
        self.lr.push(record.lr);
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    /// Looks a series up by its metric name (`accuracy`, `loss`, `val_accuracy`, `val_loss`, `lr`).
    pub fn get(&self, metric: &str) -> Option<&[f64]> {
        match metric {
            ACCURACY => Some(&self.accuracy),
            LOSS => Some(&self.loss),
            VAL_ACCURACY => Some(&self.val_accuracy),
            VAL_LOSS => Some(&self.val_loss),
            "lr" => Some(&self.lr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn counts_matching_argmax() {
        let device = Default::default();
        let output = Tensor::<NdArray, 2>::from_floats(
            [[0.1, 0.7, 0.2], [0.8, 0.1, 0.1], [0.3, 0.3, 0.4]],
            &device,
        );
        let labels = Tensor::<NdArray, 2>::from_floats(
            [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
            &device,
        );

        assert_eq!(correct_predictions(output, labels), 2);
    }

    #[test]
    fn accumulator_averages_batches() {
        let mut acc = EpochAccumulator::default();
        acc.update(1.0, 30, 32);
        acc.update(0.5, 2, 32);

        assert_eq!(acc.batches(), 2);
        assert!((acc.loss() - 0.75).abs() < 1e-12);
        assert!((acc.accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_epoch_is_nan() {
        let acc = EpochAccumulator::default();
        assert!(acc.loss().is_nan());
        assert!(acc.accuracy().is_nan());
    }

    #[test]
    fn series_are_addressable_by_name() {
        let mut history = TrainingHistory::default();
        history.push(EpochRecord {
            accuracy: 0.4,
            loss: 1.2,
            val_accuracy: 0.35,
            val_loss: 1.3,
            lr: 1e-4,
        });

        assert_eq!(history.epochs(), 1);
        assert_eq!(history.get(VAL_LOSS), Some(&[1.3][..]));
        assert_eq!(history.get("lr"), Some(&[1e-4][..]));
        assert_eq!(history.get("precision"), None);
    }
}
