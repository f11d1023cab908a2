use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use log::{debug, info, warn};

use crate::{
    augmentation::{AugmentationConfig, Augmenter},
    callbacks::{Decision, EarlyStopping, ReduceLrOnPlateau},
    dataset::{discover_classes, ClassificationBatcher, ImageFolder, Subset},
    metric::{correct_predictions, EpochAccumulator, EpochRecord, TrainingHistory},
    model::{Model, ModelConfig},
    persist,
    pipeline::DataStream,
    report,
    settings::Settings,
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    pub augmentation: AugmentationConfig,
    #[config(default = 15)]
    pub num_epochs: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-4)]
    pub learning_rate: f64,
    /// Epochs without a lower `val_loss` before training stops.
    #[config(default = 10)]
    pub early_stopping_patience: usize,
    /// Epochs without a lower `val_loss` before the learning rate is reduced.
    #[config(default = 5)]
    pub lr_decay_patience: usize,
    #[config(default = 0.2)]
    pub lr_decay_factor: f64,
    #[config(default = 1.0e-5)]
    pub min_learning_rate: f64,
    #[config(default = 1.0e-4)]
    pub lr_decay_min_delta: f64,
}

/// Adam bound to the classifier.
pub type ModelOptimizer<B> = OptimizerAdaptor<Adam<<B as AutodiffBackend>::InnerBackend>, Model<B>, B>;
/// Per-parameter Adam moments, saved alongside the weights.
pub type OptimizerRecord<B> = <ModelOptimizer<B> as Optimizer<Model<B>, B>>::Record;

pub struct TrainOutcome<B: AutodiffBackend> {
    /// Final weights; the best epoch's weights when early stopping fired.
    pub model: Model<B>,
    /// Optimizer state after the last training step.
    pub optimizer: OptimizerRecord<B>,
    pub history: TrainingHistory,
    pub stopped_early: bool,
    pub best_epoch: Option<usize>,
}

/// Runs the epoch loop over the two streams.
///
/// Each epoch consumes `steps_per_epoch` batches from each stream, so a
/// trailing partial batch is never used. With fewer samples than one batch
/// the epoch does no work and records `NaN` metrics.
pub fn fit<B: AutodiffBackend>(
    model: Model<B>,
    train: &mut DataStream<B>,
    valid: &mut DataStream<B::InnerBackend>,
    config: &TrainingConfig,
) -> crate::error::Result<TrainOutcome<B>> {
    fit_with_optimizer(model, config.optimizer.init(), train, valid, config)
}

/// Same as [`fit`], continuing from an existing optimizer state.
pub fn fit_with_optimizer<B: AutodiffBackend>(
    model: Model<B>,
    optim: ModelOptimizer<B>,
    train: &mut DataStream<B>,
    valid: &mut DataStream<B::InnerBackend>,
    config: &TrainingConfig,
) -> crate::error::Result<TrainOutcome<B>> {
    let mut model = model;
    let mut optim = optim;
    let mut lr = config.learning_rate;
    let mut history = TrainingHistory::default();
    let mut stopping = EarlyStopping::new(config.early_stopping_patience);
    let mut plateau = ReduceLrOnPlateau::new(
        config.learning_rate,
        config.lr_decay_factor,
        config.lr_decay_patience,
        config.min_learning_rate,
    )
    .with_min_delta(config.lr_decay_min_delta);

    let train_steps = train.steps_per_epoch();
    let valid_steps = valid.steps_per_epoch();
    info!(
        "training on {} samples ({} steps), validating on {} samples ({} steps)",
        train.samples(),
        train_steps,
        valid.samples(),
        valid_steps
    );
    if train_steps == 0 {
        warn!(
            "{} training samples is less than one batch of {}; epochs will not update the model",
            train.samples(),
            train.batch_size()
        );
    }

    let mut stopped_early = false;

    for epoch in 0..config.num_epochs {
        let mut train_metrics = EpochAccumulator::default();
        for (step, batch) in train.epoch().take(train_steps).enumerate() {
            let batch = batch?;
            let batch_size = batch.images.dims()[0];
            let output = model.forward_classification(batch.images, batch.labels);

            let loss: f64 = output.loss.clone().into_scalar().elem();
            let correct = correct_predictions(output.output, output.labels);
            train_metrics.update(loss, correct, batch_size);

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(lr, model, grads);

            debug!("epoch {} step {}/{}: loss = {:.4}", epoch + 1, step + 1, train_steps, loss);
        }

        let model_valid = model.valid();
        let mut valid_metrics = EpochAccumulator::default();
        for batch in valid.epoch().take(valid_steps) {
            let batch = batch?;
            let batch_size = batch.images.dims()[0];
            let output = model_valid.forward_classification(batch.images, batch.labels);

            let loss: f64 = output.loss.into_scalar().elem();
            let correct = correct_predictions(output.output, output.labels);
            valid_metrics.update(loss, correct, batch_size);
        }

        let record = EpochRecord {
            accuracy: train_metrics.accuracy(),
            loss: train_metrics.loss(),
            val_accuracy: valid_metrics.accuracy(),
            val_loss: valid_metrics.loss(),
            lr,
        };
        history.push(record);
        info!(
            "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} - lr: {:.2e}",
            epoch + 1,
            config.num_epochs,
            record.loss,
            record.accuracy,
            record.val_loss,
            record.val_accuracy,
            lr
        );

        let decision = stopping.observe(epoch, record.val_loss, || model.clone());
        lr = plateau.observe(record.val_loss);

        if decision == Decision::Stop {
            stopped_early = true;
            if let Some(best) = stopping.take_best() {
                info!(
                    "restoring weights from epoch {}",
                    stopping.best_epoch().map_or(0, |epoch| epoch + 1)
                );
                model = best;
            }
            break;
        }
    }

    Ok(TrainOutcome {
        model,
        optimizer: optim.to_record(),
        history,
        stopped_early,
        best_epoch: stopping.best_epoch(),
    })
}

/// Full run: validate the dataset, train, render the curves and persist the model.
pub fn train<B: AutodiffBackend>(
    settings: &Settings,
    config: TrainingConfig,
    device: B::Device,
) -> crate::error::Result<TrainingHistory> {
    let classes = discover_classes(&settings.dataset_dir)?;

    B::seed(config.seed);

    let image_size = config.model.image_size;
    let split = config.augmentation.validation_split;
    let augmenter = Augmenter::new(config.augmentation.clone());

    let train_set = ImageFolder::new(&settings.dataset_dir, &classes, Subset::Training, split)?;
    let valid_set = ImageFolder::new(&settings.dataset_dir, &classes, Subset::Validation, split)?;

    let mut train_stream = DataStream::new(
        train_set,
        augmenter.clone(),
        ClassificationBatcher::<B>::new(image_size, classes.len(), device.clone()),
        config.batch_size,
        image_size as u32,
        config.seed,
    );
    let mut valid_stream = DataStream::new(
        valid_set,
        augmenter,
        ClassificationBatcher::<B::InnerBackend>::new(image_size, classes.len(), device.clone()),
        config.batch_size,
        image_size as u32,
        config.seed.wrapping_add(1),
    );

    let model = config.model.init::<B>(&device);
    let outcome = fit(model, &mut train_stream, &mut valid_stream, &config)?;

    report::plot_history(&outcome.history, &settings.report_dir)?;
    report::save_history(&outcome.history, &settings.report_dir)?;
    persist::save_artifact(
        &settings.artifact_dir,
        &config,
        &classes,
        outcome.model,
        outcome.optimizer,
    )?;

    Ok(outcome.history)
}
