//! The model artifact: a directory holding the training config, the class
//! order the model was trained with, the weights and the optimizer state.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    prelude::Backend,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use log::info;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::training::{OptimizerRecord, TrainingConfig};

pub const CONFIG_FILE: &str = "config.json";
pub const CLASSES_FILE: &str = "classes.json";
/// The recorder appends its own extension to both record files.
pub const MODEL_FILE: &str = "model";
pub const OPTIMIZER_FILE: &str = "optimizer";

/// Full precision so a reloaded model reproduces the saved one's outputs exactly.
pub type ArtifactRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub struct Artifact<B: Backend> {
    pub config: TrainingConfig,
    pub classes: Vec<String>,
    pub model: Model<B>,
}

/// Writes the artifact, replacing whatever was at `dir`.
pub fn save_artifact<B: AutodiffBackend>(
    dir: &Path,
    config: &TrainingConfig,
    classes: &[String],
    model: Model<B>,
    optimizer: OptimizerRecord<B>,
) -> Result<()> {
    create_artifact_dir(dir)?;

    config.save(dir.join(CONFIG_FILE))?;
    fs::write(dir.join(CLASSES_FILE), serde_json::to_string_pretty(classes)?)?;
    model
        .save_file(dir.join(MODEL_FILE), &ArtifactRecorder::new())
        .map_err(|err| Error::Record(format!("{err:?}")))?;
    <ArtifactRecorder as Recorder<B>>::record(&ArtifactRecorder::new(), optimizer, dir.join(OPTIMIZER_FILE))
        .map_err(|err| Error::Record(format!("{err:?}")))?;

    info!("model saved to {:?} (classes {:?})", dir, classes);
    Ok(())
}

pub fn load_artifact<B: Backend>(dir: &Path, device: &B::Device) -> Result<Artifact<B>> {
    let config = TrainingConfig::load(dir.join(CONFIG_FILE))
        .map_err(|err| Error::Config(format!("{:?}: {err:?}", dir.join(CONFIG_FILE))))?;
    let classes: Vec<String> = serde_json::from_str(&fs::read_to_string(dir.join(CLASSES_FILE))?)?;

    let model = config
        .model
        .init::<B>(device)
        .load_file(dir.join(MODEL_FILE), &ArtifactRecorder::new(), device)
        .map_err(|err| Error::Record(format!("{err:?}")))?;

    info!("model loaded from {:?}", dir);
    Ok(Artifact {
        config,
        classes,
        model,
    })
}

/// Reads the Adam state saved next to the weights, for resuming training
/// with [`crate::training::fit_with_optimizer`].
pub fn load_optimizer<B: AutodiffBackend>(dir: &Path, device: &B::Device) -> Result<OptimizerRecord<B>> {
    <ArtifactRecorder as Recorder<B>>::load(&ArtifactRecorder::new(), dir.join(OPTIMIZER_FILE), device)
        .map_err(|err| Error::Record(format!("{err:?}")))
}

fn create_artifact_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    fs::create_dir_all(dir)?;
    Ok(())
}
