use std::path::PathBuf;

use burn::{
    backend::{wgpu::WgpuDevice, Autodiff},
    optim::AdamConfig,
};
use clap::Parser;
use waste_classifier::{AugmentationConfig, ModelConfig, Settings, TrainingConfig};

/// Train the plastic / paper / garbage classifier.
#[derive(Parser, Debug)]
#[command(name = "train")]
struct Args {
    /// Dataset root with one subdirectory per class
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Where the trained model is written
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Where the learning curves are written
    #[arg(long)]
    report_dir: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,
}

fn main() -> Result<(), waste_classifier::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    type MyBackend = burn::backend::Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    let args = Args::parse();
    let settings = Settings::resolve(args.dataset, args.artifact_dir, args.report_dir);
    let device = WgpuDevice::default();

    let mut config = TrainingConfig::new(ModelConfig::new(), AdamConfig::new(), AugmentationConfig::new());
    if let Some(epochs) = args.epochs {
        config = config.with_num_epochs(epochs);
    }

    let history = waste_classifier::train::<MyAutodiffBackend>(&settings, config, device)?;

    if let (Some(acc), Some(val_acc)) = (history.accuracy.last(), history.val_accuracy.last()) {
        log::info!(
            "finished after {} epochs: accuracy {:.4}, val_accuracy {:.4}",
            history.epochs(),
            acc,
            val_acc
        );
    }
    Ok(())
}
