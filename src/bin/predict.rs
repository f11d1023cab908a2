use std::path::PathBuf;

use burn::backend::wgpu::WgpuDevice;
use clap::Parser;
use waste_classifier::{inference::render_prediction, Predictor, Settings};

/// Classify one image with a trained model.
#[derive(Parser, Debug)]
#[command(name = "predict")]
struct Args {
    image: PathBuf,

    /// Directory holding the trained model
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Also write an SVG of the image titled with the prediction
    #[arg(long)]
    render: Option<PathBuf>,
}

fn main() -> Result<(), waste_classifier::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    type MyBackend = burn::backend::Wgpu<f32, i32>;

    let args = Args::parse();
    let settings = Settings::resolve(None, args.artifact_dir, None);

    let predictor = Predictor::<MyBackend>::load(&settings.artifact_dir, WgpuDevice::default())?;
    let prediction = predictor.predict_image(&args.image)?;

    println!("Predicted: {}", prediction.label);
    for (class, p) in predictor.classes().iter().zip(&prediction.probabilities) {
        println!("  {class:<10} {p:.4}");
    }

    if let Some(out) = args.render {
        render_prediction(&args.image, &prediction.label, &out)?;
    }
    Ok(())
}
