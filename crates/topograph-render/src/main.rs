//! Export a diagram file to PNG or JPEG.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use topograph_core::{Options, Scene};
use topograph_render::{ExportFormat, ExportOptions, ImageCache, export};

/// Render a topograph diagram to an image
#[derive(Parser, Debug)]
#[command(name = "topograph-export")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Diagram JSON file
    input: PathBuf,

    /// Output image; the extension picks PNG or JPEG
    output: PathBuf,

    /// Space around the diagram, in pixels
    #[arg(short, long, default_value = "0")]
    padding: f64,

    /// JPEG quality (1-100)
    #[arg(short, long, default_value = "92")]
    quality: u8,

    /// Output pixels per diagram unit
    #[arg(short, long, default_value = "1.0")]
    scale: f64,

    /// Editor options JSON
    #[arg(long)]
    options: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let options = match &cli.options {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    let format = ExportFormat::from_path(&cli.output)
        .ok_or_else(|| format!("unsupported output type: {}", cli.output.display()))?;

    let mut scene = Scene::new(options);
    scene.open_file(&cli.input)?;

    let base_dir = cli
        .input
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut images = ImageCache::with_base_dir(base_dir);
    let ready = images.resolve_pending(&mut scene);
    log::debug!("{} images loaded", ready);

    let export_options = ExportOptions::default()
        .with_padding(cli.padding)
        .with_quality(cli.quality)
        .with_scale(cli.scale)
        .with_format(format);
    export::save(&scene, &images, &cli.output, &export_options)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("topograph-export: {}", err);
            ExitCode::FAILURE
        }
    }
}
