use std::path::{Path, PathBuf};

use colorizers::{Colorizer, LabColorizer, OnnxPredictor};
use imager::Settings;

static IMAGE_OUT: &str = "colorized.png";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let input = match args.next() {
        Some(input) => PathBuf::from(input),
        None => {
            eprintln!("usage: colorize_file <input> [output]");
            std::process::exit(2);
        }
    };
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(IMAGE_OUT));

    let settings = Settings::load(None)?;
    let predictor = OnnxPredictor::load(&settings.model.artifacts(), settings.model.session_options())?;
    let colorizer = LabColorizer::new(predictor);

    let result = colorizer.colorize_path(Path::new(&input))?;
    println!(
        "colorized {:?} ({}x{})",
        input,
        result.colorized.width(),
        result.colorized.height()
    );

    // the format is picked from the output extension
    result.colorized.save(&output)?;
    println!("saved {:?}", output);
    Ok(())
}
