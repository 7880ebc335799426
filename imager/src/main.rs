use std::path::PathBuf;
use std::sync::Arc;

use colorizers::{ColorizerError, LabColorizer, OnnxPredictor};
use imager::{logger, server, ColorizerService, ResourceInfo, Settings};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logger::init_logger(std::env::var_os("IMAGER_LOG_JSON").is_some());

    let config_path = std::env::var_os("IMAGER_CONFIG").map(PathBuf::from);
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("failed to load settings: {}", e);
            std::process::exit(1);
        }
    };
    info!("settings: {:?}", settings);

    let artifacts = settings.model.artifacts();
    let predictor = match OnnxPredictor::load(&artifacts, settings.model.session_options()) {
        Ok(predictor) => predictor,
        Err(e @ ColorizerError::MissingModel { .. }) => {
            error!("{}", e);
            eprintln!(
                "Missing model file\nYou are missing the file {:?}.\n\
                 Export colorization_release_v2.caffemodel to ONNX and place it into your {:?} folder.\n\
                 You can download the weights from this location:\n{}",
                artifacts.model, settings.model.directory, artifacts.download_url
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to load the colorization network: {}", e);
            std::process::exit(1);
        }
    };

    let colorizer = LabColorizer::new(predictor);
    let info = ResourceInfo::new(&settings.model.network, colorizer.input_size());
    let service = ColorizerService::new(Arc::new(colorizer), settings.api.clone(), info);

    info!(
        "Try to open URL http://{}{}",
        settings.server.bind_address(),
        service.prefix()
    );

    if let Err(e) = server::run(&settings.server.bind_address(), service).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}
