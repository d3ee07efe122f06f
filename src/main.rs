/// Replay a recorded input script against a headless surface and print the
/// resulting state as JSON.
///
/// Usage: `annotator-replay <script.json> [config.json]`
#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use annotator::config::AnnotatorConfig;
    use annotator::replay::{ReplayScript, replay};
    use std::path::PathBuf;
    use std::process::ExitCode;

    let mut args = std::env::args().skip(1);
    let Some(script_path) = args.next().map(PathBuf::from) else {
        eprintln!("Usage: annotator-replay <script.json> [config.json]");
        return ExitCode::from(2);
    };

    let config = match args.next().map(PathBuf::from) {
        Some(path) => match AnnotatorConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {:?}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => AnnotatorConfig::load_from_default_path().unwrap_or_default(),
    };

    env_logger::Builder::new()
        .filter_level(config.preferences.log_level.to_level_filter())
        .parse_default_env()
        .init();
    log::info!("Replaying {:?}", script_path);

    let script = match ReplayScript::load(&script_path) {
        Ok(script) => script,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = replay(config, &script);
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to encode summary: {}", e);
            ExitCode::FAILURE
        }
    }
}

// The replay driver needs a filesystem; there is nothing to run on WASM.
#[cfg(target_arch = "wasm32")]
fn main() {}
