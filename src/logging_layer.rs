extern crate log;
use env_logger::Builder;

fn level_from_name(name: &str) -> log::LevelFilter {
    match name.to_lowercase().as_str() {
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

pub fn initialize_logging_layer() {
    let mut builder = Builder::new();
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    builder.filter_level(level_from_name(&log_level));

    if builder.try_init().is_ok() {
        log::info!("Initialized the logger ..")
    }

    log_detected_x86_features();
}

#[cfg(target_arch = "x86_64")]
fn log_detected_x86_features() {
    let mut features: Vec<&str> = Vec::new();
    if is_x86_feature_detected!("sse") {
        features.push("SSE");
    }

    if is_x86_feature_detected!("sse3") {
        features.push("SSE3");
    }

    if is_x86_feature_detected!("avx") {
        features.push("AVX");
    }

    if is_x86_feature_detected!("avx2") {
        features.push("AVX2");
    }

    if is_x86_feature_detected!("fma") {
        features.push("FMA");
    }

    if features.is_empty() {
        log::info!("No selected CPU features detected ..");
    } else {
        log::info!("Detected CPU features: {:?}", features.join(", "));
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn log_detected_x86_features() {
    log::info!("Not an x86_64 target, adagrad uses the scalar kernel");
}
