use clap::{App, AppSettings, Arg};

pub fn parse<'a>() -> clap::ArgMatches<'a> {
    let matches = create_expected_args().get_matches();
    matches
}

pub fn create_expected_args<'a>() -> App<'a, 'a> {
    App::new("ffm")
                    .version(env!("CARGO_PKG_VERSION"))
                    .about("Field-aware factorization machine for binary classification")
                    .setting(AppSettings::DeriveDisplayOrder)
                    .arg(Arg::with_name("data")
                     .long("data")
                     .short("d")
                     .value_name("filename")
                     .help("File with input examples, one JSON object per line (.gz and .zst are decompressed)")
                     .takes_value(true))
                    .arg(Arg::with_name("validation")
                     .long("validation")
                     .value_name("filename")
                     .help("File with validation examples, its log loss is reported after every pass")
                     .takes_value(true))
                    .arg(Arg::with_name("target")
                     .long("target")
                     .value_name("column")
                     .help("Name of the label column, integer valued: positive means +1, anything else -1")
                     .default_value("label")
                     .takes_value(true))
                    .arg(Arg::with_name("features")
                     .long("features")
                     .value_name("column,column,...")
                     .help("Comma separated feature columns, each one is a field. Values are {\"<id>\": <number>} dicts")
                     .takes_value(true))
                    .arg(Arg::with_name("final_regressor")
                     .long("final_regressor")
                     .short("f")
                     .value_name("filename")
                     .help("Final regressor to save (text model)")
                     .takes_value(true))
                    .arg(Arg::with_name("initial_regressor")
                     .long("initial_regressor")
                     .short("i")
                     .value_name("filename")
                     .help("Load a trained model and only predict")
                     .conflicts_with("final_regressor")
                     .takes_value(true))
                    .arg(Arg::with_name("predictions")
                     .long("predictions")
                     .short("p")
                     .value_name("filename")
                     .help("File to output predictions to")
                     .takes_value(true))
                    .arg(Arg::with_name("learning_rate")
                     .long("learning_rate")
                     .short("l")
                     .value_name("0.1")
                     .help("Adagrad learning rate (eta)")
                     .takes_value(true))
                    .arg(Arg::with_name("l2")
                     .long("l2")
                     .value_name("0.0")
                     .help("L2 regularization coefficient (lambda)")
                     .takes_value(true))
                    .arg(Arg::with_name("passes")
                     .long("passes")
                     .value_name("15")
                     .help("Number of passes over the training data")
                     .takes_value(true))
                    .arg(Arg::with_name("ffm_k")
                     .long("ffm_k")
                     .value_name("k")
                     .help("Length of a latent vector of each (feature, field)")
                     .takes_value(true))
                    .arg(Arg::with_name("threads")
                     .long("threads")
                     .value_name("1")
                     .help("Number of threads used for prediction")
                     .takes_value(true))
                    .arg(Arg::with_name("normalization")
                     .long("normalization")
                     .help("Scale every example by the inverse of its norm")
                     .takes_value(false))
                    .arg(Arg::with_name("no_fastmath")
                     .long("no_fastmath")
                     .help("Use exact square roots in adagrad instead of the hardware approximation")
                     .takes_value(false))
                    .arg(Arg::with_name("seed")
                     .long("seed")
                     .value_name("0")
                     .help("Seed of the initial weights")
                     .takes_value(true))
                    .arg(Arg::with_name("quiet")
                     .long("quiet")
                     .help("Do not report progress")
                     .takes_value(false))
                    .arg(Arg::with_name("params")
                     .long("params")
                     .value_name("filename")
                     .help("JSON file with training parameters, flags given on the command line take precedence")
                     .takes_value(true))
}

/// Column names of --features, empty entries dropped
pub fn feature_columns(cl: &clap::ArgMatches<'_>) -> Vec<String> {
    match cl.value_of("features") {
        Some(s) => s
            .split(',')
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect(),
        None => Vec::new(),
    }
}
