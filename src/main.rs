use std::error::Error;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use ffm::dataset::{Problem, Table};
use ffm::parameters::Parameters;
use ffm::persistence::{load_model_from_filename, save_model_to_filename};
use ffm::regressor::{predict_problem, train};
use ffm::{cmdline, logging_layer};

fn main() {
    logging_layer::initialize_logging_layer();

    if let Err(e) = main_ffm_loop() {
        log::error!("Global error: {:?}", e);
        std::process::exit(1)
    }
}

fn write_predictions(filename: Option<&str>, predictions: &[f32]) -> Result<(), Box<dyn Error>> {
    // Where will we be putting predictions
    let mut output: Box<dyn Write> = match filename {
        Some(filename) => Box::new(BufWriter::new(File::create(filename)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    for prediction in predictions {
        writeln!(output, "{:.6}", prediction)?;
    }
    output.flush()?;
    Ok(())
}

fn main_ffm_loop() -> Result<(), Box<dyn Error>> {
    // We'll parse once the command line into cl and then different objects will examine it
    let cl = cmdline::parse();
    let param = Parameters::new_from_cmdline(&cl)?;

    let input_filename = match cl.value_of("data") {
        Some(filename) => filename,
        None => return Err("--data expected")?,
    };
    let target = cl.value_of("target").unwrap_or("label");
    let features = cmdline::feature_columns(&cl);
    if features.is_empty() {
        return Err("--features expected, at least one feature column is needed")?;
    }
    let mut columns = vec![target.to_string()];
    columns.extend(features.iter().cloned());
    let table = Table::from_path(Path::new(input_filename), &columns)?;

    if let Some(filename) = cl.value_of("initial_regressor") {
        log::info!("initial_regressor = {}", filename);
        let model = load_model_from_filename(filename)?;
        if model.m != features.len() {
            log::warn!(
                "Model has {} fields, {} feature columns given, fields beyond the model are skipped",
                model.m,
                features.len()
            );
        }
        let problem = Problem::with_dimensions(&table, target, &features, model.n, model.m)?;
        let predictions = predict_problem(&model, &problem, param.nr_threads)?;
        write_predictions(cl.value_of("predictions"), &predictions)?;
        log::info!("Predicted {} rows", predictions.len());
        return Ok(());
    }

    log::info!("Parameters: {}", serde_json::to_string(&param)?);
    let tr = Problem::new(&table, target, &features)?;

    let va_table = match cl.value_of("validation") {
        Some(filename) => Some(Table::from_path(Path::new(filename), &columns)?),
        None => None,
    };
    let va = match &va_table {
        Some(va_table) => Some(Problem::with_dimensions(va_table, target, &features, tr.n, tr.m)?),
        None => None,
    };

    let (model, _report) = train(&tr, &param, va.as_ref())?;

    if let Some(filename) = cl.value_of("final_regressor") {
        log::info!("final_regressor = {}", filename);
        save_model_to_filename(&model, filename)?;
    }
    if let Some(filename) = cl.value_of("predictions") {
        let predictions = predict_problem(&model, &tr, param.nr_threads)?;
        write_predictions(Some(filename), &predictions)?;
    }
    Ok(())
}
