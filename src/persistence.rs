use std::error::Error;
use std::fs;
use std::io;
use std::io::{Read, Write};
use std::str::{FromStr, SplitAsciiWhitespace};

use crate::error::{malformed, FfmError};
use crate::model::Model;

// Text format, whitespace separated:
//   n <n>
//   m <m>
//   k <k>
//   normalization <0|1>
//   w<j>,<f> <k floats>      for every j in 0..n, f in 0..m
// Rust's float Display is the shortest representation that parses back to the same f32.

fn write_model(model: &Model, output: &mut dyn io::Write) -> io::Result<()> {
    writeln!(output, "n {}", model.n)?;
    writeln!(output, "m {}", model.m)?;
    writeln!(output, "k {}", model.k)?;
    writeln!(output, "normalization {}", model.normalization as u8)?;
    for j in 0..model.n {
        for f in 0..model.m {
            write!(output, "w{},{} ", j, f)?;
            // only the live embedding, accumulators of a model in training are not persisted
            for w in model.embedding(j, f) {
                write!(output, "{} ", w)?;
            }
            writeln!(output)?;
        }
    }
    output.flush()
}

pub fn save_model_to_buf(model: &Model, output_bufwriter: &mut dyn io::Write) -> Result<(), Box<dyn Error>> {
    match write_model(model, output_bufwriter) {
        Ok(()) => Ok(()),
        Err(e) => Err(Box::new(FfmError::IoFailure(format!("Could not write model: {}", e)))),
    }
}

pub fn save_model_to_filename(model: &Model, filename: &str) -> Result<(), Box<dyn Error>> {
    let output = match fs::File::create(filename) {
        Ok(output) => output,
        Err(e) => {
            return Err(Box::new(FfmError::IoFailure(format!(
                "Could not create {}: {}",
                filename, e
            ))))
        }
    };
    let mut output_bufwriter = io::BufWriter::new(output);
    save_model_to_buf(model, &mut output_bufwriter)?;
    log::info!("Saved model n: {}, m: {}, k: {} to {}", model.n, model.m, model.k, filename);
    Ok(())
}

fn next_token<'a>(tokens: &mut SplitAsciiWhitespace<'a>, what: &str) -> Result<&'a str, Box<dyn Error>> {
    match tokens.next() {
        Some(token) => Ok(token),
        None => malformed(format!("Model file ends before {}", what)),
    }
}

fn parse_token<T: FromStr>(token: &str, what: &str) -> Result<T, Box<dyn Error>> {
    match token.parse() {
        Ok(value) => Ok(value),
        Err(_) => malformed(format!("Cannot parse {} from \"{}\"", what, token)),
    }
}

fn read_header_value<T: FromStr>(tokens: &mut SplitAsciiWhitespace<'_>, key: &str) -> Result<T, Box<dyn Error>> {
    let found = next_token(tokens, key)?;
    if found != key {
        return malformed(format!("Expected header \"{}\", found \"{}\"", key, found));
    }
    parse_token(next_token(tokens, key)?, key)
}

/// Loaded models come back shrunk: inference only
pub fn load_model_from_buf(input_bufreader: &mut dyn io::Read) -> Result<Model, Box<dyn Error>> {
    let mut contents = String::new();
    if let Err(e) = input_bufreader.read_to_string(&mut contents) {
        if e.kind() == io::ErrorKind::InvalidData {
            return malformed(format!("Model file is not text: {}", e));
        }
        return Err(Box::new(FfmError::IoFailure(format!("Could not read model: {}", e))));
    }
    let mut tokens = contents.split_ascii_whitespace();

    let n: usize = read_header_value(&mut tokens, "n")?;
    let m: usize = read_header_value(&mut tokens, "m")?;
    let k: usize = read_header_value(&mut tokens, "k")?;
    let normalization: i64 = read_header_value(&mut tokens, "normalization")?;

    let mut model = Model::new_shrunk(n, m, k, normalization != 0)?;
    let mut weights = model.weights_mut().chunks_exact_mut(k.max(1));
    for j in 0..n {
        for f in 0..m {
            // the w<j>,<f> label is not interpreted, blocks are positional
            next_token(&mut tokens, "block label")?;
            if k == 0 {
                continue;
            }
            if let Some(block) = weights.next() {
                for w in block.iter_mut() {
                    *w = parse_token(next_token(&mut tokens, "weight")?, "weight")?;
                }
            }
        }
    }
    Ok(model)
}

pub fn load_model_from_filename(filename: &str) -> Result<Model, Box<dyn Error>> {
    let input = match fs::File::open(filename) {
        Ok(input) => input,
        Err(e) => {
            return Err(Box::new(FfmError::IoFailure(format!(
                "Could not open {}: {}",
                filename, e
            ))))
        }
    };
    let mut input_bufreader = io::BufReader::new(input);
    let model = load_model_from_buf(&mut input_bufreader)?;
    log::info!(
        "Loaded model n: {}, m: {}, k: {}, normalization: {} from {}",
        model.n, model.m, model.k, model.normalization, filename
    );
    Ok(model)
}
