use std::error::Error;
use std::fs::File;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::FfmError;

/// Training configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parameters {
    #[serde(default = "default_eta")]
    pub eta: f32,
    #[serde(default = "default_f32_zero")]
    pub lambda: f32,
    #[serde(default = "default_nr_iters")]
    pub nr_iters: u32,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_nr_threads")]
    pub nr_threads: usize,
    #[serde(default = "default_bool_false")]
    pub quiet: bool,
    #[serde(default = "default_bool_false")]
    pub normalization: bool,
    // UNUSED, accepted so existing parameter files keep loading
    #[serde(default = "default_bool_true")]
    pub random: bool,
    #[serde(default = "default_u64_zero")]
    pub seed: u64,
    #[serde(default = "default_bool_true")]
    pub fastmath: bool,
}

fn default_eta() -> f32 {
    0.1
}
fn default_f32_zero() -> f32 {
    0.0
}
fn default_nr_iters() -> u32 {
    15
}
fn default_k() -> usize {
    4
}
fn default_nr_threads() -> usize {
    1
}
fn default_bool_false() -> bool {
    false
}
fn default_bool_true() -> bool {
    true
}
fn default_u64_zero() -> u64 {
    0
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::new_default()
    }
}

impl Parameters {
    pub fn new_default() -> Parameters {
        Parameters {
            eta: default_eta(),
            lambda: default_f32_zero(),
            nr_iters: default_nr_iters(),
            k: default_k(),
            nr_threads: default_nr_threads(),
            quiet: default_bool_false(),
            normalization: default_bool_false(),
            random: default_bool_true(),
            seed: default_u64_zero(),
            fastmath: default_bool_true(),
        }
    }

    /// Missing keys fall back to defaults
    pub fn new_from_json(contents: &str) -> Result<Parameters, Box<dyn Error>> {
        let param: Parameters = serde_json::from_str(contents)?;
        Ok(param)
    }

    pub fn new_from_jsonfile(input_filename: &str) -> Result<Parameters, Box<dyn Error>> {
        let mut input = match File::open(input_filename) {
            Ok(input) => input,
            Err(e) => {
                return Err(Box::new(FfmError::IoFailure(format!(
                    "Could not open parameters file {}: {}",
                    input_filename, e
                ))))
            }
        };
        let mut contents = String::new();
        input.read_to_string(&mut contents)?;
        Parameters::new_from_json(&contents)
    }

    /// Defaults, then the --params file if given, then the individual flags
    pub fn new_from_cmdline(cl: &clap::ArgMatches<'_>) -> Result<Parameters, Box<dyn Error>> {
        let mut param = match cl.value_of("params") {
            Some(filename) => Parameters::new_from_jsonfile(filename)?,
            None => Parameters::new_default(),
        };

        if let Some(val) = cl.value_of("learning_rate") {
            param.eta = val.parse()?;
        }
        if let Some(val) = cl.value_of("l2") {
            param.lambda = val.parse()?;
        }
        if let Some(val) = cl.value_of("passes") {
            param.nr_iters = val.parse()?;
        }
        if let Some(val) = cl.value_of("ffm_k") {
            param.k = val.parse()?;
        }
        if let Some(val) = cl.value_of("threads") {
            param.nr_threads = val.parse()?;
        }
        if let Some(val) = cl.value_of("seed") {
            param.seed = val.parse()?;
        }
        if cl.is_present("quiet") {
            param.quiet = true;
        }
        if cl.is_present("normalization") {
            param.normalization = true;
        }
        if cl.is_present("no_fastmath") {
            param.fastmath = false;
        }

        param.validate()?;
        Ok(param)
    }

    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        let problem = if self.k == 0 {
            Some("k has to be positive".to_string())
        } else if !(self.eta > 0.0) {
            Some(format!("eta has to be positive, got {}", self.eta))
        } else if self.nr_threads == 0 {
            Some("nr_threads has to be positive".to_string())
        } else {
            None
        };
        match problem {
            Some(msg) => Err(Box::new(FfmError::InvalidState(msg))),
            None => Ok(()),
        }
    }
}
