use std::error::Error;
use std::thread;
use std::time::Instant;

use crate::block_ffm;
use crate::block_loss_functions::{logistic, logloss_and_gradient};
use crate::dataset::Problem;
use crate::error::FfmError;
use crate::feature_buffer::{row_scale, Node};
use crate::model::Model;
use crate::optimizer::{OptimizerAdagrad, OptimizerAdagradFast, OptimizerTrait};
use crate::parameters::Parameters;

/// Mean log loss of every pass, `va_logloss` stays empty without validation data
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingReport {
    pub tr_logloss: Vec<f64>,
    pub va_logloss: Vec<f64>,
}

fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Trains a fresh model on `tr` for `param.nr_iters` passes and returns it shrunk to `param.k`
pub fn train(
    tr: &Problem,
    param: &Parameters,
    va: Option<&Problem>,
) -> Result<(Model, TrainingReport), Box<dyn Error>> {
    param.validate()?;
    if param.fastmath {
        train_with::<OptimizerAdagradFast>(tr, param, va)
    } else {
        train_with::<OptimizerAdagrad>(tr, param, va)
    }
}

fn train_with<O: OptimizerTrait>(
    tr: &Problem,
    param: &Parameters,
    va: Option<&Problem>,
) -> Result<(Model, TrainingReport), Box<dyn Error>> {
    let mut model = Model::allocate(tr.n, tr.m, param.k, param.normalization, param.seed)?;
    let mut optimizer = O::new();
    optimizer.init(param.eta, param.lambda);
    log::debug!("Training with {} on {} rows", O::get_name(), tr.num_rows());

    let va = va.filter(|va| va.num_rows() != 0);
    if !param.quiet {
        match va {
            Some(_) => log::info!("{:>4}{:>13}{:>13}", "iter", "tr_logloss", "va_logloss"),
            None => log::info!("{:>4}{:>13}", "iter", "tr_logloss"),
        }
    }

    let now = Instant::now();
    let mut report = TrainingReport::default();
    for iter in 0..param.nr_iters {
        let mut tr_loss = 0.0f64;
        tr.for_each_row(|fb| {
            let r = row_scale(&fb.nodes, model.normalization);
            let t = block_ffm::forward(&fb.nodes, r, &model);
            let (loss, kappa) = logloss_and_gradient(fb.label, t, fb.example_number);
            tr_loss += loss;
            block_ffm::forward_backward(&fb.nodes, r, &mut model, kappa, &optimizer)
        })?;
        let tr_loss = mean(tr_loss, tr.num_rows());
        report.tr_logloss.push(tr_loss);

        match va {
            Some(va) => {
                let va_loss = problem_logloss(&model, va)?;
                report.va_logloss.push(va_loss);
                if !param.quiet {
                    log::info!("{:>4}{:>13.5}{:>13.5}", iter, tr_loss, va_loss);
                }
            }
            None => {
                if !param.quiet {
                    log::info!("{:>4}{:>13.5}", iter, tr_loss);
                }
            }
        }
    }
    if !param.quiet {
        log::info!("Elapsed time: {:.3}s", now.elapsed().as_secs_f64());
    }

    model.shrink(param.k)?;
    Ok((model, report))
}

/// Probability of the positive class for one row
pub fn predict(nodes: &[Node], model: &Model) -> f32 {
    let r = row_scale(nodes, model.normalization);
    logistic(block_ffm::forward(nodes, r, model))
}

/// Mean log loss of `model` over `problem`, nothing is updated
pub fn problem_logloss(model: &Model, problem: &Problem) -> Result<f64, Box<dyn Error>> {
    let mut total = 0.0f64;
    problem.for_each_row(|fb| {
        let r = row_scale(&fb.nodes, model.normalization);
        let t = block_ffm::forward(&fb.nodes, r, model);
        total += logloss_and_gradient(fb.label, t, fb.example_number).0;
        Ok(())
    })?;
    Ok(mean(total, problem.num_rows()))
}

/// Predictions for all rows, in row order. Rows are read on the calling thread,
/// scoring is split over up to `nr_threads` threads sharing the model.
pub fn predict_problem(model: &Model, problem: &Problem, nr_threads: usize) -> Result<Vec<f32>, Box<dyn Error>> {
    let mut rows: Vec<Vec<Node>> = Vec::with_capacity(problem.num_rows());
    problem.for_each_row(|fb| {
        rows.push(fb.nodes.clone());
        Ok(())
    })?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let nr_threads = nr_threads.max(1).min(rows.len());
    if nr_threads == 1 {
        return Ok(rows.iter().map(|nodes| predict(nodes, model)).collect());
    }
    let chunk_size = (rows.len() + nr_threads - 1) / nr_threads;
    let chunk_predictions: Vec<Option<Vec<f32>>> = thread::scope(|s| {
        let handles: Vec<_> = rows
            .chunks(chunk_size)
            .map(|chunk| s.spawn(move || chunk.iter().map(|nodes| predict(nodes, model)).collect::<Vec<f32>>()))
            .collect();
        handles.into_iter().map(|handle| handle.join().ok()).collect()
    });

    let mut predictions = Vec::with_capacity(rows.len());
    for chunk in chunk_predictions {
        match chunk {
            Some(chunk) => predictions.extend(chunk),
            None => {
                return Err(Box::new(FfmError::InvalidState(
                    "Prediction thread panicked".to_string(),
                )))
            }
        }
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;
    use crate::assert_epsilon;
    use crate::dataset::Table;
    use crate::error::kind_of;
    use serde_json::{json, Value};

    // label is 1 exactly when "a" holds feature 0
    fn separable_table() -> Table {
        let mut table = Table::new(&["y", "a", "b"]);
        for _ in 0..10 {
            table.push_row(vec![json!(1), json!({"0": 1.0}), json!({"2": 1.0})]).unwrap();
            table.push_row(vec![json!(0), json!({"1": 1.0}), json!({"3": 1.0})]).unwrap();
            table.push_row(vec![json!(1), json!({"0": 1.0}), json!({"3": 1.0})]).unwrap();
            table.push_row(vec![json!(0), json!({"1": 1.0}), json!({"4": 1.0})]).unwrap();
        }
        table
    }

    fn params(nr_iters: u32) -> Parameters {
        Parameters {
            eta: 0.2,
            nr_iters,
            quiet: true,
            ..Parameters::default()
        }
    }

    #[test]
    fn test_train_reduces_loss() {
        let table = separable_table();
        let problem = Problem::new(&table, "y", &["a", "b"]).unwrap();
        let (model, report) = train(&problem, &params(20), Some(&problem)).unwrap();
        assert_eq!(model.k, 4);
        assert!(!model.is_expanded());
        assert_eq!(report.tr_logloss.len(), 20);
        assert_eq!(report.va_logloss.len(), 20);
        assert!(report.tr_logloss[19] < std::f64::consts::LN_2);
        assert!(report.tr_logloss[19] < report.tr_logloss[0]);
        // the last validation pass sees the final weights
        assert_epsilon!(report.va_logloss[19] as f32, problem_logloss(&model, &problem).unwrap() as f32);

        let positive = [Node { field: 0, index: 0, value: 1.0 }, Node { field: 1, index: 2, value: 1.0 }];
        let negative = [Node { field: 0, index: 1, value: 1.0 }, Node { field: 1, index: 4, value: 1.0 }];
        assert!(predict(&positive, &model) > 0.5);
        assert!(predict(&negative, &model) < 0.5);
    }

    #[test]
    fn test_train_exact_and_fast_agree() {
        let table = separable_table();
        let problem = Problem::new(&table, "y", &["a", "b"]).unwrap();
        let (_, fast) = train(&problem, &params(3), None).unwrap();
        let exact_param = Parameters { fastmath: false, ..params(3) };
        let (_, exact) = train(&problem, &exact_param, None).unwrap();
        assert!(fast.va_logloss.is_empty());
        for (a, b) in fast.tr_logloss.iter().zip(exact.tr_logloss.iter()) {
            assert!((a - b).abs() < 1e-2);
        }
    }

    #[test]
    fn test_train_deterministic() {
        let table = separable_table();
        let problem = Problem::new(&table, "y", &["a", "b"]).unwrap();
        let (model1, report1) = train(&problem, &params(2), None).unwrap();
        let (model2, report2) = train(&problem, &params(2), None).unwrap();
        assert_eq!(model1.weights(), model2.weights());
        assert_eq!(report1, report2);
    }

    #[test]
    fn test_train_shrinks_to_requested_k() {
        let table = separable_table();
        let problem = Problem::new(&table, "y", &["a", "b"]).unwrap();
        let param = Parameters { k: 3, ..params(1) };
        let (model, _) = train(&problem, &param, None).unwrap();
        assert_eq!(model.k, 3);
        assert_eq!(model.weights().len(), 5 * 2 * 3);
    }

    #[test]
    fn test_train_empty_and_invalid() {
        let table = Table::new(&["y", "a"]);
        let problem = Problem::new(&table, "y", &["a"]).unwrap();
        let (model, report) = train(&problem, &params(2), Some(&problem)).unwrap();
        assert_eq!(model.n, 0);
        assert_eq!(report.tr_logloss, vec![0.0, 0.0]);
        // empty validation set is ignored
        assert!(report.va_logloss.is_empty());

        let bad = Parameters { eta: -1.0, ..params(1) };
        let e = train(&problem, &bad, None).err().unwrap();
        assert!(matches!(kind_of(&e), Some(FfmError::InvalidState(_))));
    }

    #[test]
    fn test_train_malformed_label() {
        let mut table = separable_table();
        table.push_row(vec![json!("yes"), json!({"0": 1.0}), Value::Null]).unwrap();
        let problem = Problem::with_dimensions(&table, "y", &["a", "b"], 5, 2).unwrap();
        let e = train(&problem, &params(1), None).err().unwrap();
        assert!(matches!(kind_of(&e), Some(FfmError::MalformedInput(_))));
    }

    #[test]
    fn test_predict_problem_threads() {
        let table = separable_table();
        let problem = Problem::new(&table, "y", &["a", "b"]).unwrap();
        let (model, _) = train(&problem, &params(2), None).unwrap();
        let single = predict_problem(&model, &problem, 1).unwrap();
        assert_eq!(single.len(), 40);
        for nr_threads in [2, 3, 7, 100].iter() {
            assert_eq!(predict_problem(&model, &problem, *nr_threads).unwrap(), single);
        }
        assert!(single.iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_predict_empty_row() {
        let model = Model::allocate(4, 2, 4, true, 0).unwrap();
        assert_eq!(predict(&[], &model), 0.5);
    }
}
