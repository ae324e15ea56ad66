pub mod block_ffm;
pub mod block_helpers;
pub mod block_loss_functions;
pub mod cmdline;
pub mod dataset;
pub mod error;
pub mod feature_buffer;
pub mod ffi;
pub mod logging_layer;
pub mod model;
pub mod optimizer;
pub mod parameters;
pub mod persistence;
pub mod regressor;

pub use dataset::{Problem, RowSource, Table};
pub use error::FfmError;
pub use feature_buffer::Node;
pub use model::Model;
pub use parameters::Parameters;
pub use persistence::{load_model_from_filename, save_model_to_filename};
pub use regressor::{predict, predict_problem, train, TrainingReport};
