use std::convert::TryFrom;
use std::error::Error;

use serde_json::Value;

use crate::error::malformed;

/// One sparse feature occurrence of a row
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Node {
    pub field: u32,
    pub index: u32,
    pub value: f32,
}

#[derive(Clone, Debug)]
pub struct FeatureBuffer {
    pub label: f32,
    pub example_number: u64,
    pub nodes: Vec<Node>,
}

impl FeatureBuffer {
    pub fn new() -> FeatureBuffer {
        FeatureBuffer {
            label: 0.0,
            example_number: 0,
            nodes: Vec::with_capacity(1024),
        }
    }
}

/// Scale applied to every pairwise term of a row: `1/||row||^2` with normalization, 1 otherwise.
/// Scores are then invariant to multiplying all values of the row by a positive constant.
/// A row with zero norm has nothing to rescale and gets 1.
#[inline(always)]
pub fn row_scale(nodes: &[Node], normalization: bool) -> f32 {
    if !normalization {
        return 1.0;
    }
    let norm_squared: f32 = nodes.iter().map(|n| n.value * n.value).sum();
    if norm_squared > 0.0 {
        1.0 / norm_squared
    } else {
        1.0
    }
}

/// Turns positional rows (label column + feature columns) into feature buffers.
/// Field of a node is the ordinal of its column in `feature_columns`, not its position in the row.
#[derive(Clone, Debug)]
pub struct FeatureBufferTranslator {
    target_column: usize,
    feature_columns: Vec<usize>,
    pub feature_buffer: FeatureBuffer,
}

impl FeatureBufferTranslator {
    pub fn new(target_column: usize, feature_columns: Vec<usize>) -> FeatureBufferTranslator {
        FeatureBufferTranslator {
            target_column,
            feature_columns,
            feature_buffer: FeatureBuffer::new(),
        }
    }

    pub fn translate(&mut self, row: &[Value], example_number: u64) -> Result<(), Box<dyn Error>> {
        let fb = &mut self.feature_buffer;
        fb.example_number = example_number;
        fb.nodes.clear();

        let yval = match row.get(self.target_column) {
            Some(Value::Number(num)) if num.is_i64() || num.is_u64() => num,
            _ => return malformed(format!("Response must be integer type (example {})", example_number)),
        };
        // u64 values that don't fit i64 are positive too
        fb.label = if yval.as_i64().map_or(true, |y| y > 0) { 1.0 } else { -1.0 };

        for (field, col) in self.feature_columns.iter().enumerate() {
            match row.get(*col) {
                None | Some(Value::Null) => {}
                Some(Value::Object(dict)) => {
                    for (key, value) in dict {
                        let index: i64 = match key.trim().parse() {
                            Ok(index) => index,
                            Err(_) => {
                                return malformed(format!(
                                    "Feature keys must be integers, got \"{}\" (example {})",
                                    key, example_number
                                ))
                            }
                        };
                        let value = match value.as_f64() {
                            Some(value) => value as f32,
                            None => {
                                return malformed(format!(
                                    "Feature values must be numeric, got {} (example {})",
                                    value, example_number
                                ))
                            }
                        };
                        fb.nodes.push(Node {
                            field: field as u32,
                            // Negative or huge ids can never be < n, the kernel skips them
                            index: u32::try_from(index).unwrap_or(u32::MAX),
                            value,
                        });
                    }
                }
                Some(_) => {
                    return malformed(format!(
                        "Feature columns currently must be dict (example {})",
                        example_number
                    ))
                }
            }
        }
        Ok(())
    }
}
