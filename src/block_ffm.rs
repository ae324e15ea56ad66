use std::error::Error;

use crate::error::FfmError;
use crate::feature_buffer::Node;
use crate::model::{Model, FFM_ALIGN};
use crate::optimizer::OptimizerTrait;

/// Enumerates interacting pairs of a row: every (N1, N2) with N1 before N2, both within bounds
/// and from different fields. `pair` receives the offset of N1's embedding towards N2's field,
/// the offset of N2's embedding towards N1's field and the joint value `2 * v1 * v2 * r`.
/// Scoring and updating both go through here, so they always see the same pairs in the same order.
#[inline(always)]
fn for_each_pair<F>(nodes: &[Node], r: f32, n: usize, m: usize, stride: usize, mut pair: F)
where
    F: FnMut(usize, usize, f32),
{
    for (i, left) in nodes.iter().enumerate() {
        let j1 = left.index as usize;
        let f1 = left.field as usize;
        if j1 >= n || f1 >= m {
            continue;
        }
        for right in &nodes[i + 1..] {
            let j2 = right.index as usize;
            let f2 = right.field as usize;
            if j2 >= n || f2 >= m || f1 == f2 {
                continue; // not combining within a field
            }
            let offset1 = (j1 * m + f2) * stride;
            let offset2 = (j2 * m + f1) * stride;
            pair(offset1, offset2, 2.0 * left.value * right.value * r);
        }
    }
}

/// Raw decision value of a row. Works on both expanded and shrunk models.
pub fn forward(nodes: &[Node], r: f32, model: &Model) -> f32 {
    let k = model.k;
    let weights = model.weights();
    // Lane-wise partial sums, so LLVM can keep the inner loop in a vector register
    let mut wsumbuf = [0.0f32; FFM_ALIGN];
    let mut wsum_tail = 0.0f32;

    for_each_pair(nodes, r, model.n, model.m, model.stride(), |offset1, offset2, joint_value| {
        let w1 = &weights[offset1..offset1 + k];
        let w2 = &weights[offset2..offset2 + k];
        let mut groups1 = w1.chunks_exact(FFM_ALIGN);
        let mut groups2 = w2.chunks_exact(FFM_ALIGN);
        for (g1, g2) in groups1.by_ref().zip(groups2.by_ref()) {
            for d in 0..FFM_ALIGN {
                wsumbuf[d] += g1[d] * g2[d] * joint_value;
            }
        }
        // Only shrunk models with k not divisible by FFM_ALIGN get here
        for (a, b) in groups1.remainder().iter().zip(groups2.remainder()) {
            wsum_tail += a * b * joint_value;
        }
    });

    wsumbuf.iter().sum::<f32>() + wsum_tail
}

/// Applies the loss gradient `kappa` (derivative of the loss by the decision value) to every
/// interacting pair of a row. Needs the accumulators, so only expanded models can be updated.
pub fn forward_backward<O: OptimizerTrait>(
    nodes: &[Node],
    r: f32,
    model: &mut Model,
    kappa: f32,
    optimizer: &O,
) -> Result<(), Box<dyn Error>> {
    if !model.is_expanded() {
        return Err(Box::new(FfmError::InvalidState(
            "Shrunk model cannot be trained any further".to_string(),
        )));
    }
    let k = model.k;
    let (n, m, stride) = (model.n, model.m, model.stride());
    for_each_pair(nodes, r, n, m, stride, |offset1, offset2, joint_value| {
        let (block1, block2) = model.pair_blocks_mut(offset1, offset2);
        optimizer.update_pair(block1, block2, k, kappa * joint_value);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;
    use crate::assert_epsilon;
    use crate::optimizer::{OptimizerAdagrad, OptimizerAdagradFast};

    fn node(field: u32, index: u32, value: f32) -> Node {
        Node { field, index, value }
    }

    fn set_embedding(model: &mut Model, j: usize, f: usize, e: &[f32]) {
        model.embedding_mut(j, f)[..e.len()].copy_from_slice(e);
    }

    #[test]
    fn test_single_field_does_not_interact() {
        let model = Model::allocate(10, 2, 4, false, 0).unwrap();
        let row = vec![node(0, 1, 1.0), node(0, 5, 1.0), node(0, 7, 3.0)];
        assert_eq!(forward(&row, 1.0, &model), 0.0);
    }

    #[test]
    fn test_forward_value() {
        let mut model = Model::allocate(4, 2, 4, false, 0).unwrap();
        set_embedding(&mut model, 1, 1, &[1.0, 2.0, 3.0, 4.0]);
        set_embedding(&mut model, 2, 0, &[0.5, 0.5, -1.0, 2.0]);
        let row = vec![node(0, 1, 2.0), node(1, 2, 0.5)];
        // 2 * v1 * v2 * <w(1,f1), w(2,f0)> = 2 * 1.0 * (0.5 + 1.0 - 3.0 + 8.0)
        assert_epsilon!(forward(&row, 1.0, &model), 13.0);
        assert_epsilon!(forward(&row, 0.5, &model), 6.5);
    }

    #[test]
    fn test_out_of_range_nodes_are_skipped() {
        let model = Model::allocate(4, 2, 4, false, 3).unwrap();
        let row = vec![node(0, 1, 1.0), node(1, 2, 1.0)];
        let expected = forward(&row, 1.0, &model);
        let row_with_garbage = vec![
            node(0, 1, 1.0),
            node(5, 0, 1.0),
            node(1, 4, 1.0),
            node(1, 2, 1.0),
            node(1, u32::MAX, 1.0),
        ];
        assert_eq!(forward(&row_with_garbage, 1.0, &model), expected);
    }

    #[test]
    fn test_order_does_not_matter() {
        let model = Model::allocate(20, 4, 6, false, 11).unwrap();
        let row = vec![
            node(0, 3, 1.0),
            node(1, 8, 0.5),
            node(2, 13, 2.0),
            node(3, 19, 1.0),
            node(1, 4, 1.5),
        ];
        let mut reversed = row.clone();
        reversed.reverse();
        let mut rotated = row.clone();
        rotated.rotate_left(2);
        let t = forward(&row, 1.0, &model);
        assert!((t - forward(&reversed, 1.0, &model)).abs() < 1e-5);
        assert!((t - forward(&rotated, 1.0, &model)).abs() < 1e-5);
    }

    #[test]
    fn test_forward_same_on_both_shapes() {
        let mut model = Model::allocate(6, 3, 3, false, 5).unwrap();
        let row = vec![node(0, 1, 1.0), node(1, 2, 0.3), node(2, 5, 2.0)];
        let expanded = forward(&row, 1.0, &model);
        model.shrink(3).unwrap();
        let shrunk = forward(&row, 1.0, &model);
        assert!((expanded - shrunk).abs() < 1e-6);
    }

    #[test]
    fn test_single_update_step() {
        // n=4, m=2, k=2 gets aligned to 4
        let mut model = Model::allocate(4, 2, 2, false, 0).unwrap();
        assert_eq!(model.k, 4);
        let before = model.clone();
        let row = vec![node(0, 1, 1.0), node(1, 2, 1.0)];

        let mut optimizer = OptimizerAdagrad::new();
        optimizer.init(0.1, 0.0);
        let kappa = -0.5;
        forward_backward(&row, 1.0, &mut model, kappa, &optimizer).unwrap();

        let kappa_v = kappa * 2.0;
        let w1 = before.embedding(1, 1);
        let w2 = before.embedding(2, 0);
        for d in 0..4 {
            let g1 = kappa_v * w2[d];
            let g2 = kappa_v * w1[d];
            assert_epsilon!(model.accumulators(1, 1).unwrap()[d], 1.0 + g1 * g1);
            assert_epsilon!(model.accumulators(2, 0).unwrap()[d], 1.0 + g2 * g2);
            assert_epsilon!(model.embedding(1, 1)[d], w1[d] - 0.1 * g1 / (1.0 + g1 * g1).sqrt());
            assert_epsilon!(model.embedding(2, 0)[d], w2[d] - 0.1 * g2 / (1.0 + g2 * g2).sqrt());
        }
        // padding stays put
        assert_eq!(model.embedding(1, 1)[2], 0.0);
        assert_eq!(model.accumulators(1, 1).unwrap()[3], 1.0);

        // nothing else moved
        for j in 0..4 {
            for f in 0..2 {
                if (j, f) == (1, 1) || (j, f) == (2, 0) {
                    continue;
                }
                assert_eq!(model.embedding(j, f), before.embedding(j, f));
                assert_eq!(model.accumulators(j, f), before.accumulators(j, f));
            }
        }
    }

    #[test]
    fn test_single_update_step_fast() {
        let mut exact_model = Model::allocate(4, 2, 2, false, 0).unwrap();
        let mut fast_model = exact_model.clone();
        let row = vec![node(0, 1, 1.0), node(1, 2, 1.0)];
        let mut exact = OptimizerAdagrad::new();
        exact.init(0.1, 0.0);
        let mut fast = OptimizerAdagradFast::new();
        fast.init(0.1, 0.0);
        forward_backward(&row, 1.0, &mut exact_model, -0.5, &exact).unwrap();
        forward_backward(&row, 1.0, &mut fast_model, -0.5, &fast).unwrap();
        for (a, b) in exact_model.weights().iter().zip(fast_model.weights()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_update_lowers_loss() {
        let mut model = Model::allocate(4, 2, 4, false, 0).unwrap();
        let row = vec![node(0, 1, 1.0), node(1, 2, 1.0)];
        let mut optimizer = OptimizerAdagrad::new();
        optimizer.init(0.1, 0.0);
        // positive label: kappa < 0 pushes the score up
        let t_before = forward(&row, 1.0, &model);
        let expnyt = (-t_before).exp();
        forward_backward(&row, 1.0, &mut model, -expnyt / (1.0 + expnyt), &optimizer).unwrap();
        assert!(forward(&row, 1.0, &model) > t_before);
    }

    #[test]
    fn test_shrunk_model_refuses_update() {
        let mut model = Model::allocate(4, 2, 4, false, 0).unwrap();
        model.shrink(4).unwrap();
        let row = vec![node(0, 1, 1.0), node(1, 2, 1.0)];
        let optimizer = OptimizerAdagrad::new();
        assert!(forward_backward(&row, 1.0, &mut model, -0.5, &optimizer).is_err());
    }
}
