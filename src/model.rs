use std::error::Error;
use std::mem;
use std::slice;

use rand::distributions::{Distribution, Uniform};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::block_helpers;
use crate::error::FfmError;

pub const FFM_ALIGN_BYTES: usize = 16;
/// Floats per SIMD register, embeddings are padded to a multiple of this while training
pub const FFM_ALIGN: usize = FFM_ALIGN_BYTES / mem::size_of::<f32>();

// Unit of allocation. Keeps every block of a training-shaped model on a 16 byte boundary.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C, align(16))]
struct Quad([f32; FFM_ALIGN]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightsShape {
    /// `2k` floats per (index, field): embedding followed by adagrad accumulators
    Expanded,
    /// `k` floats per (index, field), what is left after training
    Shrunk,
}

#[derive(Clone, Debug)]
pub struct Model {
    pub n: usize,
    pub m: usize,
    pub k: usize,
    pub normalization: bool,
    shape: WeightsShape,
    quads: Vec<Quad>,
    weights_len: usize,
}

pub fn aligned_k(k: usize) -> usize {
    (k + FFM_ALIGN - 1) / FFM_ALIGN * FFM_ALIGN
}

fn allocation_size(n: usize, m: usize, stride: usize) -> Result<usize, Box<dyn Error>> {
    match n.checked_mul(m).and_then(|nm| nm.checked_mul(stride)) {
        Some(len) => Ok(len),
        None => Err(Box::new(FfmError::AllocationFailure(format!(
            "Weights buffer for n: {}, m: {}, stride: {} does not fit in memory",
            n, m, stride
        )))),
    }
}

fn malloc_aligned_floats(weights_len: usize) -> Result<Vec<Quad>, Box<dyn Error>> {
    let num_quads = (weights_len + FFM_ALIGN - 1) / FFM_ALIGN;
    let mut quads: Vec<Quad> = Vec::new();
    if let Err(e) = quads.try_reserve_exact(num_quads) {
        return Err(Box::new(FfmError::AllocationFailure(format!(
            "Could not allocate {} floats for weights: {}",
            weights_len, e
        ))));
    }
    quads.resize(num_quads, Quad::default());
    Ok(quads)
}

impl Model {
    /// Training-shaped model: embeddings drawn from `0.5/sqrt(k) * U(0,1)`, accumulators at 1.
    pub fn allocate(
        n: usize,
        m: usize,
        k_requested: usize,
        normalization: bool,
        seed: u64,
    ) -> Result<Model, Box<dyn Error>> {
        if k_requested == 0 {
            return Err(Box::new(FfmError::InvalidState("k has to be positive".to_string())));
        }
        let k_aligned = aligned_k(k_requested);
        let weights_len = allocation_size(n, m, k_aligned * 2)?;

        let mut model = Model {
            n,
            m,
            k: k_aligned,
            normalization,
            shape: WeightsShape::Expanded,
            quads: malloc_aligned_floats(weights_len)?,
            weights_len,
        };

        let coef = 0.5 / (k_requested as f32).sqrt();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let uniform = Uniform::new(0.0f32, 1.0f32);
        for block in model.weights_mut().chunks_exact_mut(k_aligned * 2) {
            let (embedding, accumulators) = block.split_at_mut(k_aligned);
            for (d, w) in embedding.iter_mut().enumerate() {
                *w = if d < k_requested { coef * uniform.sample(&mut rng) } else { 0.0 };
            }
            for wg in accumulators.iter_mut() {
                *wg = 1.0;
            }
        }
        log::debug!(
            "Allocated model n: {}, m: {}, k: {} (requested {}), {} floats",
            n, m, k_aligned, k_requested, weights_len
        );
        Ok(model)
    }

    /// Inference-shaped model with all weights at zero, to be filled by the caller
    pub fn new_shrunk(n: usize, m: usize, k: usize, normalization: bool) -> Result<Model, Box<dyn Error>> {
        let weights_len = allocation_size(n, m, k)?;
        Ok(Model {
            n,
            m,
            k,
            normalization,
            shape: WeightsShape::Shrunk,
            quads: malloc_aligned_floats(weights_len)?,
            weights_len,
        })
    }

    pub fn shape(&self) -> WeightsShape {
        self.shape
    }

    pub fn is_expanded(&self) -> bool {
        self.shape == WeightsShape::Expanded
    }

    /// Floats between consecutive (index, field) blocks for the current shape
    #[inline(always)]
    pub fn stride(&self) -> usize {
        match self.shape {
            WeightsShape::Expanded => self.k * 2,
            WeightsShape::Shrunk => self.k,
        }
    }

    #[inline(always)]
    pub fn block_offset(&self, index: usize, field: usize) -> usize {
        debug_assert!(index < self.n && field < self.m);
        (index * self.m + field) * self.stride()
    }

    #[inline(always)]
    pub fn weights(&self) -> &[f32] {
        // Quad is repr(C) over [f32; 4], so the allocation is a valid run of floats
        unsafe { slice::from_raw_parts(self.quads.as_ptr() as *const f32, self.weights_len) }
    }

    #[inline(always)]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        unsafe { slice::from_raw_parts_mut(self.quads.as_mut_ptr() as *mut f32, self.weights_len) }
    }

    /// The `k` live embedding values of (index, field)
    #[inline(always)]
    pub fn embedding(&self, index: usize, field: usize) -> &[f32] {
        let offset = self.block_offset(index, field);
        &self.weights()[offset..offset + self.k]
    }

    #[inline(always)]
    pub fn embedding_mut(&mut self, index: usize, field: usize) -> &mut [f32] {
        let offset = self.block_offset(index, field);
        let k = self.k;
        &mut self.weights_mut()[offset..offset + k]
    }

    /// Squared gradient accumulators of (index, field), only present while training
    pub fn accumulators(&self, index: usize, field: usize) -> Option<&[f32]> {
        if !self.is_expanded() {
            return None;
        }
        let offset = self.block_offset(index, field) + self.k;
        Some(&self.weights()[offset..offset + self.k])
    }

    /// Whole blocks (embedding + accumulators) of two different (index, field) pairs
    #[inline(always)]
    pub fn pair_blocks_mut(&mut self, offset1: usize, offset2: usize) -> (&mut [f32], &mut [f32]) {
        let stride = self.stride();
        block_helpers::get_input_output_borrows(self.weights_mut(), offset1, stride, offset2, stride)
    }

    /// Drops the accumulator half and keeps the first `k_new` coordinates of every embedding.
    /// Blocks are moved front to back, destination never lies past its source.
    pub fn shrink(&mut self, k_new: usize) -> Result<(), Box<dyn Error>> {
        if k_new > self.k {
            return Err(Box::new(FfmError::InvalidState(format!(
                "Cannot shrink model with k: {} to k: {}",
                self.k, k_new
            ))));
        }
        if !self.is_expanded() {
            if k_new == self.k {
                return Ok(());
            }
            return Err(Box::new(FfmError::InvalidState(
                "Model has already been shrunk".to_string(),
            )));
        }

        let stride = self.stride();
        let num_blocks = self.n * self.m;
        let weights = self.weights_mut();
        for block in 0..num_blocks {
            let src = block * stride;
            let dst = block * k_new;
            weights.copy_within(src..src + k_new, dst);
        }

        self.k = k_new;
        self.shape = WeightsShape::Shrunk;
        self.weights_len = num_blocks * k_new;
        self.quads.truncate((self.weights_len + FFM_ALIGN - 1) / FFM_ALIGN);
        self.quads.shrink_to_fit();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;

    #[test]
    fn test_aligned_k() {
        assert_eq!(aligned_k(1), 4);
        assert_eq!(aligned_k(2), 4);
        assert_eq!(aligned_k(4), 4);
        assert_eq!(aligned_k(5), 8);
    }

    #[test]
    fn test_allocate_init() {
        let model = Model::allocate(3, 2, 2, false, 0).unwrap();
        assert_eq!(model.k, 4);
        assert_eq!(model.stride(), 8);
        assert_eq!(model.weights().len(), 3 * 2 * 8);
        assert_eq!(model.weights().as_ptr() as usize % FFM_ALIGN_BYTES, 0);

        let coef = 0.5 / (2.0f32).sqrt();
        for j in 0..3 {
            for f in 0..2 {
                let e = model.embedding(j, f);
                assert!(e[0] >= 0.0 && e[0] < coef);
                assert!(e[1] >= 0.0 && e[1] < coef);
                // padding
                assert_eq!(e[2], 0.0);
                assert_eq!(e[3], 0.0);
                assert_eq!(model.accumulators(j, f).unwrap(), &[1.0, 1.0, 1.0, 1.0]);
            }
        }
        // draws are independent
        assert_ne!(model.embedding(0, 0)[0], model.embedding(0, 0)[1]);
    }

    #[test]
    fn test_allocate_deterministic() {
        let a = Model::allocate(5, 3, 4, false, 7).unwrap();
        let b = Model::allocate(5, 3, 4, false, 7).unwrap();
        let c = Model::allocate(5, 3, 4, false, 8).unwrap();
        assert_eq!(a.weights(), b.weights());
        assert_ne!(a.weights(), c.weights());
    }

    #[test]
    fn test_allocation_failure() {
        let e = Model::allocate(usize::MAX / 2, 3, 4, false, 0).unwrap_err();
        match kind_of(&e) {
            Some(FfmError::AllocationFailure(_)) => {}
            other => panic!("Expected allocation failure, got {:?}", other),
        }
        let e = Model::allocate(4, 2, 0, false, 0).unwrap_err();
        match kind_of(&e) {
            Some(FfmError::InvalidState(_)) => {}
            other => panic!("Expected invalid state, got {:?}", other),
        }
    }

    #[test]
    fn test_shrink() {
        let mut model = Model::allocate(4, 3, 2, true, 1).unwrap();
        let mut expected: Vec<f32> = Vec::new();
        for j in 0..4 {
            for f in 0..3 {
                expected.extend_from_slice(&model.embedding(j, f)[0..2]);
            }
        }
        model.shrink(2).unwrap();
        assert_eq!(model.k, 2);
        assert_eq!(model.shape(), WeightsShape::Shrunk);
        assert_eq!(model.stride(), 2);
        assert_eq!(model.weights(), expected.as_slice());
        assert_eq!(model.embedding(3, 2), &expected[22..24]);
        assert!(model.accumulators(0, 0).is_none());
        assert!(model.normalization);

        // shrinking again to the same k does nothing, anything else is refused
        model.shrink(2).unwrap();
        assert_eq!(model.weights(), expected.as_slice());
        assert!(model.shrink(1).is_err());
        assert!(model.shrink(4).is_err());
    }

    #[test]
    fn test_new_shrunk() {
        let model = Model::new_shrunk(3, 2, 3, false).unwrap();
        assert_eq!(model.stride(), 3);
        assert_eq!(model.weights().len(), 18);
        assert!(model.weights().iter().all(|w| *w == 0.0));
    }
}
