#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use crate::model::FFM_ALIGN;

/// Per-coordinate update rule applied by the interaction kernel in update mode.
/// Blocks passed in are `k` embedding values followed by `k` squared-gradient accumulators.
pub trait OptimizerTrait: std::clone::Clone {
    fn new() -> Self;
    fn init(&mut self, learning_rate: f32, l2: f32);
    fn get_name() -> &'static str;
    fn update_pair(&self, block1: &mut [f32], block2: &mut [f32], k: usize, kappa_v: f32);
}

// Both gradients are taken from the weights as they were before this step,
// and the step divides by the accumulator that already includes the new gradient.
#[inline(always)]
fn adagrad_update_scalar(
    block1: &mut [f32],
    block2: &mut [f32],
    k: usize,
    kappa_v: f32,
    learning_rate: f32,
    l2: f32,
) {
    let (w1, wg1) = block1.split_at_mut(k);
    let (w2, wg2) = block2.split_at_mut(k);
    let groups = w1
        .chunks_exact_mut(FFM_ALIGN)
        .zip(wg1.chunks_exact_mut(FFM_ALIGN))
        .zip(w2.chunks_exact_mut(FFM_ALIGN).zip(wg2.chunks_exact_mut(FFM_ALIGN)));
    for ((w1, wg1), (w2, wg2)) in groups {
        for d in 0..FFM_ALIGN {
            let g1 = l2 * w1[d] + kappa_v * w2[d];
            let g2 = l2 * w2[d] + kappa_v * w1[d];
            wg1[d] += g1 * g1;
            wg2[d] += g2 * g2;
            w1[d] -= learning_rate * g1 / wg1[d].sqrt();
            w2[d] -= learning_rate * g2 / wg2[d].sqrt();
        }
    }
}

/******************* Adagrad with exact square root **************************/
#[derive(Clone)]
pub struct OptimizerAdagrad {
    learning_rate: f32,
    l2: f32,
}

impl OptimizerTrait for OptimizerAdagrad {
    fn new() -> Self {
        OptimizerAdagrad { learning_rate: 0.0, l2: 0.0 }
    }

    fn init(&mut self, learning_rate: f32, l2: f32) {
        self.learning_rate = learning_rate;
        self.l2 = l2;
    }

    fn get_name() -> &'static str {
        "Adagrad"
    }

    #[inline(always)]
    fn update_pair(&self, block1: &mut [f32], block2: &mut [f32], k: usize, kappa_v: f32) {
        debug_assert!(k % FFM_ALIGN == 0);
        adagrad_update_scalar(block1, block2, k, kappa_v, self.learning_rate, self.l2);
    }
}

/***************** Adagrad using hardware reciprocal square root ******************/
// _mm_rsqrt_ps has ~12 bits of precision. Accumulators start at 1 and only grow,
// so the approximation never sees zero.
#[derive(Clone)]
pub struct OptimizerAdagradFast {
    learning_rate: f32,
    l2: f32,
}

impl OptimizerTrait for OptimizerAdagradFast {
    fn new() -> Self {
        OptimizerAdagradFast { learning_rate: 0.0, l2: 0.0 }
    }

    fn init(&mut self, learning_rate: f32, l2: f32) {
        self.learning_rate = learning_rate;
        self.l2 = l2;
    }

    fn get_name() -> &'static str {
        "AdagradFast"
    }

    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    fn update_pair(&self, block1: &mut [f32], block2: &mut [f32], k: usize, kappa_v: f32) {
        debug_assert!(k % FFM_ALIGN == 0);
        assert!(block1.len() >= 2 * k && block2.len() >= 2 * k);
        unsafe {
            let xmm_kappav = _mm_set1_ps(kappa_v);
            let xmm_eta = _mm_set1_ps(self.learning_rate);
            let xmm_lambda = _mm_set1_ps(self.l2);

            let w1 = block1.as_mut_ptr();
            let w2 = block2.as_mut_ptr();
            let wg1 = w1.add(k);
            let wg2 = w2.add(k);
            for d in (0..k).step_by(FFM_ALIGN) {
                let mut xmm_w1 = _mm_loadu_ps(w1.add(d));
                let mut xmm_w2 = _mm_loadu_ps(w2.add(d));
                let mut xmm_wg1 = _mm_loadu_ps(wg1.add(d));
                let mut xmm_wg2 = _mm_loadu_ps(wg2.add(d));

                let xmm_g1 = _mm_add_ps(_mm_mul_ps(xmm_lambda, xmm_w1), _mm_mul_ps(xmm_kappav, xmm_w2));
                let xmm_g2 = _mm_add_ps(_mm_mul_ps(xmm_lambda, xmm_w2), _mm_mul_ps(xmm_kappav, xmm_w1));

                xmm_wg1 = _mm_add_ps(xmm_wg1, _mm_mul_ps(xmm_g1, xmm_g1));
                xmm_wg2 = _mm_add_ps(xmm_wg2, _mm_mul_ps(xmm_g2, xmm_g2));

                xmm_w1 = _mm_sub_ps(xmm_w1, _mm_mul_ps(xmm_eta, _mm_mul_ps(_mm_rsqrt_ps(xmm_wg1), xmm_g1)));
                xmm_w2 = _mm_sub_ps(xmm_w2, _mm_mul_ps(xmm_eta, _mm_mul_ps(_mm_rsqrt_ps(xmm_wg2), xmm_g2)));

                _mm_storeu_ps(w1.add(d), xmm_w1);
                _mm_storeu_ps(w2.add(d), xmm_w2);
                _mm_storeu_ps(wg1.add(d), xmm_wg1);
                _mm_storeu_ps(wg2.add(d), xmm_wg2);
            }
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    #[inline(always)]
    fn update_pair(&self, block1: &mut [f32], block2: &mut [f32], k: usize, kappa_v: f32) {
        debug_assert!(k % FFM_ALIGN == 0);
        adagrad_update_scalar(block1, block2, k, kappa_v, self.learning_rate, self.l2);
    }
}
