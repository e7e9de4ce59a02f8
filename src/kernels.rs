//! Kernel implementations.
//!
//! This modules contains the actual implementation of the host and device kernels.

pub mod device {
    //! Device kernel sources.

    /// Represents a device kernel.
    ///
    /// As there is no generic way of writing of function that will execute on an accelerator in
    /// Rust, kernels are written in OpenCL C and their source code is imported as raw text.
    #[derive(Debug)]
    pub struct DeviceKernel {
        kernel_name: &'static str,
        kernel_source: &'static str,
    }

    impl DeviceKernel {
        /// Creates a `DeviceKernel` from a kernel name (actual name of the kernel function in the
        /// source code) and a kernel source code (generally a file's contents).
        pub const fn new(kernel_name: &'static str, kernel_source: &'static str) -> Self {
            Self {
                kernel_name,
                kernel_source,
            }
        }

        /// Returns the function name of the given kernel.
        pub fn name(&self) -> &'static str {
            self.kernel_name
        }

        /// Returns the source code for the given kernel.
        pub fn source(&self) -> &'static str {
            self.kernel_source
        }
    }

    /// Name and source code of the single-precision elementwise addition.
    pub static CL_SADD: DeviceKernel =
        DeviceKernel::new("aplusb_f32", include_str!("../kernels/opencl/aplusb_f32.cl"));

    /// Name and source code of the double-precision elementwise addition.
    pub static CL_DADD: DeviceKernel =
        DeviceKernel::new("aplusb_f64", include_str!("../kernels/opencl/aplusb_f64.cl"));

    /// Name and source code of the global sum using one atomic per element.
    pub static CL_SUM_ATOMIC: DeviceKernel =
        DeviceKernel::new("sum_atomic", include_str!("../kernels/opencl/sum.cl"));

    /// Name and source code of the global sum using a work-group tree reduction.
    pub static CL_SUM_TREE: DeviceKernel =
        DeviceKernel::new("sum_tree", include_str!("../kernels/opencl/sum.cl"));

    /// Name and source code of one max prefix sum reduction pass.
    pub static CL_MAX_PREFIX_SUM: DeviceKernel = DeviceKernel::new(
        "max_prefix_sum",
        include_str!("../kernels/opencl/max_prefix_sum.cl"),
    );

}

pub mod host {
    //! Host kernel implementations.
    //!
    //! These serve both as references for checking the device results and as CPU baselines. The
    //! parallel implementations rely on the [`rayon`][1] crate.
    //!
    //! [1]: https://crates.io/crates/rayon

    use rayon::prelude::*;

    use crate::{reduction::PrefixSummary, utils::HarpFloat};

    // Naive implementation of the elementwise addition (unidiomatic Rust).
    pub fn add<T: HarpFloat>(a: &[T], b: &[T], c: &mut [T]) {
        for i in 0..c.len() {
            c[i] = a[i] + b[i];
        }
    }

    // Idiomatic Rust implementation of the elementwise addition (using iterators).
    pub fn iter_add<T: HarpFloat>(a: &[T], b: &[T], c: &mut [T]) {
        c.iter_mut()
            .zip(a.iter().zip(b.iter()))
            .for_each(|(ci, (ai, bi))| *ci = *ai + *bi);
    }

    // Parallel implementation of the elementwise addition (using `rayon`'s parallel iterators).
    pub fn par_iter_add<T: HarpFloat>(a: &[T], b: &[T], c: &mut [T]) {
        c.par_iter_mut()
            .zip(a.par_iter().zip(b.par_iter()))
            .for_each(|(ci, (ai, bi))| *ci = *ai + *bi);
    }

    // Naive implementation of the global sum. Wraps like the device `atomic_add`.
    pub fn sum(x: &[u32]) -> u32 {
        let mut acc = 0_u32;
        for i in 0..x.len() {
            acc = acc.wrapping_add(x[i]);
        }
        acc
    }

    pub fn iter_sum(x: &[u32]) -> u32 {
        x.iter().fold(0, |acc, e| acc.wrapping_add(*e))
    }

    pub fn par_sum(x: &[u32]) -> u32 {
        x.par_iter()
            .cloned()
            .reduce(|| 0, |acc, e| acc.wrapping_add(e))
    }

    /// Serial max prefix sum: the first prefix whose sum strictly exceeds every previous one.
    ///
    /// Returns [`PrefixSummary::EMPTY`] for an empty input.
    pub fn max_prefix_sum(x: &[i32]) -> PrefixSummary {
        let mut max = i32::MIN;
        let mut argmax = 0;
        let mut sum = 0;
        for i in 0..x.len() {
            sum += x[i];
            if sum > max {
                max = sum;
                argmax = i as u32 + 1;
            }
        }
        PrefixSummary { sum, max, argmax }
    }

    // Same as `max_prefix_sum`, folding leaf summaries with iterators.
    pub fn iter_max_prefix_sum(x: &[i32]) -> PrefixSummary {
        x.iter()
            .enumerate()
            .map(|(i, &e)| PrefixSummary::leaf(e, i))
            .reduce(PrefixSummary::combine)
            .unwrap_or(PrefixSummary::EMPTY)
    }

    // Parallel max prefix sum. `combine` is associative and `rayon` keeps the operands in order.
    pub fn par_max_prefix_sum(x: &[i32]) -> PrefixSummary {
        x.par_iter()
            .enumerate()
            .map(|(i, &e)| PrefixSummary::leaf(e, i))
            .reduce_with(PrefixSummary::combine)
            .unwrap_or(PrefixSummary::EMPTY)
    }

    /// Host emulation of one `max_prefix_sum` device pass.
    ///
    /// Every group of `group_size` consecutive input triples (among the first `active`) is
    /// reduced into index `g` of the outputs with the same tree as the OpenCL kernel: at stride
    /// `s`, local slot `i` (a multiple of `2 * s`) absorbs slot `i + s` if the latter is valid.
    #[allow(clippy::too_many_arguments)]
    pub fn max_prefix_sum_pass(
        in_sum: &[i32],
        in_max: &[i32],
        in_argmax: &[u32],
        out_sum: &mut [i32],
        out_max: &mut [i32],
        out_argmax: &mut [u32],
        active: usize,
        group_size: usize,
    ) {
        let mut local = Vec::with_capacity(group_size);
        for (group, start) in (0..active).step_by(group_size).enumerate() {
            let valid = (active - start).min(group_size);
            local.clear();
            local.extend((start..start + valid).map(|i| PrefixSummary {
                sum: in_sum[i],
                max: in_max[i],
                argmax: in_argmax[i],
            }));

            let mut stride = 1;
            while stride < group_size {
                for lid in (0..valid).step_by(2 * stride) {
                    if lid + stride < valid {
                        local[lid] = local[lid].combine(local[lid + stride]);
                    }
                }
                stride <<= 1;
            }

            out_sum[group] = local[0].sum;
            out_max[group] = local[0].max;
            out_argmax[group] = local[0].argmax;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::utils::{rand_prefix_sum_input, rand_sum_input};

        #[test]
        fn max_prefix_sum_reference_cases() {
            let cases: [(&[i32], i32, u32); 5] = [
                (&[3, -3, 3], 3, 1),
                (&[5], 5, 1),
                (&[-1, -2, -3], -1, 1),
                (&[1, 2, -10, 4, 6], 3, 2),
                (&[-5, 2, 4, -1, 3], 3, 5),
            ];
            for (x, max, argmax) in cases {
                let res = max_prefix_sum(x);
                assert_eq!((res.max, res.argmax), (max, argmax), "{x:?}");
                assert_eq!(iter_max_prefix_sum(x), res);
                assert_eq!(par_max_prefix_sum(x), res);
            }
        }

        #[test]
        fn max_prefix_sum_variants_agree() {
            let x = rand_prefix_sum_input(100_000, 1023, Some(5));
            let expected = max_prefix_sum(&x);
            assert_eq!(iter_max_prefix_sum(&x), expected);
            assert_eq!(par_max_prefix_sum(&x), expected);
        }

        #[test]
        fn empty_max_prefix_sum() {
            assert_eq!(max_prefix_sum(&[]), PrefixSummary::EMPTY);
            assert_eq!(iter_max_prefix_sum(&[]), PrefixSummary::EMPTY);
            assert_eq!(par_max_prefix_sum(&[]), PrefixSummary::EMPTY);
        }

        #[test]
        fn pass_folds_groups_and_ignores_padding() {
            let in_sum = [1, -2, 5, 7, 100, 100];
            let in_argmax = [1, 2, 3, 4, 0, 0];
            let mut out_sum = [0; 6];
            let mut out_max = [0; 6];
            let mut out_argmax = [0; 6];
            max_prefix_sum_pass(
                &in_sum,
                &in_sum,
                &in_argmax,
                &mut out_sum,
                &mut out_max,
                &mut out_argmax,
                4,
                3,
            );
            assert_eq!(&out_sum[..2], &[4, 7]);
            assert_eq!(&out_max[..2], &[4, 7]);
            assert_eq!(&out_argmax[..2], &[3, 4]);
            assert_eq!(&out_sum[2..], &[0; 4]);
        }

        #[test]
        fn pass_tree_matches_left_to_right_fold() {
            for group_size in [2, 3, 5, 7, 16, 100, 256] {
                for active in [1, 2, group_size - 1, group_size, group_size + 1, 4 * group_size + 3] {
                    let x = rand_prefix_sum_input(active, 50, Some(active as u64));
                    let argmax: Vec<u32> = (1..=active as u32).collect();
                    let groups = active.div_ceil(group_size);
                    let (mut out_sum, mut out_max, mut out_argmax) =
                        (vec![0; groups], vec![0; groups], vec![0; groups]);
                    max_prefix_sum_pass(
                        &x,
                        &x,
                        &argmax,
                        &mut out_sum,
                        &mut out_max,
                        &mut out_argmax,
                        active,
                        group_size,
                    );

                    for (group, chunk) in x.chunks(group_size).enumerate() {
                        let start = group * group_size;
                        let folded = chunk
                            .iter()
                            .enumerate()
                            .map(|(i, &e)| PrefixSummary::leaf(e, start + i))
                            .reduce(PrefixSummary::combine)
                            .unwrap();
                        let tree = PrefixSummary {
                            sum: out_sum[group],
                            max: out_max[group],
                            argmax: out_argmax[group],
                        };
                        assert_eq!(tree, folded, "active = {active}, group size = {group_size}");
                    }
                }
            }
        }

        #[test]
        fn pass_tree_keeps_earliest_tie() {
            let x = [3, -3, 3, -3, 3];
            let argmax = [1, 2, 3, 4, 5];
            let (mut out_sum, mut out_max, mut out_argmax) = ([0; 1], [0; 1], [0; 1]);
            for group_size in [5, 8] {
                max_prefix_sum_pass(
                    &x,
                    &x,
                    &argmax,
                    &mut out_sum,
                    &mut out_max,
                    &mut out_argmax,
                    5,
                    group_size,
                );
                assert_eq!((out_sum[0], out_max[0], out_argmax[0]), (3, 3, 1));
            }
        }

        #[test]
        fn sum_variants_agree() {
            let x = rand_sum_input(1 << 16, 42);
            let expected: u64 = x.iter().map(|&v| u64::from(v)).sum();
            assert_eq!(u64::from(sum(&x)), expected);
            assert_eq!(iter_sum(&x), sum(&x));
            assert_eq!(par_sum(&x), sum(&x));
        }

        #[test]
        fn add_variants_agree() {
            let a = f64::rand_vector(1000, Some(1));
            let b = f64::rand_vector(1000, Some(2));
            let mut c1 = vec![0.0; 1000];
            let mut c2 = vec![0.0; 1000];
            let mut c3 = vec![0.0; 1000];
            add(&a, &b, &mut c1);
            iter_add(&a, &b, &mut c2);
            par_iter_add(&a, &b, &mut c3);
            assert_eq!(c1, c2);
            assert_eq!(c1, c3);
            assert_eq!(c1[10], a[10] + b[10]);
        }
    }
}
