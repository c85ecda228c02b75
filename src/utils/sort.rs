use num::Num;

/// u32-key LSD radix sort for SoA (inds/vals).
/// - Sorts by inds ascending, stable
/// - Reorders vals accordingly
///
/// Complexity: 4 passes, each O(n + 256)
pub fn radix_sort_u32_soa<N: Num + Copy>(inds: &mut [u32], vals: &mut [N]) {
    assert_eq!(inds.len(), vals.len());
    let n = inds.len();
    if n <= 1 {
        return;
    }

    // Small sizes: insertion sort beats allocating scratch.
    if n <= 32 {
        insertion_sort_u32_soa(inds, vals);
        return;
    }

    // already sorted input is the common case (tokenizer output, corpus rows)
    if inds.windows(2).all(|w| w[0] <= w[1]) {
        return;
    }

    let mut inds_tmp = vec![0u32; n];
    let mut vals_tmp = vec![N::zero(); n];

    for (pass, shift) in [0u32, 8, 16, 24].into_iter().enumerate() {
        // even passes read the caller's buffers, odd passes the scratch ones
        let (src_i, src_v, dst_i, dst_v): (&[u32], &[N], &mut [u32], &mut [N]) = if pass % 2 == 0 {
            (&*inds, &*vals, inds_tmp.as_mut_slice(), vals_tmp.as_mut_slice())
        } else {
            (inds_tmp.as_slice(), vals_tmp.as_slice(), &mut *inds, &mut *vals)
        };

        let mut count = [0usize; 256];
        for &k in src_i {
            count[((k >> shift) & 0xFF) as usize] += 1;
        }

        // prefix sum -> starting positions
        let mut sum = 0usize;
        for c in count.iter_mut() {
            let tmp = *c;
            *c = sum;
            sum += tmp;
        }

        for (&k, &v) in src_i.iter().zip(src_v.iter()) {
            let b = ((k >> shift) & 0xFF) as usize;
            let pos = count[b];
            count[b] = pos + 1;
            dst_i[pos] = k;
            dst_v[pos] = v;
        }
    }
    // 4 passes (even), so the result is back in the caller's buffers.
}

/// Tiny insertion sort for small n (SoA).
#[inline]
fn insertion_sort_u32_soa<N: Copy>(inds: &mut [u32], vals: &mut [N]) {
    let n = inds.len();
    for i in 1..n {
        let mut j = i;
        while j > 0 && inds[j] < inds[j - 1] {
            inds.swap(j, j - 1);
            vals.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Sort by key, then fold runs of equal keys into their first slot by summing vals.
///
/// # Returns
/// * `usize` - length of the deduplicated prefix; the caller truncates to it
pub fn sort_merge_u32_soa<N: Num + Copy>(inds: &mut [u32], vals: &mut [N]) -> usize {
    radix_sort_u32_soa(inds, vals);
    if inds.is_empty() {
        return 0;
    }
    let mut write = 0;
    for read in 1..inds.len() {
        if inds[read] == inds[write] {
            vals[write] = vals[write] + vals[read];
        } else {
            write += 1;
            inds[write] = inds[read];
            vals[write] = vals[read];
        }
    }
    write + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    /// stable baseline: sort by (key, original_index)
    fn baseline_stable_sort(inds: &[u32], vals: &[u32]) -> (Vec<u32>, Vec<u32>) {
        let mut pairs: Vec<(u32, usize, u32)> = inds
            .iter()
            .copied()
            .enumerate()
            .map(|(i, k)| (k, i, vals[i]))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        pairs.into_iter().map(|(k, _, v)| (k, v)).unzip()
    }

    /// tiny deterministic PRNG (xorshift32)
    struct Rng(u32);
    impl Rng {
        fn next_u32(&mut self) -> u32 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.0 = x;
            x
        }
    }

    #[test]
    fn radix_sort_handles_empty_and_single() {
        let mut inds: Vec<u32> = vec![];
        let mut vals: Vec<u32> = vec![];
        radix_sort_u32_soa(&mut inds, &mut vals);
        assert!(inds.is_empty());

        let mut inds = vec![42u32];
        let mut vals = vec![7u32];
        radix_sort_u32_soa(&mut inds, &mut vals);
        assert_eq!(inds, vec![42]);
        assert_eq!(vals, vec![7]);
    }

    #[test]
    fn radix_sort_matches_baseline_many_sizes() {
        let mut rng = Rng(0x1234_5678);
        for &n in &[2usize, 3, 16, 31, 32, 33, 64, 129, 1024] {
            let mut inds = Vec::with_capacity(n);
            let mut vals = Vec::with_capacity(n);
            for i in 0..n {
                // duplicates are likely with the mask
                inds.push(rng.next_u32() & 0x00FF_FFFF);
                vals.push(i as u32);
            }
            let (base_k, base_v) = baseline_stable_sort(&inds, &vals);
            radix_sort_u32_soa(&mut inds, &mut vals);
            assert_eq!(inds, base_k, "keys mismatch at n={n}");
            assert_eq!(vals, base_v, "vals mismatch at n={n}");
        }
    }

    #[test]
    fn merge_sums_duplicate_keys() {
        let mut inds = vec![4u32, 1, 4, 0, 1, 4];
        let mut vals = vec![1u32, 10, 2, 5, 20, 3];
        let len = sort_merge_u32_soa(&mut inds, &mut vals);
        assert_eq!(&inds[..len], &[0, 1, 4]);
        assert_eq!(&vals[..len], &[5, 30, 6]);
    }

    #[test]
    fn merge_on_large_unsorted_input() {
        let mut rng = Rng(0xDEAD_BEEF);
        let mut inds: Vec<u32> = (0..500).map(|_| rng.next_u32() % 50).collect();
        let mut vals = vec![1.0f32; inds.len()];
        let len = sort_merge_u32_soa(&mut inds, &mut vals);
        assert!(inds[..len].windows(2).all(|w| w[0] < w[1]));
        let total: f32 = vals[..len].iter().sum();
        assert_eq!(total, 500.0);
    }
}
