//! Permutation helpers shared by the loop transformer and the self-check
//! plumbing.

/// Whether `perm` maps `0..len` bijectively onto `0..len`.
pub fn is_permutation(perm: &[usize], len: usize) -> bool {
    if perm.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &p in perm {
        if p >= len || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}

/// The identity permutation of the given size.
pub fn identity(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// `compose(b, a)[i] = b[a[i]]`: apply `a` first, then `b`.
pub fn compose(b: &[usize], a: &[usize]) -> Vec<usize> {
    a.iter().map(|&i| b[i]).collect()
}

/// Pad a permutation with identity entries in front and behind.
pub fn pad(perm: &[usize], pre: usize, post: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(pre + perm.len() + post);
    out.extend(0..pre);
    out.extend(perm.iter().map(|&p| p + pre));
    let base = pre + perm.len();
    out.extend(base..base + post);
    out
}
