//! Levenshtein distance restricted to a diagonal band.
//!
//! Only cells with `|i - j| <= max` are computed; everything outside the band
//! is treated as `max + 1`.  Work is O(n · max) instead of O(n · m), and the
//! computation stops as soon as a whole row exceeds `max`.

/// Edit distance between `a` and `b` over Unicode scalar values.
///
/// Returns `max + 1` when the true distance is larger than `max`; the exact
/// value is not computed in that case.
pub fn bounded_levenshtein(a: &str, b: &str, max: usize) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    bounded_levenshtein_chars(&a, &b, max)
}

pub fn bounded_levenshtein_chars(a: &[char], b: &[char], max: usize) -> usize {
    let cap = max.saturating_add(1);
    let (n, m) = (a.len(), b.len());

    if n.abs_diff(m) > max {
        return cap;
    }
    if n == 0 || m == 0 {
        // Length difference is already known to be within bound.
        return n.max(m);
    }

    let mut prev: Vec<usize> = (0..=m).map(|j| if j <= max { j } else { cap }).collect();
    let mut curr: Vec<usize> = vec![cap; m + 1];

    for i in 1..=n {
        let lo = i.saturating_sub(max).max(1);
        let hi = i.saturating_add(max).min(m);

        // Left edge: column 0 inside the band, otherwise out-of-band.
        curr[lo - 1] = if lo == 1 { i.min(cap) } else { cap };
        let mut row_min = curr[lo - 1];

        for j in lo..=hi {
            let substitution = prev[j - 1].saturating_add(usize::from(a[i - 1] != b[j - 1]));
            let deletion = prev[j].saturating_add(1);
            let insertion = curr[j - 1].saturating_add(1);
            let value = substitution.min(deletion).min(insertion).min(cap);
            curr[j] = value;
            row_min = row_min.min(value);
        }
        // Right edge is read by the next row as an out-of-band cell.
        if hi < m {
            curr[hi + 1] = cap;
        }

        if row_min > max {
            return cap;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m].min(cap)
}
