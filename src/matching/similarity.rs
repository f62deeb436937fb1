use std::collections::HashMap;

use super::normalizer::NormalizedName;

/// Multiset intersection size: each token contributes `min(count_a, count_b)`.
pub fn intersection_count<S: AsRef<str>>(a: &[S], b: &[S]) -> usize {
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for token in a {
        *remaining.entry(token.as_ref()).or_insert(0) += 1;
    }

    let mut count = 0;
    for token in b {
        if let Some(left) = remaining.get_mut(token.as_ref()) {
            if *left > 0 {
                *left -= 1;
                count += 1;
            }
        }
    }
    count
}

/// Multiset Jaccard index of two token lists.
///
/// Repeated tokens are not collapsed, so `FOO FOO BAR` against `FOO BAR`
/// scores 2/3. Two empty inputs score 0.
pub fn jaccard<S: AsRef<str>>(a: &[S], b: &[S]) -> f64 {
    let intersection = intersection_count(a, b);
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Token-overlap similarity between two normalized names.
pub fn score(a: &NormalizedName, b: &NormalizedName) -> f64 {
    jaccard(&a.tokens(), &b.tokens())
}
