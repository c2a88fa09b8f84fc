//! Vector similarity utilities.
//!
//! Shared by the corpus store (segment retrieval) and the answer cache
//! (semantic lookup), so both agree on one definition of "similar".

/// Cosine similarity in `[-1, 1]`, accumulated in `f64`.
///
/// Mismatched lengths, empty input, and zero vectors all score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (f64::from(x), f64::from(y)))
        .fold((0.0, 0.0, 0.0), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norms = (aa * bb).sqrt();
    if norms < 1e-10 {
        0.0
    } else {
        (dot / norms) as f32
    }
}

/// Score items against a query vector and keep the best ones.
///
/// Scores are cosine similarities clamped to `[0, 1]`. Items scoring below
/// `min_score` are dropped; the rest are ordered by descending score, with
/// equal scores keeping their input order, and truncated to `limit`.
pub fn rank_by_similarity<'a, T>(
    items: impl IntoIterator<Item = (&'a [f32], T)>,
    query: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<(f32, T)> {
    let mut scored: Vec<(f32, T)> = items
        .into_iter()
        .filter_map(|(embedding, item)| {
            let score = cosine_similarity(embedding, query).clamp(0.0, 1.0);
            (score >= min_score).then_some((score, item))
        })
        .collect();

    // sort_by is stable, so ties keep insertion order
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
