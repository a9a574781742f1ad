//! Text similarity between a query and a candidate food name.

/// Normalized similarity in `[0, 1]` based on Levenshtein distance,
/// with a containment shortcut: a query that appears whole inside the
/// candidate name scores at least 0.75.
///
/// Both inputs are expected pre-normalized (see [`crate::text::normalize`]).
pub fn similarity(query: &str, name: &str) -> f64 {
    if query == name {
        return 1.0;
    }
    if query.is_empty() || name.is_empty() {
        return 0.0;
    }

    let edit_score = {
        let distance = levenshtein(query, name);
        let max_len = query.chars().count().max(name.chars().count());
        1.0 - distance as f64 / max_len as f64
    };

    if name.contains(query) || query.contains(name) {
        edit_score.max(0.75)
    } else {
        edit_score
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
