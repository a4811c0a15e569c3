use std::collections::HashSet;

/// Scores are compared at this resolution.
const SCALE: f64 = 1_000_000.0;

/// Maximum-weight one-to-one assignment (Hungarian algorithm).
///
/// `weights[i][j]` in [0, 1]; rows and columns may differ in number. Rows and
/// columns without a positive weight are left out of the solve and never
/// assigned. Returns `(row, col)` pairs sorted by row, one per row or column
/// of the smaller remaining side. Among assignments with equal quantized
/// weight, the one pairing lower rows with lower columns wins.
pub fn max_weight_assignment(weights: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let positive = |w: f64| w.is_finite() && w > 0.0;
    let live_rows: Vec<usize> = (0..weights.len())
        .filter(|&i| weights[i].iter().any(|&w| positive(w)))
        .collect();
    let width = weights.iter().map(Vec::len).max().unwrap_or(0);
    let live_cols: Vec<usize> = (0..width)
        .filter(|&j| weights.iter().any(|row| row.get(j).is_some_and(|&w| positive(w))))
        .collect();
    if live_rows.len() == weights.len() && live_cols.len() == width {
        return hungarian(weights);
    }

    // Order is kept, so lower-index tie-breaks still hold after mapping back.
    let compact: Vec<Vec<f64>> = live_rows
        .iter()
        .map(|&i| {
            live_cols
                .iter()
                .map(|&j| weights[i].get(j).copied().unwrap_or(0.0))
                .collect()
        })
        .collect();
    hungarian(&compact)
        .into_iter()
        .map(|(i, j)| (live_rows[i], live_cols[j]))
        .collect()
}

fn hungarian(weights: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let rows = weights.len();
    let cols = weights.iter().map(Vec::len).max().unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let n = rows.max(cols);

    // Each cell's profit is its quantized weight, scaled so that the sum of
    // all tie-break bonuses in any assignment stays below one quantum.
    let tie_scale = (rows.min(cols) * rows * cols) as i128 + 1;
    let profit = |i: usize, j: usize| -> i128 {
        match weights.get(i).and_then(|row| row.get(j)) {
            Some(w) => {
                let w = if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 };
                let quantized = (w * SCALE).round() as i128;
                let bonus = ((rows - i) * (cols - j)) as i128;
                quantized * tie_scale + bonus
            }
            None => 0,
        }
    };
    let ceiling = SCALE as i128 * tie_scale + (rows * cols) as i128;
    let cost = |i: usize, j: usize| ceiling - profit(i, j);

    // Shortest augmenting path formulation over 1-based potentials.
    let inf = i128::MAX / 4;
    let mut u = vec![0i128; n + 1];
    let mut v = vec![0i128; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![inf; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=n)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .filter(|&(i, j)| i < rows && j < weights[i].len())
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Highest score first, skipping rows or columns already taken. Ties go to
/// the lower row, then the lower column. Not optimal in general.
pub fn greedy_assignment(candidates: &[(usize, usize, f64)]) -> Vec<(usize, usize)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    let mut taken_rows = HashSet::new();
    let mut taken_cols = HashSet::new();
    let mut pairs = Vec::new();
    for (i, j, _) in sorted {
        if taken_rows.contains(&i) || taken_cols.contains(&j) {
            continue;
        }
        taken_rows.insert(i);
        taken_cols.insert(j);
        pairs.push((i, j));
    }
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(weights: &[Vec<f64>], pairs: &[(usize, usize)]) -> f64 {
        pairs.iter().map(|&(i, j)| weights[i][j]).sum()
    }

    fn brute_force_best(weights: &[Vec<f64>]) -> f64 {
        fn go(weights: &[Vec<f64>], row: usize, used: &mut Vec<bool>) -> f64 {
            if row == weights.len() {
                return 0.0;
            }
            // Leaving a row unassigned is allowed when rows outnumber columns.
            let mut best = go(weights, row + 1, used);
            for j in 0..used.len() {
                if !used[j] {
                    used[j] = true;
                    best = best.max(weights[row][j] + go(weights, row + 1, used));
                    used[j] = false;
                }
            }
            best
        }
        let cols = weights[0].len();
        go(weights, 0, &mut vec![false; cols])
    }

    #[test]
    fn beats_greedy_where_greedy_is_wrong() {
        let weights = vec![vec![0.9, 0.8], vec![0.85, 0.1]];
        let optimal = max_weight_assignment(&weights);
        assert_eq!(optimal, vec![(0, 1), (1, 0)]);

        let greedy = greedy_assignment(&[(0, 0, 0.9), (0, 1, 0.8), (1, 0, 0.85), (1, 1, 0.1)]);
        assert_eq!(greedy, vec![(0, 0), (1, 1)]);
        assert!(total(&weights, &optimal) > total(&weights, &greedy));
    }

    #[test]
    fn matches_brute_force_on_rectangular_inputs() {
        // Deterministic pseudo-random fill.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 1000) as f64 / 1000.0
        };
        for (rows, cols) in [(3, 3), (2, 4), (4, 2), (5, 5), (1, 3)] {
            let weights: Vec<Vec<f64>> = (0..rows)
                .map(|_| (0..cols).map(|_| next()).collect())
                .collect();
            let pairs = max_weight_assignment(&weights);
            assert_eq!(pairs.len(), rows.min(cols));
            assert!(
                (total(&weights, &pairs) - brute_force_best(&weights)).abs() < 1e-6,
                "{rows}x{cols}"
            );
        }
    }

    #[test]
    fn ties_prefer_lower_indices() {
        let weights = vec![vec![0.8, 0.8], vec![0.8, 0.8]];
        assert_eq!(max_weight_assignment(&weights), vec![(0, 0), (1, 1)]);

        let weights = vec![vec![0.8, 0.8, 0.8]];
        assert_eq!(max_weight_assignment(&weights), vec![(0, 0)]);

        let weights = vec![vec![0.8], vec![0.8]];
        assert_eq!(max_weight_assignment(&weights), vec![(0, 0)]);
    }

    #[test]
    fn rows_and_columns_without_candidates_are_skipped() {
        let weights = vec![
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.7, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.6, 0.0, 0.9],
        ];
        assert_eq!(max_weight_assignment(&weights), vec![(1, 1), (3, 3)]);

        let none = vec![vec![0.0; 3]; 3];
        assert!(max_weight_assignment(&none).is_empty());
    }

    #[test]
    fn empty_inputs() {
        assert!(max_weight_assignment(&[]).is_empty());
        assert!(max_weight_assignment(&[vec![]]).is_empty());
        assert!(greedy_assignment(&[]).is_empty());
    }
}
