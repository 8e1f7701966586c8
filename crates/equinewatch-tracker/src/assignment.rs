//! Minimum-cost bipartite assignment (Hungarian algorithm).
//!
//! The tracker's stage-1 association (§4.2 step 2) solves a minimum-cost
//! assignment over an IoU-distance cost matrix. None of the retrieved
//! example crates vendor an assignment solver (the original reference
//! implementation leans on `scipy.optimize.linear_sum_assignment`), so this
//! is a small from-scratch O(n^3) solver in the same family, grounded in the
//! classic Kuhn-Munkres method with row/column potentials.

/// A cost large enough to never be chosen over a real assignment, used to
/// pad a rectangular cost matrix out to square.
const PAD_COST: f64 = 1.0e9;

/// Solve the minimum-cost assignment for a `rows x cols` cost matrix.
///
/// Returns, for each row, the column it was assigned to (or `None` if the
/// matrix was rectangular and that row landed on a padding column). Every
/// row and column is given *some* assignment in the square padded problem;
/// callers additionally gate on the real cost (e.g. an IoU threshold) to
/// decide whether a returned pairing should actually be accepted.
pub fn min_cost_assignment(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let n_rows = cost.len();
    if n_rows == 0 {
        return Vec::new();
    }
    let n_cols = cost[0].len();
    if n_cols == 0 {
        return vec![None; n_rows];
    }
    let n = n_rows.max(n_cols);

    // 1-indexed (n+1) x (n+1) matrix, padded square.
    let mut a = vec![vec![0.0f64; n + 1]; n + 1];
    for (i, row) in cost.iter().enumerate() {
        for j in 0..n {
            a[i + 1][j + 1] = if j < n_cols { row[j] } else { PAD_COST };
        }
    }
    for i in n_rows..n {
        for j in 0..n {
            a[i + 1][j + 1] = PAD_COST;
        }
    }

    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut p = vec![0usize; n + 1]; // p[j] = row currently assigned to column j
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if !used[j] {
                    let cur = a[i0][j] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
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

    let mut row_to_col = vec![None; n_rows];
    for j in 1..=n {
        let i = p[j];
        if i >= 1 && i <= n_rows && j <= n_cols {
            row_to_col[i - 1] = Some(j - 1);
        }
    }
    row_to_col
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_obviously_cheapest_pairing() {
        let cost = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let assignment = min_cost_assignment(&cost);
        assert_eq!(assignment, vec![Some(0), Some(1)]);
    }

    #[test]
    fn handles_rectangular_more_rows_than_cols() {
        let cost = vec![vec![0.1], vec![0.9]];
        let assignment = min_cost_assignment(&cost);
        assert_eq!(assignment[0], Some(0));
        assert_eq!(assignment[1], None);
    }

    #[test]
    fn handles_rectangular_more_cols_than_rows() {
        let cost = vec![vec![0.2, 0.9, 0.5]];
        let assignment = min_cost_assignment(&cost);
        assert_eq!(assignment, vec![Some(0)]);
    }

    #[test]
    fn empty_matrix_is_a_no_op() {
        assert_eq!(min_cost_assignment(&[]), Vec::<Option<usize>>::new());
    }

    #[test]
    fn minimizes_total_cost_not_greedy_choice() {
        // Greedy-by-row picks (0,0)=1 then is forced into (1,1)=3, total 4.
        // The optimal assignment is (0,1)=2, (1,0)=1, total 3.
        let cost = vec![vec![1.0, 2.0], vec![1.0, 3.0]];
        let assignment = min_cost_assignment(&cost);
        let total: f64 = assignment
            .iter()
            .enumerate()
            .map(|(i, j)| j.map(|j| cost[i][j]).unwrap_or(0.0))
            .sum();
        assert!((total - 3.0).abs() < 1e-9);
    }
}
