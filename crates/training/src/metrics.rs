//! Top-k accuracy counting.

/// Per-`k` hit counts for one batch of row-major `scores` (`[n, num_classes]`).
///
/// A sample counts as a hit for `k` when fewer than `k` classes score strictly
/// higher than its true class.
pub fn top_k_hits(scores: &[f32], num_classes: usize, targets: &[usize], ks: &[usize]) -> Vec<usize> {
    let mut hits = vec![0usize; ks.len()];
    if num_classes == 0 {
        return hits;
    }
    for (row, &target) in scores.chunks_exact(num_classes).zip(targets) {
        let Some(&true_score) = row.get(target) else {
            continue;
        };
        let rank = row.iter().filter(|&&s| s > true_score).count();
        for (hit, &k) in hits.iter_mut().zip(ks) {
            if rank < k {
                *hit += 1;
            }
        }
    }
    hits
}

/// Running top-k counts over a whole split.
#[derive(Debug, Clone)]
pub struct AccuracyTally {
    ks: Vec<usize>,
    hits: Vec<usize>,
    total: usize,
}

impl AccuracyTally {
    pub fn new(ks: &[usize]) -> Self {
        Self {
            ks: ks.to_vec(),
            hits: vec![0; ks.len()],
            total: 0,
        }
    }

    pub fn update(&mut self, scores: &[f32], num_classes: usize, targets: &[usize]) {
        let batch = top_k_hits(scores, num_classes, targets, &self.ks);
        for (acc, h) in self.hits.iter_mut().zip(batch) {
            *acc += h;
        }
        self.total += targets.len();
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn hits(&self) -> &[usize] {
        &self.hits
    }

    /// Percentages in `ks` order; zero when nothing was counted.
    pub fn percentages(&self) -> Vec<f64> {
        self.hits
            .iter()
            .map(|&h| {
                if self.total == 0 {
                    0.0
                } else {
                    100.0 * h as f64 / self.total as f64
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Row of 8 scores with `target` ranked `rank` (1-based).
    fn row_with_rank(target: usize, rank: usize) -> Vec<f32> {
        let mut row: Vec<f32> = (0..8).map(|i| -(i as f32)).collect();
        // Scores descend by index; swap the target into position rank-1.
        let slot = rank - 1;
        let mut out = vec![0.0; 8];
        let mut others = (0..8).filter(|&c| c != target);
        for (pos, score) in row.drain(..).enumerate() {
            let class = if pos == slot {
                target
            } else {
                others.next().unwrap()
            };
            out[class] = score;
        }
        out
    }

    #[test]
    fn ranks_one_one_six_two() {
        let targets = [3usize, 0, 5, 7];
        let ranks = [1usize, 1, 6, 2];
        let scores: Vec<f32> = targets
            .iter()
            .zip(ranks)
            .flat_map(|(&t, r)| row_with_rank(t, r))
            .collect();
        assert_eq!(top_k_hits(&scores, 8, &targets, &[1, 5]), vec![2, 3]);
    }

    #[test]
    fn tally_divides_by_total_samples() {
        let mut tally = AccuracyTally::new(&[1, 5]);
        tally.update(&[0.9, 0.1, 0.2, 0.8], 2, &[0, 0]);
        tally.update(&[0.3, 0.7], 2, &[1]);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.hits(), &[2, 3]);
        let pct = tally.percentages();
        assert!((pct[0] - 200.0 / 3.0).abs() < 1e-9);
        assert!((pct[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_tally_reports_zero() {
        assert_eq!(AccuracyTally::new(&[1, 5]).percentages(), vec![0.0, 0.0]);
    }
}
