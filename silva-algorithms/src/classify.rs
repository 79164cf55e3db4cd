//! Distance-weighted nearest-neighbour voxel classifier.
//!
//! Works on voxel cell coordinates rather than raw points: each training
//! sample is an occupied cell labeled with a tree id. Class probabilities are
//! inverse-distance weighted over the k nearest training cells, so the
//! classifier is "fuzzy" rather than a hard labeller.

use kd_tree::{KdPoint, KdTree};

struct LabeledCell {
    position: [f64; 3],
    label: usize,
}

impl KdPoint for LabeledCell {
    type Scalar = f64;
    type Dim = typenum::U3;
    fn at(&self, k: usize) -> f64 {
        self.position[k]
    }
}

/// A k-nearest-neighbour classifier with inverse-distance weighting.
pub struct FuzzyKnn {
    tree: KdTree<LabeledCell>,
    n_samples: usize,
    n_classes: usize,
    k: usize,
}

impl FuzzyKnn {
    /// Builds the classifier over `(cell coordinate, label)` samples. Labels
    /// must be smaller than `n_classes`.
    pub fn fit(samples: &[([f64; 3], usize)], n_classes: usize, k: usize) -> Self {
        let cells = samples
            .iter()
            .map(|&(position, label)| LabeledCell { position, label })
            .collect();
        Self {
            tree: KdTree::build_by_ordered_float(cells),
            n_samples: samples.len(),
            n_classes,
            k,
        }
    }

    pub fn len(&self) -> usize {
        self.n_samples
    }

    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// Per-class membership probabilities for `query`.
    ///
    /// Neighbours are weighted by inverse distance; if any neighbour
    /// coincides exactly with the query, the probability mass is shared among
    /// the coinciding neighbours only. The returned values sum to one
    /// (or are all zero when the classifier is empty).
    pub fn predict_proba(&self, query: [f64; 3]) -> Vec<f64> {
        let mut probabilities = vec![0.0; self.n_classes];
        if self.n_samples == 0 {
            return probabilities;
        }
        let neighbors = self.tree.nearests(&query, self.k);

        let exact: Vec<&LabeledCell> = neighbors
            .iter()
            .filter(|n| n.squared_distance == 0.0)
            .map(|n| n.item)
            .collect();
        if !exact.is_empty() {
            let weight = 1.0 / exact.len() as f64;
            for cell in exact {
                probabilities[cell.label] += weight;
            }
        } else {
            let mut total = 0.0;
            for neighbor in &neighbors {
                let weight = 1.0 / neighbor.squared_distance.sqrt();
                probabilities[neighbor.item.label] += weight;
                total += weight;
            }
            for p in probabilities.iter_mut() {
                *p /= total;
            }
        }
        probabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Two well-separated voxel blocks, labels 0 and 1.
    fn two_block_samples() -> Vec<([f64; 3], usize)> {
        let mut samples = Vec::new();
        for x in 0..3 {
            for z in 0..10 {
                samples.push(([x as f64, 0.0, z as f64], 0));
                samples.push(([x as f64 + 100.0, 0.0, z as f64], 1));
            }
        }
        samples
    }

    #[test]
    fn probabilities_form_a_simplex() {
        let classifier = FuzzyKnn::fit(&two_block_samples(), 2, 7);
        let probs = classifier.predict_proba([1.5, 0.5, 5.0]);
        assert_eq!(probs.len(), 2);
        assert_approx_eq!(probs.iter().sum::<f64>(), 1.0, 1e-12);
    }

    #[test]
    fn near_block_wins_with_high_probability() {
        let classifier = FuzzyKnn::fit(&two_block_samples(), 2, 7);
        let probs = classifier.predict_proba([1.0, 1.0, 4.0]);
        assert!(probs[0] >= 0.9);
        let probs = classifier.predict_proba([101.0, 1.0, 4.0]);
        assert!(probs[1] >= 0.9);
    }

    #[test]
    fn exact_match_takes_all_probability_mass() {
        let classifier = FuzzyKnn::fit(&two_block_samples(), 2, 7);
        let probs = classifier.predict_proba([0.0, 0.0, 0.0]);
        assert_approx_eq!(probs[0], 1.0, 1e-12);
        assert_approx_eq!(probs[1], 0.0, 1e-12);
    }

    #[test]
    fn empty_classifier_returns_zeros() {
        let classifier = FuzzyKnn::fit(&[], 2, 7);
        assert!(classifier.is_empty());
        let probs = classifier.predict_proba([0.0, 0.0, 0.0]);
        assert_eq!(probs, vec![0.0, 0.0]);
    }
}
