// src/forecast/knn.rs
//
// Brute-force k-nearest-neighbour regression. Training sets here are a few
// thousand rows at most, so a linear scan per query is plenty.

use super::features::Features;

pub struct KnnRegressor {
    k: usize,
    samples: Vec<(Features, f64)>,
}

impl KnnRegressor {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            samples: Vec::new(),
        }
    }

    pub fn fit(&mut self, samples: Vec<(Features, f64)>) {
        self.samples = samples;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Mean target of the k nearest samples (Euclidean, uniform weights).
    /// With fewer than k samples all of them are used. Ties in distance keep
    /// training order. `None` if nothing was fitted.
    pub fn predict(&self, query: &Features) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut distances: Vec<(f64, f64)> = self
            .samples
            .iter()
            .map(|(x, y)| (squared_distance(x, query), *y))
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        let k = self.k.min(distances.len());
        let sum: f64 = distances[..k].iter().map(|(_, y)| y).sum();
        Some(sum / k as f64)
    }
}

fn squared_distance(a: &Features, b: &Features) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(occupancy: f64, target: f64) -> (Features, f64) {
        ([8.0, 0.0, 1.0, 0.0, 0.0, occupancy], target)
    }

    #[test]
    fn test_averages_nearest_targets() {
        let mut knn = KnnRegressor::new(2);
        knn.fit(vec![sample(0.0, 1.0), sample(1.0, 3.0), sample(50.0, 100.0)]);
        assert_eq!(knn.predict(&sample(0.4, 0.0).0), Some(2.0));
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let mut knn = KnnRegressor::new(5);
        knn.fit(vec![sample(0.0, 2.0), sample(10.0, 4.0)]);
        assert_eq!(knn.predict(&sample(0.0, 0.0).0), Some(3.0));
    }

    #[test]
    fn test_unfitted_predicts_nothing() {
        assert_eq!(KnnRegressor::new(3).predict(&[0.0; 6]), None);
    }
}
