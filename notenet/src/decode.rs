// Decoding policies: how a probability row becomes the next note.
//
// Generation is greedy by default, always taking the arg-max. `Sampled`
// draws from the temperature-adjusted distribution instead, using the
// caller's `NotePrng` so a seed still reproduces a melody. Both see the
// probabilities only after the generator has checked they are finite.

use ndarray::ArrayView1;
use notenet_prng::NotePrng;

/// Choose a class index from one row of probabilities.
pub trait DecodePolicy {
    fn choose(&mut self, probabilities: ArrayView1<'_, f64>) -> usize;
}

/// Arg-max decoding. Ties go to the lowest index.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greedy;

impl DecodePolicy for Greedy {
    fn choose(&mut self, probabilities: ArrayView1<'_, f64>) -> usize {
        argmax(probabilities)
    }
}

pub fn argmax(values: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Random decoding from `p^(1/temperature)`, renormalised.
///
/// Temperatures below 1 sharpen the distribution toward the arg-max, above
/// 1 flatten it. A non-positive temperature degenerates to greedy, and an
/// infinite one samples uniformly among the classes with non-zero
/// probability.
#[derive(Clone, Debug)]
pub struct Sampled {
    pub temperature: f64,
    pub rng: NotePrng,
}

impl Sampled {
    pub fn new(temperature: f64, rng: NotePrng) -> Self {
        Sampled { temperature, rng }
    }
}

impl DecodePolicy for Sampled {
    fn choose(&mut self, probabilities: ArrayView1<'_, f64>) -> usize {
        if self.temperature <= 0.0 {
            return argmax(probabilities);
        }
        let inv_t = 1.0 / self.temperature;
        // Zero-probability classes keep weight 0 at every temperature.
        let weights: Vec<f64> = probabilities
            .iter()
            .map(|&p| if p > 0.0 { p.powf(inv_t) } else { 0.0 })
            .collect();
        let total: f64 = weights.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return argmax(probabilities);
        }

        // Cumulative scan over the weights.
        let target = self.rng.next_f64() * total;
        let mut cumulative = 0.0;
        for (i, &w) in weights.iter().enumerate() {
            cumulative += w;
            if cumulative > target {
                return i;
            }
        }
        // Rounding can leave target just past the final sum.
        weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn greedy_picks_highest_first_on_ties() {
        let p = array![0.1, 0.4, 0.4, 0.1];
        assert_eq!(Greedy.choose(p.view()), 1);
        let p = array![0.7, 0.1, 0.2];
        assert_eq!(Greedy.choose(p.view()), 0);
    }

    #[test]
    fn sampling_never_picks_zero_probability_classes() {
        let mut policy = Sampled::new(1.0, NotePrng::new(3));
        let p = array![0.0, 0.5, 0.0, 0.5];
        for _ in 0..1000 {
            let i = policy.choose(p.view());
            assert!(i == 1 || i == 3, "picked impossible class {i}");
        }
    }

    #[test]
    fn sampling_follows_distribution() {
        let mut policy = Sampled::new(1.0, NotePrng::new(17));
        let p = array![0.8, 0.2];
        let n = 10_000;
        let zeros = (0..n).filter(|_| policy.choose(p.view()) == 0).count();
        let frac = zeros as f64 / n as f64;
        assert!(
            (0.77..0.83).contains(&frac),
            "expected ~80% class 0, got {frac}"
        );
    }

    #[test]
    fn low_temperature_approaches_greedy() {
        let mut policy = Sampled::new(0.05, NotePrng::new(5));
        let p = array![0.3, 0.45, 0.25];
        let hits = (0..1000).filter(|_| policy.choose(p.view()) == 1).count();
        assert!(hits > 990, "picked the max only {hits} times");

        let mut zero_t = Sampled::new(0.0, NotePrng::new(5));
        assert_eq!(zero_t.choose(p.view()), 1);
    }

    #[test]
    fn infinite_temperature_is_uniform_over_possible_classes() {
        let mut policy = Sampled::new(f64::INFINITY, NotePrng::new(21));
        let p = array![0.0, 0.9, 0.0, 0.1];
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            counts[policy.choose(p.view())] += 1;
        }
        assert_eq!(counts[0] + counts[2], 0, "impossible class: {counts:?}");
        // Uniform over {1, 3}, not proportional to 0.9 / 0.1.
        assert!((1800..2200).contains(&counts[1]), "split {counts:?}");
    }
}
