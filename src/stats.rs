//! Small statistics helpers shared by the decoder, scorer and inference engine.

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation (divides by `n`)
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Median, averaging the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// `q`-th percentile (0-100) with linear interpolation between closest ranks
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Percentile rank of `score` within `population`, "rank" semantics.
///
/// Ties receive the average of the ranks they span, so the maximum of a
/// population without duplicates scores exactly 100.
pub fn percentile_of_score(population: &[f64], score: f64) -> Option<f64> {
    if population.is_empty() {
        return None;
    }
    let n = population.len() as f64;
    let below = population.iter().filter(|&&x| x < score).count() as f64;
    let at_or_below = population.iter().filter(|&&x| x <= score).count() as f64;
    let present = if at_or_below > below { 1.0 } else { 0.0 };
    Some((below + at_or_below + present) * 50.0 / n)
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        // position 0.9 * 4 = 3.6 -> 4 + 0.6 * (5 - 4)
        assert!((percentile(&values, 90.0).unwrap() - 4.6).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_of_score_unique() {
        let population = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile_of_score(&population, 40.0), Some(100.0));
        assert_eq!(percentile_of_score(&population, 10.0), Some(25.0));
        assert_eq!(percentile_of_score(&population, 20.0), Some(50.0));
    }

    #[test]
    fn test_percentile_of_score_ties_average() {
        let population = [1.0, 2.0, 2.0, 3.0];
        // ranks 2 and 3 tie -> average rank 2.5 -> 62.5
        assert_eq!(percentile_of_score(&population, 2.0), Some(62.5));
        let flat = [5.0, 5.0, 5.0];
        // every value ties at average rank 2 of 3
        assert!((percentile_of_score(&flat, 5.0).unwrap() - 200.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_population_std() {
        let std = population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(1.75, 1), 1.8);
    }
}
