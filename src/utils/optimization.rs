//! Bounded Nelder-Mead minimisation used to fit smoothing parameters.

/// Outcome of a simplex search.
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Best point found, inside the bounds.
    pub point: Vec<f64>,
    /// Objective value at `point`.
    pub value: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the simplex collapsed below the tolerance.
    pub converged: bool,
}

/// Search settings.
#[derive(Debug, Clone, Copy)]
pub struct SimplexSettings {
    pub max_iter: usize,
    pub tolerance: f64,
    /// Relative size of the initial simplex edges.
    pub initial_step: f64,
}

impl Default for SimplexSettings {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-8,
            initial_step: 0.1,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimise `objective` over the box `bounds` starting from `start`.
///
/// Points are clamped into the box after every simplex move, so the
/// objective is never evaluated outside it.
///
/// # Example
/// ```
/// use forecast_lab::utils::optimization::{minimize_in_box, SimplexSettings};
///
/// let min = minimize_in_box(
///     |p| (p[0] - 0.3).powi(2) + (p[1] - 0.7).powi(2),
///     &[0.5, 0.5],
///     &[(0.0, 1.0), (0.0, 1.0)],
///     SimplexSettings::default(),
/// );
/// assert!((min.point[0] - 0.3).abs() < 1e-3);
/// assert!((min.point[1] - 0.7).abs() < 1e-3);
/// ```
pub fn minimize_in_box<F>(
    objective: F,
    start: &[f64],
    bounds: &[(f64, f64)],
    settings: SimplexSettings,
) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let dim = start.len();
    if dim == 0 {
        return Minimum {
            point: Vec::new(),
            value: f64::NAN,
            iterations: 0,
            converged: false,
        };
    }

    let clamp = |p: Vec<f64>| -> Vec<f64> {
        p.into_iter()
            .enumerate()
            .map(|(i, x)| match bounds.get(i) {
                Some(&(lo, hi)) => x.clamp(lo, hi),
                None => x,
            })
            .collect()
    };
    let eval = |p: &[f64]| {
        let v = objective(p);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    vertices.push(clamp(start.to_vec()));
    for i in 0..dim {
        let mut v = vertices[0].clone();
        let width = bounds.get(i).map(|(lo, hi)| hi - lo).unwrap_or(1.0);
        let step = settings.initial_step * width.max(1e-12);
        // Step towards the interior when the start sits on the upper bound.
        if bounds.get(i).map_or(false, |&(_, hi)| v[i] + step > hi) {
            v[i] -= step;
        } else {
            v[i] += step;
        }
        vertices.push(clamp(v));
    }
    let mut scores: Vec<f64> = vertices.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < settings.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
        let (best, worst, second) = (order[0], order[dim], order[dim - 1]);

        let spread = (scores[worst] - scores[best]).abs();
        let size = vertices
            .iter()
            .map(|v| distance(v, &vertices[best]))
            .fold(0.0, f64::max);
        if spread < settings.tolerance || size < settings.tolerance {
            converged = true;
            break;
        }

        let centroid = centroid_without(&vertices, worst);
        let toward = |from: &[f64], coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(from)
                .map(|(c, x)| c + coef * (x - c))
                .collect()
        };

        let reflected = clamp(toward(&vertices[worst], -REFLECT));
        let reflected_score = eval(&reflected);

        if reflected_score < scores[best] {
            let expanded = clamp(toward(&reflected, EXPAND));
            let expanded_score = eval(&expanded);
            if expanded_score < reflected_score {
                vertices[worst] = expanded;
                scores[worst] = expanded_score;
            } else {
                vertices[worst] = reflected;
                scores[worst] = reflected_score;
            }
            continue;
        }
        if reflected_score < scores[second] {
            vertices[worst] = reflected;
            scores[worst] = reflected_score;
            continue;
        }

        let (candidate, limit) = if reflected_score < scores[worst] {
            (clamp(toward(&reflected, CONTRACT)), reflected_score)
        } else {
            (clamp(toward(&vertices[worst], CONTRACT)), scores[worst])
        };
        let candidate_score = eval(&candidate);
        if candidate_score < limit {
            vertices[worst] = candidate;
            scores[worst] = candidate_score;
            continue;
        }

        let anchor = vertices[best].clone();
        for i in 0..=dim {
            if i == best {
                continue;
            }
            let shrunk: Vec<f64> = anchor
                .iter()
                .zip(&vertices[i])
                .map(|(a, x)| a + SHRINK * (x - a))
                .collect();
            vertices[i] = clamp(shrunk);
            scores[i] = eval(&vertices[i]);
        }
    }

    let best = (0..=dim)
        .min_by(|&a, &b| scores[a].total_cmp(&scores[b]))
        .unwrap_or(0);
    Minimum {
        point: vertices[best].clone(),
        value: scores[best],
        iterations,
        converged,
    }
}

fn centroid_without(vertices: &[Vec<f64>], skip: usize) -> Vec<f64> {
    let dim = vertices[0].len();
    let mut c = vec![0.0; dim];
    for (i, v) in vertices.iter().enumerate() {
        if i == skip {
            continue;
        }
        for (acc, x) in c.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let count = (vertices.len() - 1) as f64;
    c.iter_mut().for_each(|x| *x /= count);
    c
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn finds_interior_minimum() {
        let min = minimize_in_box(
            |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
            &[0.0, 0.0],
            &[(-10.0, 10.0), (-10.0, 10.0)],
            SimplexSettings::default(),
        );
        assert!(min.converged);
        assert_relative_eq!(min.point[0], 2.0, epsilon = 1e-3);
        assert_relative_eq!(min.point[1], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn respects_bounds() {
        let min = minimize_in_box(
            |x| (x[0] - 5.0).powi(2),
            &[0.5],
            &[(0.0, 1.0)],
            SimplexSettings::default(),
        );
        assert_relative_eq!(min.point[0], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn fits_smoothing_constant() {
        let data: [f64; 8] = [10.0, 12.0, 11.0, 13.0, 14.0, 13.0, 15.0, 16.0];
        let sse = |p: &[f64]| {
            let mut level = data[0];
            let mut total = 0.0;
            for &y in &data[1..] {
                total += (y - level).powi(2);
                level = p[0] * y + (1.0 - p[0]) * level;
            }
            total
        };
        let min = minimize_in_box(sse, &[0.5], &[(0.01, 0.99)], SimplexSettings::default());
        assert!(min.point[0] > 0.01 && min.point[0] < 0.99);
        assert!(min.value <= sse(&[0.5]));
    }

    #[test]
    fn nan_objective_is_treated_as_worst() {
        let min = minimize_in_box(
            |x| if x[0] < 0.2 { f64::NAN } else { (x[0] - 0.5).powi(2) },
            &[0.9],
            &[(0.0, 1.0)],
            SimplexSettings::default(),
        );
        assert!(min.value.is_finite());
        assert_relative_eq!(min.point[0], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn empty_start_returns_nan() {
        let min = minimize_in_box(|_| 0.0, &[], &[], SimplexSettings::default());
        assert!(!min.converged);
        assert!(min.value.is_nan());
    }
}
