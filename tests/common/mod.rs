//! Common test utilities and data generators.
#![allow(dead_code)]

use rand::distributions::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use simreg_rs::DataFrame;
use statrs::distribution::{Gamma, Normal, Poisson};

/// The 32-car motor trend road test data: mpg, hp, wt, cyl (as text), am.
pub fn cars() -> DataFrame {
    let mpg = vec![
        21.0, 21.0, 22.8, 21.4, 18.7, 18.1, 14.3, 24.4, 22.8, 19.2, 17.8, 16.4, 17.3, 15.2, 10.4,
        10.4, 14.7, 32.4, 30.4, 33.9, 21.5, 15.5, 15.2, 13.3, 19.2, 27.3, 26.0, 30.4, 15.8, 19.7,
        15.0, 21.4,
    ];
    let hp = vec![
        110.0, 110.0, 93.0, 110.0, 175.0, 105.0, 245.0, 62.0, 95.0, 123.0, 123.0, 180.0, 180.0,
        180.0, 205.0, 215.0, 230.0, 66.0, 52.0, 65.0, 97.0, 150.0, 150.0, 245.0, 175.0, 66.0, 91.0,
        113.0, 264.0, 175.0, 335.0, 109.0,
    ];
    let wt = vec![
        2.620, 2.875, 2.320, 3.215, 3.440, 3.460, 3.570, 3.190, 3.150, 3.440, 3.440, 4.070, 3.730,
        3.780, 5.250, 5.424, 5.345, 2.200, 1.615, 1.835, 2.465, 3.520, 3.435, 3.840, 3.845, 1.935,
        2.140, 1.513, 3.170, 2.770, 3.570, 2.780,
    ];
    let cyl = [
        6, 6, 4, 6, 8, 6, 8, 4, 4, 6, 6, 8, 8, 8, 8, 8, 8, 4, 4, 4, 4, 8, 8, 8, 8, 4, 4, 4, 8, 6, 8,
        4,
    ];
    let am = [
        1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1,
        1,
    ];
    let cyl: Vec<&str> = cyl
        .iter()
        .map(|c| match c {
            4 => "four",
            6 => "six",
            _ => "eight",
        })
        .collect();

    DataFrame::new()
        .with_numeric("mpg", mpg)
        .with_numeric("hp", hp)
        .with_numeric("wt", wt)
        .with_text("cyl", cyl)
        .with_bool("am", am.iter().map(|&a| a == 1).collect())
        .build()
        .unwrap()
}

fn normal_draws(n: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let normal = Normal::standard();
    (0..n).map(|_| normal.sample(rng)).collect()
}

/// y = 2 + 3x + N(0, 0.5²), x ~ N(0, 1).
pub fn linear_data(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = normal_draws(n, &mut rng);
    let noise = normal_draws(n, &mut rng);
    let y = x
        .iter()
        .zip(&noise)
        .map(|(xi, e)| 2.0 + 3.0 * xi + 0.5 * e)
        .collect();
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .build()
        .unwrap()
}

/// Linear data whose noise grows with |x|, plus a group label with `groups`
/// levels.
pub fn heteroskedastic_data(n: usize, groups: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = normal_draws(n, &mut rng);
    let noise = normal_draws(n, &mut rng);
    let y = x
        .iter()
        .zip(&noise)
        .map(|(xi, e)| 1.0 + 2.0 * xi + (0.2 + xi.abs()) * e)
        .collect();
    let group: Vec<String> = (0..n).map(|i| format!("g{}", i % groups)).collect();
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .with_text("group", group)
        .build()
        .unwrap()
}

/// Binary outcome with P(y = 1) = logistic(-0.5 + 1.2x).
pub fn binary_data(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = normal_draws(n, &mut rng);
    let y = x
        .iter()
        .map(|xi| {
            let p = 1.0 / (1.0 + (-(-0.5 + 1.2 * xi)).exp());
            if rng.gen_bool(p) {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .build()
        .unwrap()
}

/// Counts with mean exp(0.5 + 0.4x); `theta` adds gamma overdispersion.
pub fn count_data(n: usize, theta: Option<f64>, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = normal_draws(n, &mut rng);
    let y = x
        .iter()
        .map(|xi| {
            let mu = (0.5 + 0.4 * xi).exp();
            let lambda = match theta {
                Some(theta) => Gamma::new(theta, theta / mu).unwrap().sample(&mut rng),
                None => mu,
            };
            let draw: f64 = Poisson::new(lambda.max(1e-8)).unwrap().sample(&mut rng);
            draw
        })
        .collect();
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .build()
        .unwrap()
}

/// Positive outcome with mean 1 / (0.5 + 0.3x), x ~ U(0, 2), shape 5.
pub fn gamma_data(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..2.0)).collect();
    let y = x
        .iter()
        .map(|xi| {
            let mu = 1.0 / (0.5 + 0.3 * xi);
            Gamma::new(5.0, 5.0 / mu).unwrap().sample(&mut rng)
        })
        .collect();
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .build()
        .unwrap()
}

/// y = max(0, -1 + 2x + N(0, 1)).
pub fn censored_data(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = normal_draws(n, &mut rng);
    let noise = normal_draws(n, &mut rng);
    let y = x
        .iter()
        .zip(&noise)
        .map(|(xi, e)| (-1.0 + 2.0 * xi + e).max(0.0))
        .collect();
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .build()
        .unwrap()
}

/// Panel with `firms` firms observed for `years` years:
/// y = firm effect + 1.5x + N(0, 1).
pub fn panel_data(firms: usize, years: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let effects = normal_draws(firms, &mut rng);
    let mut firm = Vec::new();
    let mut year = Vec::new();
    let mut x = Vec::new();
    let mut y = Vec::new();
    let normal = Normal::standard();
    for (f, effect) in effects.iter().enumerate() {
        for t in 0..years {
            let xi = normal.sample(&mut rng) + 0.5 * effect;
            firm.push(format!("f{f:02}"));
            year.push(format!("y{t}"));
            x.push(xi);
            y.push(2.0 * effect + 1.5 * xi + normal.sample(&mut rng));
        }
    }
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .with_text("firm", firm)
        .with_text("year", year)
        .build()
        .unwrap()
}

/// Stratified two-stage sample: 4 strata, 5 PSUs each, 10 units per PSU,
/// unequal weights.
pub fn survey_data(seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::standard();
    let (mut y, mut x, mut w, mut stratum, mut psu) =
        (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for h in 0..4 {
        for c in 0..5 {
            let cluster_effect = 0.5 * normal.sample(&mut rng);
            for _ in 0..10 {
                let xi: f64 = normal.sample(&mut rng);
                x.push(xi);
                y.push(1.0 + 0.8 * xi + cluster_effect + normal.sample(&mut rng));
                w.push(1.0 + h as f64);
                stratum.push(format!("s{h}"));
                psu.push(format!("p{h}_{c}"));
            }
        }
    }
    DataFrame::new()
        .with_numeric("y", y)
        .with_numeric("x", x)
        .with_numeric("w", w)
        .with_text("stratum", stratum)
        .with_text("psu", psu)
        .build()
        .unwrap()
}
