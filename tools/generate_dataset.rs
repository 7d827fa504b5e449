//! Synthetic Partner Dataset Generator
//!
//! Writes labeled training, test and single-user CSVs shaped like the data the
//! eligibility model is trained on.
//!
//! Usage: generate_dataset [output_dir] [seed]

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One generated partner row
#[derive(Debug, Clone, Serialize)]
struct Partner {
    #[serde(rename = "Partner ID")]
    partner_id: String,
    #[serde(rename = "Partner Type")]
    partner_type: &'static str,
    #[serde(rename = "Earnings (Value)")]
    earnings: u32,
    #[serde(rename = "Earnings (Stability Type)")]
    stability: &'static str,
    #[serde(rename = "Perf. Rating (Avg)")]
    rating: f64,
    #[serde(rename = "Time on Platform (Months)")]
    tenure_months: u32,
    #[serde(rename = "Order/Trip Volume")]
    volume: u32,
    #[serde(rename = "Financial Activity (Score)")]
    financial_activity: f64,
    #[serde(rename = "Earnings Volatility")]
    volatility: f64,
    #[serde(rename = "On-Time Loan Repayments")]
    repayments: u32,
    #[serde(rename = "Operational Anomaly Score")]
    anomaly: f64,
    #[serde(rename = "Creditworthy")]
    creditworthy: u8,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Partner dataset generator
struct DatasetGenerator {
    rng: StdRng,
    rating_noise: Normal<f64>,
}

impl DatasetGenerator {
    fn new(seed: Option<u64>) -> Result<Self> {
        Ok(Self {
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            rating_noise: Normal::new(0.0, 0.2).context("Invalid rating noise")?,
        })
    }

    fn pick(&mut self, choices: &[(&'static str, f64)]) -> &'static str {
        let mut draw: f64 = self.rng.gen();
        for (choice, weight) in choices {
            if draw < *weight {
                return choice;
            }
            draw -= weight;
        }
        choices[choices.len() - 1].0
    }

    /// Generate `count` partners labeled against the batch mean score
    fn generate(&mut self, count: usize) -> Vec<Partner> {
        // Drawn once per batch
        let volume_offset = self.rng.gen_range(50..200) as f64;
        let engagement = self.rng.gen_range(0.0..1.0);

        let mut partners = Vec::with_capacity(count);
        let mut scores = Vec::with_capacity(count);

        for i in 1..=count {
            let partner_type = self.pick(&[("Driver", 0.7), ("Merchant", 0.3)]);
            let earnings = if partner_type == "Driver" {
                self.rng.gen_range(1000..2500)
            } else {
                self.rng.gen_range(800..2000)
            };
            let stability = self.pick(&[("Stable", 0.6), ("Seasonal", 0.2), ("Variable", 0.2)]);
            let tenure_months = self.rng.gen_range(1..48);

            let noise = self.rating_noise.sample(&mut self.rng);
            let rating = round_to(
                (4.0 + tenure_months as f64 / 48.0 * 0.9 + noise).clamp(3.0, 5.0),
                1,
            );

            let volume =
                (earnings as f64 * self.rng.gen_range(0.15..0.25) + volume_offset) as u32;

            let financial_activity = round_to(
                (earnings as f64 / 2500.0 * 0.6
                    + tenure_months as f64 / 48.0 * 0.3
                    + self.rng.gen_range(-0.1..0.1))
                .clamp(0.0, 1.0),
                2,
            );

            let volatility = round_to(
                (1.0 - earnings as f64 / 2500.0 - self.rng.gen_range(0.0..0.3)).clamp(0.1, 0.9),
                2,
            );

            let repayments = (financial_activity * 20.0 + self.rng.gen_range(-2..3) as f64)
                .clamp(0.0, 15.0) as u32;

            let anomaly = round_to(
                (1.0 - rating / 5.0 + self.rng.gen_range(-0.1..0.2)).clamp(0.0, 1.0),
                2,
            );

            let raw_score = rating * 0.18
                + financial_activity * 0.28
                + (tenure_months as f64 / 60.0) * 0.12
                + (1.0 - volatility) * 0.08
                + (repayments as f64 / 20.0) * 0.08
                + (1.0 - anomaly) * 0.18
                + engagement * 0.08
                + (earnings as f64 / 2500.0) * 0.05;
            scores.push(raw_score);

            partners.push(Partner {
                partner_id: format!("00{:03}", i),
                partner_type,
                earnings,
                stability,
                rating,
                tenure_months,
                volume,
                financial_activity,
                volatility,
                repayments,
                anomaly,
                creditworthy: 0,
            });
        }

        let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
        for (partner, score) in partners.iter_mut().zip(&scores) {
            partner.creditworthy = u8::from(*score > mean);
        }

        partners
    }
}

fn write_dataset(path: &Path, partners: &[Partner]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for partner in partners {
        writer.serialize(partner)?;
    }
    writer.flush()?;

    let creditworthy = partners.iter().filter(|p| p.creditworthy == 1).count();
    info!(
        path = %path.display(),
        rows = partners.len(),
        creditworthy = creditworthy,
        "Dataset written"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let output_dir = Path::new(args.get(1).map(|s| s.as_str()).unwrap_or("."));
    let seed: Option<u64> = args.get(2).and_then(|s| s.parse().ok());

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut generator = DatasetGenerator::new(seed)?;
    for (file, count) in [
        ("catalyst_train.csv", 10_000),
        ("catalyst_test.csv", 2_000),
        ("user_input.csv", 1),
    ] {
        let partners = generator.generate(count);
        write_dataset(&output_dir.join(file), &partners)?;
    }

    info!("Datasets created successfully!");
    Ok(())
}
