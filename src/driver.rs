//! Workload generator for a deployed proxy endpoint.
//!
//! Sends `nreqs` GET requests to the target, either back to back or with
//! Poisson-distributed inter-arrival gaps, and appends one CSV row per
//! response to `<results-path>/<exp-id>`.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::handler::{MessageBody, STATUS_OK};

pub const CSV_HEADER: &str = "id,status,response_time,body,tsbefore,tsafter";

// Back-off after a non-200 response
const ERROR_PAUSE: Duration = Duration::from_millis(10);

#[derive(Parser, Debug, Clone)]
#[command(name = "driver", about = "Drive invocations against a scale-bench endpoint and record latencies")]
pub struct DriverArgs {
    /// Experiment id, also the results file name
    #[arg(long, default_value = "test")]
    pub exp_id: String,

    /// Endpoint URL to invoke
    #[arg(long)]
    pub target: String,

    /// Number of requests to send
    #[arg(long, default_value_t = 10)]
    pub nreqs: u64,

    /// Poisson mean inter-arrival time in milliseconds; 0 sends sequentially
    #[arg(long, default_value_t = 0.0)]
    pub lambda: f64,

    /// Existing directory the results file is written to
    #[arg(long)]
    pub results_path: PathBuf,
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("couldn't read message from body ({body}): {reason}")]
    BadBody { body: String, reason: String },

    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),

    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverArgs {
    pub fn validate(&self) -> DriverResult<()> {
        if self.exp_id.is_empty() {
            return Err(DriverError::InvalidArgs("exp-id must not be empty".to_string()));
        }
        if self.target.is_empty() {
            return Err(DriverError::InvalidArgs("target must not be empty".to_string()));
        }
        if self.nreqs == 0 {
            return Err(DriverError::InvalidArgs("nreqs must be bigger than zero".to_string()));
        }
        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(DriverError::InvalidArgs(format!(
                "lambda must be a non-negative number, got {}",
                self.lambda
            )));
        }
        if !self.results_path.is_dir() {
            return Err(DriverError::InvalidArgs(format!(
                "results path {} must be an existing directory",
                self.results_path.display()
            )));
        }
        Ok(())
    }

    pub fn results_file(&self) -> PathBuf {
        self.results_path.join(&self.exp_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: u64,
    pub status: u16,
    pub response_time_ns: i64,
    pub message: String,
    pub ts_before: i64,
    pub ts_after: i64,
}

impl Sample {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.id, self.status, self.response_time_ns, self.message, self.ts_before, self.ts_after
        )
    }
}

pub fn extract_message(body: &str) -> DriverResult<String> {
    serde_json::from_str::<MessageBody>(body)
        .map(|parsed| parsed.message)
        .map_err(|e| DriverError::BadBody {
            body: body.to_string(),
            reason: e.to_string(),
        })
}

fn epoch_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

// Response time covers the request up to the response headers
pub async fn send_request(client: &reqwest::Client, target: &str, id: u64) -> DriverResult<Sample> {
    let ts_before = epoch_nanos();
    let response = client.get(target).send().await?;
    let ts_after = epoch_nanos();

    let status = response.status().as_u16();
    let body = response.text().await?;
    let message = extract_message(&body)?;

    if status != STATUS_OK {
        tracing::warn!(id, status, "Non-200 response");
        tokio::time::sleep(ERROR_PAUSE).await;
    }

    Ok(Sample {
        id,
        status,
        response_time_ns: ts_after - ts_before,
        message,
        ts_before,
        ts_after,
    })
}

pub async fn run_sequential(client: &reqwest::Client, target: &str, nreqs: u64) -> DriverResult<Vec<Sample>> {
    let mut samples = Vec::with_capacity(nreqs as usize);
    for id in 1..=nreqs {
        samples.push(send_request(client, target, id).await?);
    }
    Ok(samples)
}

/// Issues requests concurrently, sleeping a Poisson(`lambda`) number of
/// milliseconds before each one. Samples come back in completion order.
pub async fn run_poisson<R: Rng>(
    client: &reqwest::Client,
    target: &str,
    nreqs: u64,
    lambda: f64,
    rng: &mut R,
) -> DriverResult<Vec<Sample>> {
    let poisson = Poisson::new(lambda)
        .map_err(|e| DriverError::InvalidArgs(format!("poisson lambda {lambda}: {e}")))?;

    let mut tasks = JoinSet::new();
    for id in 1..=nreqs {
        let gap: f64 = poisson.sample(rng);
        tokio::time::sleep(Duration::from_millis(gap as u64)).await;

        let client = client.clone();
        let target = target.to_string();
        tasks.spawn(async move { send_request(&client, &target, id).await });
    }

    let mut samples = Vec::with_capacity(nreqs as usize);
    while let Some(joined) = tasks.join_next().await {
        samples.push(joined??);
    }
    Ok(samples)
}

pub fn write_results(path: &Path, samples: &[Sample]) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{CSV_HEADER}")?;
    for sample in samples {
        writeln!(writer, "{}", sample.csv_row())?;
    }
    writer.flush()
}

pub async fn run<R: Rng>(args: &DriverArgs, rng: &mut R) -> DriverResult<PathBuf> {
    args.validate()?;

    let client = reqwest::Client::new();
    tracing::info!(target_url = %args.target, nreqs = args.nreqs, lambda = args.lambda, "Running workload");

    let samples = if args.lambda == 0.0 {
        run_sequential(&client, &args.target, args.nreqs).await?
    } else {
        run_poisson(&client, &args.target, args.nreqs, args.lambda, rng).await?
    };

    let path = args.results_file();
    tracing::info!(path = %path.display(), samples = samples.len(), "Saving results");
    write_results(&path, &samples)?;
    Ok(path)
}
