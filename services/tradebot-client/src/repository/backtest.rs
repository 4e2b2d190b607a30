//! Backtest and walk-forward job submission and polling
//!
//! The computation runs server-side; this side validates the request,
//! submits it and polls the job until it reaches a terminal state.

use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::{remote, require};
use crate::api::dto::{BacktestJob, BacktestRequest, WalkForwardJob, WalkForwardRequest};
use crate::api::{RetryPolicy, TradingApi};
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct BacktestRepository {
    api: TradingApi,
    retry: RetryPolicy,
}

impl BacktestRepository {
    pub fn new(api: TradingApi, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub async fn submit_backtest(&self, req: &BacktestRequest) -> Result<BacktestJob> {
        validate_backtest(req)?;
        let job = remote(&self.retry, || self.api.submit_backtest(req)).await?;
        info!("Submitted backtest {} for {}", job.id, req.symbol);
        Ok(job)
    }

    pub async fn backtest(&self, id: &str) -> Result<BacktestJob> {
        require(id, "Backtest id")?;
        remote(&self.retry, || self.api.backtest(id)).await
    }

    /// Poll every `poll` until the job finishes or `timeout` elapses
    pub async fn wait_for_backtest(
        &self,
        id: &str,
        poll: Duration,
        timeout: Duration,
    ) -> Result<BacktestJob> {
        let deadline = Deadline::after(timeout);
        loop {
            let job = self.backtest(id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            debug!("Backtest {} is {:?} ({:?})", id, job.status, job.progress);
            if deadline.passed_after(poll) {
                return Err(ClientError::Timeout);
            }
            sleep(poll).await;
        }
    }

    pub async fn submit_walk_forward(&self, req: &WalkForwardRequest) -> Result<WalkForwardJob> {
        validate_walk_forward(req)?;
        let job = remote(&self.retry, || self.api.submit_walk_forward(req)).await?;
        info!("Submitted walk-forward {} for {}", job.id, req.symbol);
        Ok(job)
    }

    pub async fn walk_forward(&self, id: &str) -> Result<WalkForwardJob> {
        require(id, "Walk-forward id")?;
        remote(&self.retry, || self.api.walk_forward(id)).await
    }

    pub async fn wait_for_walk_forward(
        &self,
        id: &str,
        poll: Duration,
        timeout: Duration,
    ) -> Result<WalkForwardJob> {
        let deadline = Deadline::after(timeout);
        loop {
            let job = self.walk_forward(id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            debug!("Walk-forward {} is {:?} ({:?})", id, job.status, job.progress);
            if deadline.passed_after(poll) {
                return Err(ClientError::Timeout);
            }
            sleep(poll).await;
        }
    }
}

/// Polling deadline; `None` when `timeout` is too large to represent
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Whether sleeping another `poll` would end past the deadline
    fn passed_after(&self, poll: Duration) -> bool {
        match (self.0, Instant::now().checked_add(poll)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(deadline), Some(next)) => next > deadline,
        }
    }
}

fn invalid(message: &str) -> ClientError {
    ClientError::Validation(message.to_string())
}

fn validate_backtest(req: &BacktestRequest) -> Result<()> {
    require(&req.strategy_type, "Strategy type")?;
    require(&req.symbol, "Symbol")?;
    require(&req.timeframe, "Timeframe")?;
    if req.end_date <= req.start_date {
        return Err(invalid("End date must be after start date"));
    }
    if req.initial_capital <= Decimal::ZERO {
        return Err(invalid("Initial capital must be positive"));
    }
    if req.commission_percent.is_some_and(|c| c < Decimal::ZERO) {
        return Err(invalid("Commission cannot be negative"));
    }
    Ok(())
}

fn validate_walk_forward(req: &WalkForwardRequest) -> Result<()> {
    require(&req.strategy_type, "Strategy type")?;
    require(&req.symbol, "Symbol")?;
    require(&req.optimization_metric, "Optimization metric")?;
    if req.end_date <= req.start_date {
        return Err(invalid("End date must be after start date"));
    }
    if req.initial_capital <= Decimal::ZERO {
        return Err(invalid("Initial capital must be positive"));
    }
    if req.in_sample_days == 0 || req.out_of_sample_days == 0 || req.step_days == 0 {
        return Err(invalid("Window sizes must be positive"));
    }

    let span = (req.end_date - req.start_date).num_days();
    let window = i64::from(req.in_sample_days) + i64::from(req.out_of_sample_days);
    if window > span {
        return Err(invalid("Date range is shorter than one in-sample + out-of-sample window"));
    }
    Ok(())
}
