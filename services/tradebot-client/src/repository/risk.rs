use rust_decimal::Decimal;

use super::remote;
use crate::api::dto::{RiskConfig, RiskStatus};
use crate::api::{RetryPolicy, TradingApi};
use crate::error::{ClientError, Result};

/// Risk limits and live risk status; never cached
#[derive(Clone)]
pub struct RiskRepository {
    api: TradingApi,
    retry: RetryPolicy,
}

impl RiskRepository {
    pub fn new(api: TradingApi, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub async fn config(&self) -> Result<RiskConfig> {
        remote(&self.retry, || self.api.risk_config()).await
    }

    pub async fn update_config(&self, config: &RiskConfig) -> Result<RiskConfig> {
        validate(config)?;
        remote(&self.retry, || self.api.update_risk_config(config)).await
    }

    pub async fn status(&self) -> Result<RiskStatus> {
        remote(&self.retry, || self.api.risk_status()).await
    }
}

fn validate(config: &RiskConfig) -> Result<()> {
    let hundred = Decimal::from(100);
    let percent = |value: Decimal, field: &str| -> Result<()> {
        if value <= Decimal::ZERO || value > hundred {
            return Err(ClientError::Validation(format!(
                "{} must be between 0 and 100",
                field
            )));
        }
        Ok(())
    };

    percent(config.max_position_size_percent, "Max position size")?;
    percent(config.max_drawdown_percent, "Max drawdown")?;
    if let Some(stop_loss) = config.stop_loss_percent {
        percent(stop_loss, "Stop loss")?;
    }
    if let Some(take_profit) = config.take_profit_percent {
        if take_profit <= Decimal::ZERO {
            return Err(ClientError::Validation("Take profit must be positive".to_string()));
        }
    }
    if config.max_daily_loss <= Decimal::ZERO {
        return Err(ClientError::Validation("Max daily loss must be positive".to_string()));
    }
    if config.max_open_positions == 0 {
        return Err(ClientError::Validation(
            "At least one open position must be allowed".to_string(),
        ));
    }
    Ok(())
}
