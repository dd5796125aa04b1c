use serde_json::{json, Value};

use super::HandlerConfig;
use crate::error::HandlerError;

/// SIMPLE: wait the configured delay, then echo the input.
pub(super) async fn run(value: i64, config: &HandlerConfig) -> Result<Value, HandlerError> {
    if !config.simple_delay.is_zero() {
        tokio::time::sleep(config.simple_delay).await;
    }
    Ok(json!(value))
}
