//! JSON operation scripts
//!
//! A script is a JSON array of [`ScriptStep`]s run in order against one
//! harness. Each step yields a [`StepOutcome`]; failed calls are reported
//! in the outcome instead of aborting the run unless `stop_on_error` is set.

use crate::dispatch::{execute, reply_body};
use crate::usb::UsbTest;
use protocol::{DeviceId, Operation, OperationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptStep {
    /// Apply an operation to a device
    Call {
        device: DeviceId,
        operation: Operation,
    },
    /// Schedule hot-unplug of a device
    Disconnect { device: DeviceId },
    /// Let scheduled removals happen
    NextTurn,
    /// Snapshot of the attached devices
    GetDevices,
}

impl ScriptStep {
    fn action(&self) -> &'static str {
        match self {
            ScriptStep::Call { operation, .. } => operation.name(),
            ScriptStep::Disconnect { .. } => "disconnect",
            ScriptStep::NextTurn => "nextTurn",
            ScriptStep::GetDevices => "getDevices",
        }
    }

    fn device(&self) -> Option<DeviceId> {
        match self {
            ScriptStep::Call { device, .. } | ScriptStep::Disconnect { device } => Some(*device),
            ScriptStep::NextTurn | ScriptStep::GetDevices => None,
        }
    }
}

/// Result of one step, printed as a single JSON line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: usize,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl StepOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub fn parse_script(input: &str) -> serde_json::Result<Vec<ScriptStep>> {
    serde_json::from_str(input)
}

/// Run `steps` in order and collect one outcome per executed step
pub async fn run_script(
    harness: &mut UsbTest,
    steps: Vec<ScriptStep>,
    stop_on_error: bool,
) -> Vec<StepOutcome> {
    let total = steps.len();
    let mut outcomes = Vec::with_capacity(total);

    for (step, script_step) in steps.into_iter().enumerate() {
        let action = script_step.action();
        let device = script_step.device();

        let result = run_step(harness, script_step).await;
        let outcome = match result {
            Ok(value) => StepOutcome {
                step,
                action,
                device,
                result: Some(value),
                error: None,
            },
            Err(e) => {
                warn!("Step {} ({}) failed: {}", step, action, e);
                StepOutcome {
                    step,
                    action,
                    device,
                    result: None,
                    error: Some(e),
                }
            }
        };

        let failed = outcome.is_error();
        outcomes.push(outcome);
        if failed && stop_on_error {
            info!("Stopping script after step {} of {}", step, total);
            break;
        }
    }

    outcomes
}

async fn run_step(harness: &mut UsbTest, step: ScriptStep) -> Result<Value, OperationError> {
    match step {
        ScriptStep::Call { device, operation } => {
            let reply = execute(harness, device, operation).await?;
            Ok(json_value(reply_body(&reply)))
        }
        ScriptStep::Disconnect { device } => {
            harness.disconnect(device)?;
            Ok(Value::Null)
        }
        ScriptStep::NextTurn => Ok(json_value(serde_json::to_value(
            harness.next_turn().await,
        ))),
        ScriptStep::GetDevices => Ok(json_value(serde_json::to_value(harness.get_devices()))),
    }
}

fn json_value(value: serde_json::Result<Value>) -> Value {
    value.unwrap_or_else(|e| {
        warn!("Failed to render step result: {}", e);
        Value::Null
    })
}
