//! Produces the new value for a rotation.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::OsRng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

use super::policy::{Charset, GeneratorParams, RegenerationStrategy, RotationPolicy};
use crate::sources::{SourceRegistry, SourceResolution, TaskError, TaskRequest, TaskRunner};

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const HEX: &[u8] = b"0123456789abcdef";
const BASE64URL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const SYMBOLS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&()*+,-.:;<=>?@[]^_{|}~";

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 4096;

#[derive(Debug, Error)]
pub enum RegenerationError {
    #[error("unsupported regeneration strategy '{kind}': {reason}")]
    Unsupported { kind: String, reason: String },

    #[error("generator length {0} is outside 8..=4096")]
    InvalidLength(usize),

    #[error("no external source named '{system}' is registered (available: {available})")]
    UnknownSystem { system: String, available: String },

    #[error("external source '{system}' returned no value: {message}")]
    Source { system: String, message: String },

    #[error("delegated task failed: {0}")]
    Task(#[from] TaskError),

    #[error("delegated task produced empty output")]
    EmptyTaskOutput,
}

pub struct ValueGenerator {
    sources: SourceRegistry,
    tasks: Arc<dyn TaskRunner>,
    task_timeout: Duration,
}

impl ValueGenerator {
    pub fn new(sources: SourceRegistry, tasks: Arc<dyn TaskRunner>, task_timeout: Duration) -> Self {
        Self {
            sources,
            tasks,
            task_timeout,
        }
    }

    pub async fn generate(
        &self,
        policy: &RotationPolicy,
    ) -> Result<Zeroizing<String>, RegenerationError> {
        match &policy.regeneration_strategy {
            RegenerationStrategy::Internal(params) => generate_internal(params),
            RegenerationStrategy::External(params) => {
                let source = self
                    .sources
                    .get(&params.system)
                    .ok_or_else(|| RegenerationError::UnknownSystem {
                        system: params.system.clone(),
                        available: self.sources.names().join(", "),
                    })?;
                match source.fetch(&params.reference).await {
                    SourceResolution::Resolved(value) => Ok(value),
                    SourceResolution::NotFound(message) | SourceResolution::Failed(message) => {
                        Err(RegenerationError::Source {
                            system: params.system.clone(),
                            message,
                        })
                    }
                }
            }
            RegenerationStrategy::DelegatedTask(params) => {
                let request = TaskRequest {
                    task: params.task.clone(),
                    args: params.args.clone(),
                    context: json!({
                        "event": "rotation.generate",
                        "policyId": policy.policy_id,
                        "project": policy.project,
                        "category": policy.category,
                        "secretName": policy.secret_name,
                    }),
                    timeout: params
                        .timeout_seconds
                        .map(Duration::from_secs)
                        .unwrap_or(self.task_timeout),
                };
                let output = self.tasks.run(request).await?;
                if output.stdout.is_empty() {
                    return Err(RegenerationError::EmptyTaskOutput);
                }
                Ok(output.stdout)
            }
            RegenerationStrategy::Unsupported { kind, reason, .. } => {
                Err(RegenerationError::Unsupported {
                    kind: kind.clone(),
                    reason: reason.clone(),
                })
            }
        }
    }
}

/// Random value from the operating system RNG. `length` counts the random
/// part only; the prefix is prepended.
pub fn generate_internal(params: &GeneratorParams) -> Result<Zeroizing<String>, RegenerationError> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&params.length) {
        return Err(RegenerationError::InvalidLength(params.length));
    }
    let alphabet = match params.charset {
        Charset::Alphanumeric => ALPHANUMERIC,
        Charset::Hex => HEX,
        Charset::Base64url => BASE64URL,
        Charset::Symbols => SYMBOLS,
    };

    let prefix = params.prefix.as_deref().unwrap_or_default();
    let mut value = Zeroizing::new(String::with_capacity(prefix.len() + params.length));
    value.push_str(prefix);

    let pick = Uniform::from(0..alphabet.len());
    let mut rng = OsRng;
    for _ in 0..params.length {
        value.push(char::from(alphabet[pick.sample(&mut rng)]));
    }
    Ok(value)
}
