//! `env` source: the reference names a process environment variable.

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::types::{ExternalValueSource, SourceResolution};

#[derive(Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExternalValueSource for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    async fn fetch(&self, reference: &str) -> SourceResolution {
        match std::env::var(reference) {
            Ok(value) if !value.is_empty() => SourceResolution::Resolved(Zeroizing::new(value)),
            Ok(_) => SourceResolution::NotFound(format!(
                "environment variable '{reference}' is set but empty"
            )),
            Err(_) => SourceResolution::NotFound(format!(
                "environment variable '{reference}' is not set"
            )),
        }
    }
}
