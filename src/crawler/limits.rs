//! Per-host concurrency ceilings.

use crate::error::ConfigError;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Caps requests in flight for hosts matching a glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRule {
    /// Host glob, `*` matches any run of characters and `?` a single one.
    pub domain_glob: String,

    /// Maximum concurrent requests across all matching hosts.
    pub parallelism: usize,
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            domain_glob: "*".to_string(),
            parallelism: 5,
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    pattern: Regex,
    permits: Arc<Semaphore>,
}

/// Compiled rules with their own semaphores.
///
/// Each crawler owns one `Limits`; a sibling crawler gets a fresh copy so the
/// two run under independent ceilings.
#[derive(Debug)]
pub(crate) struct Limits {
    rules: Vec<LimitRule>,
    compiled: Vec<CompiledRule>,
}

impl Limits {
    pub(crate) fn compile(rules: &[LimitRule]) -> Result<Self, ConfigError> {
        let compiled = rules
            .iter()
            .map(|rule| {
                if rule.parallelism == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "crawl.parallelism".to_string(),
                        message: "must be greater than 0".to_string(),
                    });
                }
                let pattern =
                    glob_to_regex(&rule.domain_glob).map_err(|e| ConfigError::InvalidValue {
                        key: "crawl.domain_glob".to_string(),
                        message: e.to_string(),
                    })?;
                Ok(CompiledRule {
                    pattern,
                    permits: Arc::new(Semaphore::new(rule.parallelism)),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules: rules.to_vec(),
            compiled,
        })
    }

    /// Same rules, new semaphores.
    pub(crate) fn fresh(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            compiled: self
                .compiled
                .iter()
                .zip(&self.rules)
                .map(|(compiled, rule)| CompiledRule {
                    pattern: compiled.pattern.clone(),
                    permits: Arc::new(Semaphore::new(rule.parallelism)),
                })
                .collect(),
        }
    }

    /// Semaphore of the first rule matching `host`. Unmatched hosts are unlimited.
    pub(crate) fn for_host(&self, host: &str) -> Option<Arc<Semaphore>> {
        self.compiled
            .iter()
            .find(|rule| rule.pattern.is_match(host))
            .map(|rule| rule.permits.clone())
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(glob)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^(?i){escaped}$"))
}
