#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-validate** – Validator capability and chain composition.
//!
//! A validator is a capability with a stable name and a single operation:
//! check one payload against one schema and report either conformance or a
//! [`ValidationError`]. Validators compose into an ordered chain with
//! short-circuit semantics - the first failure becomes the chain's verdict.
//!
//! The crate ships the JSON-Schema (Draft 7) validator; other structural
//! validators implement the same trait and slot into the chain unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use sievegate_types::ValidationError;

mod json_schema;

pub use json_schema::JsonSchemaValidator;

//─────────────────────────────
//  Validator capability
//─────────────────────────────

/// Checks one payload against one schema.
///
/// Implementations must be safe under concurrent `validate` calls; any
/// internal caching (e.g. compiled schema representations) is private to
/// the instance and need not be coherent across instances.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable name of this validator.
    fn name(&self) -> &str;

    /// Validate `payload` against `schema`.
    ///
    /// `Ok(())` means the payload conforms. `Err` carries the failure
    /// detail; validator-internal faults are reported through the same
    /// channel with an engine-level error kind.
    async fn validate(&self, payload: &Value, schema: &Value) -> Result<(), ValidationError>;
}

//─────────────────────────────
//  Remediation capability
//─────────────────────────────

/// Single-shot structural repair hook.
///
/// When enabled, the engine offers a failed payload and its error to the
/// remediator; a returned payload is re-validated by the same validator
/// exactly once. A second failure is terminal - there is no iterative
/// repair.
#[async_trait]
pub trait Remediator: Send + Sync {
    /// Attempt a bounded structural repair. `None` means no repair applies.
    async fn try_repair(&self, payload: &Value, error: &ValidationError) -> Option<Value>;
}

//─────────────────────────────
//  Validator chain
//─────────────────────────────

/// A chain failure: which validator rejected the payload, and why.
///
/// The failing validator is carried so the remediation path can re-run
/// exactly the validator that produced the verdict.
pub struct ChainFailure {
    /// The validator that produced the verdict.
    pub validator: Arc<dyn Validator>,
    /// The failure detail.
    pub error: ValidationError,
}

/// Ordered composition of validators with short-circuit semantics.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorChain {
    /// An empty chain. An empty chain accepts every payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from an ordered validator list.
    pub fn with(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    /// Append a validator to the end of the chain.
    pub fn push(&mut self, validator: Arc<dyn Validator>) {
        debug!(validator = validator.name(), "validator added to chain");
        self.validators.push(validator);
    }

    /// Remove all validators with the given name. Returns whether any
    /// validator was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.validators.len();
        self.validators.retain(|v| v.name() != name);
        before != self.validators.len()
    }

    /// Number of validators in the chain.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run the chain in order. The first failure short-circuits and becomes
    /// the chain's verdict; validators after it are not invoked.
    pub async fn run(&self, payload: &Value, schema: &Value) -> Result<(), ChainFailure> {
        for validator in &self.validators {
            debug!(validator = validator.name(), "running validator");
            if let Err(error) = validator.validate(payload, schema).await {
                return Err(ChainFailure {
                    validator: validator.clone(),
                    error,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sievegate_types::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Validator with a scripted verdict that counts invocations.
    struct Scripted {
        name: &'static str,
        verdict: Option<ErrorKind>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn passing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                verdict: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, kind: ErrorKind) -> Arc<Self> {
            Arc::new(Self {
                name,
                verdict: Some(kind),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Validator for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn validate(&self, _: &Value, _: &Value) -> Result<(), ValidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verdict {
                None => Ok(()),
                Some(kind) => Err(ValidationError::new(kind, "scripted failure")),
            }
        }
    }

    #[tokio::test]
    async fn all_pass_yields_valid() {
        let chain = ValidatorChain::with(vec![Scripted::passing("a"), Scripted::passing("b")]);
        assert!(chain.run(&json!({}), &json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn first_failure_short_circuits() {
        let first = Scripted::passing("first");
        let second = Scripted::failing("second", ErrorKind::BadType);
        let third = Scripted::passing("third");
        let chain = ValidatorChain::with(vec![first.clone(), second.clone(), third.clone()]);

        let failure = chain.run(&json!({}), &json!({})).await.unwrap_err();
        assert_eq!(failure.error.kind, ErrorKind::BadType);
        assert_eq!(failure.validator.name(), "second");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert_eq!(third.calls(), 0);
    }

    #[tokio::test]
    async fn empty_chain_accepts_everything() {
        let chain = ValidatorChain::new();
        assert!(chain.run(&json!({"anything": true}), &json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn remove_drops_validators_by_name() {
        let mut chain = ValidatorChain::with(vec![
            Scripted::failing("doomed", ErrorKind::SchemaMismatch),
            Scripted::passing("kept"),
        ]);
        assert!(chain.remove("doomed"));
        assert!(!chain.remove("doomed"));
        assert_eq!(chain.len(), 1);
        assert!(chain.run(&json!({}), &json!({})).await.is_ok());
    }
}
