use std::collections::BTreeMap;

use crate::{
    claims::{ClaimName, ClaimNameRef, Claims, ExpectedClaims},
    error,
};

use super::Validator;

/// An ordered set of claim validators, at most one per claim
///
/// Validators run in the order they were first added. Adding a validator
/// for a claim that already has one replaces the earlier validator in
/// place.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorChain {
    /// An empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all validators in the chain
    pub fn set_validators<I>(&mut self, validators: I)
    where
        I: IntoIterator<Item = Box<dyn Validator>>,
    {
        self.validators.clear();
        for v in validators {
            self.insert(v);
        }
    }

    /// Adds a validator, replacing any existing validator for the same claim
    pub fn add_validator<V: Validator + 'static>(&mut self, validator: V) {
        self.insert(Box::new(validator));
    }

    /// Adds a validator, replacing any existing validator for the same claim
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.add_validator(validator);
        self
    }

    fn insert(&mut self, validator: Box<dyn Validator>) {
        if let Some(slot) = self
            .validators
            .iter_mut()
            .find(|v| v.name() == validator.name())
        {
            *slot = validator;
        } else {
            self.validators.push(validator);
        }
    }

    /// Whether a validator is registered for the claim
    #[must_use]
    pub fn has_validator(&self, claim: &ClaimNameRef) -> bool {
        self.validators.iter().any(|v| v.name() == claim)
    }

    /// Gets the validator registered for the claim
    ///
    /// # Errors
    ///
    /// Returns an error if no validator is registered for the claim.
    pub fn get_validator(
        &self,
        claim: &ClaimNameRef,
    ) -> Result<&dyn Validator, error::UnknownValidator> {
        self.validators
            .iter()
            .find(|v| v.name() == claim)
            .map(|v| &**v)
            .ok_or_else(|| error::unknown_validator(claim.to_owned()))
    }

    /// Iterates over the validators in evaluation order
    pub fn validators(&self) -> impl Iterator<Item = &dyn Validator> {
        self.validators.iter().map(|v| &**v)
    }

    /// The number of registered validators
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the chain has no validators
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validates the token claims against the expected values
    ///
    /// Each validator is handled in turn:
    ///
    /// 1. If the claim is required and the token lacks it, the claim fails
    ///    with a "missing required value" message.
    /// 2. If no usable expected value exists, or the token lacks the
    ///    optional claim, the validator is skipped.
    /// 3. Otherwise the validator evaluates the two values, and any failure
    ///    message is recorded under the claim name.
    ///
    /// Every validator runs, so the report carries all failures rather than
    /// only the first.
    ///
    /// # Errors
    ///
    /// Returns an error if a validator is handed a value it cannot compare.
    pub fn validate(
        &self,
        expected: &ExpectedClaims,
        claims: &Claims,
    ) -> Result<ClaimsReport, error::UnsupportedClaimValue> {
        let mut report = ClaimsReport::default();

        for validator in &self.validators {
            let claim = validator.name();

            let actual = match claims.get(claim.as_str()) {
                Some(actual) => actual,
                None if validator.is_required() => {
                    tracing::debug!(%claim, "required claim missing");
                    report.record(
                        claim.to_owned(),
                        format!("Missing required value for claim {}", claim),
                    );
                    continue;
                }
                None => continue,
            };

            let expected = match expected.usable(claim) {
                Some(expected) => expected,
                None => continue,
            };

            if let Some(message) = validator.evaluate(expected, actual)?.into_message() {
                tracing::debug!(%claim, %message, "claim rejected");
                report.record(claim.to_owned(), message);
            }
        }

        Ok(report)
    }
}

/// The outcome of validating a claim set
///
/// Failure messages are keyed by claim name. A report without messages
/// means every claim passed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct ClaimsReport {
    messages: BTreeMap<ClaimName, String>,
}

impl ClaimsReport {
    fn record(&mut self, claim: ClaimName, message: String) {
        self.messages.insert(claim, message);
    }

    /// Whether every claim passed
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.messages.is_empty()
    }

    /// The failure messages, keyed by claim name
    #[must_use]
    pub fn messages(&self) -> &BTreeMap<ClaimName, String> {
        &self.messages
    }

    /// The failure message for a single claim
    #[must_use]
    pub fn message(&self, claim: &ClaimNameRef) -> Option<&str> {
        self.messages.get(claim).map(String::as_str)
    }

    /// Consumes the report, returning the failure messages
    #[must_use]
    pub fn into_messages(self) -> BTreeMap<ClaimName, String> {
        self.messages
    }
}
