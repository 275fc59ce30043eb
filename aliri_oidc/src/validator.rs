//! Claim validators
//!
//! A [`Validator`] compares the value a token carries for a single claim
//! against the value a verification attempt expects. Validators are
//! stateless. The outcome of an evaluation is returned as a [`Verdict`],
//! which carries the failure message when the claim is invalid.
//!
//! Validators are grouped into a [`ValidatorChain`], which decides which
//! validators to run for a given token.

use std::fmt;

use crate::{
    claims::{ClaimName, ClaimNameRef, ClaimValue},
    error,
};

mod chain;

pub use chain::{ClaimsReport, ValidatorChain};

/// A rule applied to a single claim
pub trait Validator: fmt::Debug + Send + Sync {
    /// The claim governed by this validator
    fn name(&self) -> &ClaimNameRef;

    /// Whether a token lacking the claim must be rejected
    fn is_required(&self) -> bool;

    /// Compares the actual value of the claim against the expected value
    ///
    /// # Errors
    ///
    /// Returns an error if either value is of a kind this validator cannot
    /// compare. A value that merely fails the comparison is reported through
    /// the returned [`Verdict`] instead.
    fn evaluate(
        &self,
        expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue>;
}

impl<V: Validator + ?Sized> Validator for Box<V> {
    fn name(&self) -> &ClaimNameRef {
        (**self).name()
    }

    fn is_required(&self) -> bool {
        (**self).is_required()
    }

    fn evaluate(
        &self,
        expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue> {
        (**self).evaluate(expected, actual)
    }
}

/// The outcome of evaluating a single claim
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Verdict {
    message: Option<String>,
}

impl Verdict {
    /// The claim is valid
    pub const fn valid() -> Self {
        Self { message: None }
    }

    /// The claim is invalid for the given reason
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Whether the claim passed
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.message.is_none()
    }

    /// The reason the claim failed, if it did
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Consumes the verdict, returning the failure message
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
    }
}

/// The claim name and requiredness shared by every validator
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClaimRule {
    name: ClaimName,
    required: bool,
}

impl ClaimRule {
    /// A rule for the given claim
    pub const fn new(name: ClaimName, required: bool) -> Self {
        Self { name, required }
    }

    /// The governed claim
    #[must_use]
    pub fn name(&self) -> &ClaimNameRef {
        &self.name
    }

    /// Whether the claim must be present
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// An error for a value the named validator cannot compare
    pub fn unsupported(
        &self,
        validator: &'static str,
        value: &ClaimValue,
    ) -> error::UnsupportedClaimValue {
        error::unsupported_claim_value(validator, self.name.clone(), value.kind())
    }
}

macro_rules! claim_validator {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $ty {
            rule: ClaimRule,
        }

        impl $ty {
            /// Constructs a validator for the given claim
            pub const fn new(name: ClaimName, required: bool) -> Self {
                Self {
                    rule: ClaimRule::new(name, required),
                }
            }

            /// A validator for a claim that must be present
            pub const fn required(name: ClaimName) -> Self {
                Self::new(name, true)
            }

            /// A validator for a claim that may be absent
            pub const fn optional(name: ClaimName) -> Self {
                Self::new(name, false)
            }
        }
    };
}

claim_validator! {
    /// Requires the claim to be strictly equal to the expected value
    ///
    /// Only `null`, booleans, integers, strings, and timestamps can be
    /// compared. Values of different kinds are never equal.
    EqualsTo
}

claim_validator! {
    /// Requires the claim to equal the expected value, or, if the claim is
    /// a list, to contain it
    EqualsToOrContains
}

claim_validator! {
    /// Requires the claim to be at or after the expected value
    ///
    /// A `null` on either side fails the comparison.
    GreaterOrEqualsTo
}

claim_validator! {
    /// Requires the claim to be at or before the expected value
    ///
    /// A `null` on either side fails the comparison.
    LesserOrEqualsTo
}

claim_validator! {
    /// Requires the claim to be present with a non-empty value
    ///
    /// The expected value is ignored.
    NotEmpty
}

fn is_scalar(value: &ClaimValue) -> bool {
    matches!(
        value,
        ClaimValue::Null | ClaimValue::Boolean(_) | ClaimValue::Integer(_) | ClaimValue::String(_)
    )
}

fn not_equal(expected: &ClaimValue, actual: &ClaimValue) -> Verdict {
    Verdict::invalid(format!(
        "{} is invalid as it does not equal expected {}",
        actual, expected
    ))
}

impl Validator for EqualsTo {
    fn name(&self) -> &ClaimNameRef {
        self.rule.name()
    }

    fn is_required(&self) -> bool {
        self.rule.is_required()
    }

    fn evaluate(
        &self,
        expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue> {
        let expected = expected.normalized();
        let actual = actual.normalized();

        for value in [&*expected, &*actual] {
            if !is_scalar(value) {
                return Err(self.rule.unsupported("EqualsTo", value));
            }
        }

        if expected == actual {
            Ok(Verdict::valid())
        } else {
            Ok(not_equal(&expected, &actual))
        }
    }
}

impl Validator for EqualsToOrContains {
    fn name(&self) -> &ClaimNameRef {
        self.rule.name()
    }

    fn is_required(&self) -> bool {
        self.rule.is_required()
    }

    fn evaluate(
        &self,
        expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue> {
        let expected = expected.normalized();
        let actual = actual.normalized();

        if !is_scalar(&expected) {
            return Err(self.rule.unsupported("EqualsToOrContains", &expected));
        }

        match &*actual {
            ClaimValue::StringList(items) => {
                let found = match &*expected {
                    ClaimValue::String(e) => items.iter().any(|i| i == e),
                    _ => false,
                };

                if found {
                    Ok(Verdict::valid())
                } else {
                    Ok(Verdict::invalid(format!(
                        "The value is invalid as the given array does not contain expected {}",
                        expected
                    )))
                }
            }
            a if is_scalar(a) => {
                if expected == actual {
                    Ok(Verdict::valid())
                } else {
                    Ok(not_equal(&expected, &actual))
                }
            }
            a => Err(self.rule.unsupported("EqualsToOrContains", a)),
        }
    }
}

fn integer_or_null(
    rule: &ClaimRule,
    validator: &'static str,
    value: &ClaimValue,
) -> Result<Option<i64>, error::UnsupportedClaimValue> {
    match *value.normalized() {
        ClaimValue::Integer(i) => Ok(Some(i)),
        ClaimValue::Null => Ok(None),
        ref other => Err(rule.unsupported(validator, other)),
    }
}

impl Validator for GreaterOrEqualsTo {
    fn name(&self) -> &ClaimNameRef {
        self.rule.name()
    }

    fn is_required(&self) -> bool {
        self.rule.is_required()
    }

    fn evaluate(
        &self,
        expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue> {
        let e = integer_or_null(&self.rule, "GreaterOrEqualsTo", expected)?;
        let a = integer_or_null(&self.rule, "GreaterOrEqualsTo", actual)?;

        match (e, a) {
            (Some(e), Some(a)) if a >= e => Ok(Verdict::valid()),
            _ => Ok(Verdict::invalid(format!(
                "{} is invalid as it is not greater than {}",
                actual.normalized(),
                expected.normalized()
            ))),
        }
    }
}

impl Validator for LesserOrEqualsTo {
    fn name(&self) -> &ClaimNameRef {
        self.rule.name()
    }

    fn is_required(&self) -> bool {
        self.rule.is_required()
    }

    fn evaluate(
        &self,
        expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue> {
        let e = integer_or_null(&self.rule, "LesserOrEqualsTo", expected)?;
        let a = integer_or_null(&self.rule, "LesserOrEqualsTo", actual)?;

        match (e, a) {
            (Some(e), Some(a)) if a <= e => Ok(Verdict::valid()),
            _ => Ok(Verdict::invalid(format!(
                "{} is invalid as it is not less than {}",
                actual.normalized(),
                expected.normalized()
            ))),
        }
    }
}

impl Validator for NotEmpty {
    fn name(&self) -> &ClaimNameRef {
        self.rule.name()
    }

    fn is_required(&self) -> bool {
        self.rule.is_required()
    }

    fn evaluate(
        &self,
        _expected: &ClaimValue,
        actual: &ClaimValue,
    ) -> Result<Verdict, error::UnsupportedClaimValue> {
        if actual.is_empty() {
            Ok(Verdict::invalid(format!(
                "{} is required and cannot be empty",
                self.rule.name()
            )))
        } else {
            Ok(Verdict::valid())
        }
    }
}

#[cfg(test)]
#[allow(trivial_casts)]
mod tests {
    use aliri_clock::UnixTime;
    use color_eyre::Result;
    use serde_json::json;

    use super::*;

    fn claim(name: &'static str) -> ClaimName {
        ClaimName::from_static(name)
    }

    fn strs(items: &[&str]) -> ClaimValue {
        ClaimValue::StringList(items.iter().map(|&s| s.to_owned()).collect())
    }

    #[test]
    fn equals_to_is_strict() -> Result<()> {
        let v = EqualsTo::required(claim("iss"));

        assert!(v.evaluate(&"x".into(), &"x".into())?.is_valid());
        assert!(v.evaluate(&"".into(), &"".into())?.is_valid());
        assert!(v.evaluate(&ClaimValue::Null, &ClaimValue::Null)?.is_valid());
        assert!(v.evaluate(&ClaimValue::Integer(123), &ClaimValue::Integer(123))?.is_valid());
        assert!(v.evaluate(&false.into(), &false.into())?.is_valid());

        assert!(!v.evaluate(&ClaimValue::Null, &"".into())?.is_valid());
        assert!(!v.evaluate(&ClaimValue::Null, &false.into())?.is_valid());
        assert!(!v.evaluate(&ClaimValue::Null, &ClaimValue::Integer(0))?.is_valid());
        assert!(!v.evaluate(&"123".into(), &ClaimValue::Integer(123))?.is_valid());
        assert!(!v.evaluate(&true.into(), &"true".into())?.is_valid());

        Ok(())
    }

    #[test]
    fn equals_to_reports_both_values() -> Result<()> {
        let verdict = EqualsTo::required(claim("iss")).evaluate(&"x".into(), &"y".into())?;

        assert_eq!(
            verdict.message(),
            Some("y is invalid as it does not equal expected x")
        );

        Ok(())
    }

    #[test]
    fn equals_to_compares_timestamps_as_integers() -> Result<()> {
        let v = EqualsTo::optional(claim("auth_time"));

        let verdict = v.evaluate(&ClaimValue::Integer(1636070000), &UnixTime(1636070000).into())?;
        assert!(verdict.is_valid());

        Ok(())
    }

    #[test]
    fn equals_to_rejects_non_scalars() {
        let v = EqualsTo::required(claim("aud"));

        let err = v.evaluate(&"x".into(), &strs(&["x"])).unwrap_err();
        assert_eq!(err.kind(), "string list");

        let err = v
            .evaluate(&ClaimValue::Json(json!({ "field": 1 })), &"".into())
            .unwrap_err();
        assert_eq!(err.kind(), "JSON");
    }

    #[test]
    fn equals_to_or_contains_searches_lists() -> Result<()> {
        let v = EqualsToOrContains::required(claim("aud"));

        assert!(v
            .evaluate(&"some string".into(), &strs(&["other string", "some string"]))?
            .is_valid());
        assert!(v.evaluate(&"x".into(), &"x".into())?.is_valid());

        let verdict = v.evaluate(
            &"some string".into(),
            &strs(&["other string", "some string 2"]),
        )?;
        assert_eq!(
            verdict.message(),
            Some("The value is invalid as the given array does not contain expected some string")
        );

        assert!(!v.evaluate(&true.into(), &strs(&["true"]))?.is_valid());
        assert!(!v.evaluate(&ClaimValue::Integer(1), &strs(&["1"]))?.is_valid());

        Ok(())
    }

    #[test]
    fn equals_to_or_contains_falls_back_to_equality() -> Result<()> {
        let v = EqualsToOrContains::required(claim("aud"));

        let verdict = v.evaluate(&ClaimValue::Null, &"not empty".into())?;
        assert_eq!(
            verdict.message(),
            Some("not empty is invalid as it does not equal expected null")
        );

        assert!(v.evaluate(&strs(&["x"]), &strs(&["x"])).is_err());

        Ok(())
    }

    #[test]
    fn greater_or_equals_to_compares_integers() -> Result<()> {
        let v = GreaterOrEqualsTo::required(claim("exp"));

        assert!(v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Integer(5))?.is_valid());
        assert!(v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Integer(6))?.is_valid());
        assert!(v
            .evaluate(&UnixTime(100).into(), &UnixTime(101).into())?
            .is_valid());

        let verdict = v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Integer(4))?;
        assert_eq!(verdict.message(), Some("4 is invalid as it is not greater than 5"));

        Ok(())
    }

    #[test]
    fn lesser_or_equals_to_compares_integers() -> Result<()> {
        let v = LesserOrEqualsTo::optional(claim("nbf"));

        assert!(v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Integer(5))?.is_valid());
        assert!(v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Integer(-3))?.is_valid());

        let verdict = v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Integer(6))?;
        assert_eq!(verdict.message(), Some("6 is invalid as it is not less than 5"));

        Ok(())
    }

    #[test]
    fn range_validators_fail_on_null_in_either_direction() -> Result<()> {
        let ge = GreaterOrEqualsTo::required(claim("exp"));
        let le = LesserOrEqualsTo::required(claim("nbf"));

        for v in [&ge as &dyn Validator, &le] {
            assert!(!v.evaluate(&ClaimValue::Null, &ClaimValue::Integer(5))?.is_valid());
            assert!(!v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Null)?.is_valid());
            assert!(!v
                .evaluate(&ClaimValue::Null, &ClaimValue::Null)?
                .is_valid());
        }

        let verdict = ge.evaluate(&ClaimValue::Integer(5), &ClaimValue::Null)?;
        assert_eq!(
            verdict.message(),
            Some("null is invalid as it is not greater than 5")
        );

        Ok(())
    }

    #[test]
    fn range_validators_reject_non_integers() {
        let v = GreaterOrEqualsTo::required(claim("exp"));

        assert!(v.evaluate(&"5".into(), &ClaimValue::Integer(5)).is_err());
        assert!(v.evaluate(&ClaimValue::Integer(5), &ClaimValue::Json(json!(5.5))).is_err());
        assert!(v.evaluate(&ClaimValue::Integer(5), &true.into()).is_err());
    }

    #[test]
    fn not_empty_ignores_expected_value() -> Result<()> {
        let v = NotEmpty::required(claim("sub"));

        assert!(v.evaluate(&ClaimValue::Null, &"alice".into())?.is_valid());
        assert!(v.evaluate(&ClaimValue::Null, &"0".into())?.is_valid());
        assert!(v
            .evaluate(&ClaimValue::Null, &ClaimValue::Json(json!({ "a": 1 })))?
            .is_valid());

        for empty in [
            ClaimValue::Null,
            ClaimValue::from(""),
            ClaimValue::Integer(0),
            ClaimValue::from(false),
            strs(&[]),
        ] {
            let verdict = v.evaluate(&"ignored".into(), &empty)?;
            assert_eq!(verdict.message(), Some("sub is required and cannot be empty"));
        }

        Ok(())
    }

    #[test]
    fn validators_expose_their_rule() {
        let v = NotEmpty::new(claim("iat"), true);
        assert_eq!(v.name().as_str(), "iat");
        assert!(v.is_required());

        let v = EqualsTo::optional(claim("nonce"));
        assert_eq!(v.name().as_str(), "nonce");
        assert!(!v.is_required());
    }
}
