//! Password policy and strength grading

use crate::errors::{Result, VaultError};
use serde::Serialize;

const MIN_LENGTH: usize = 8;
const STRONG_LENGTH: usize = 12;
const MIN_CLASSES: usize = 2;
const STRONG_CLASSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

/// Character classes present in a password
fn class_count(password: &str) -> usize {
    let upper = password.chars().any(|c| c.is_uppercase());
    let lower = password.chars().any(|c| c.is_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    [upper, lower, digit, symbol].iter().filter(|b| **b).count()
}

/// Grade a password without enforcing anything
pub fn strength(password: &str) -> PasswordStrength {
    let length = password.chars().count();
    let classes = class_count(password);

    if length >= STRONG_LENGTH && classes >= STRONG_CLASSES {
        PasswordStrength::Strong
    } else if length >= MIN_LENGTH && classes >= MIN_CLASSES {
        PasswordStrength::Medium
    } else {
        PasswordStrength::Weak
    }
}

/// Reject passwords below the minimum policy
pub fn check_policy(password: &str) -> Result<PasswordStrength> {
    if password.chars().count() < MIN_LENGTH {
        return Err(VaultError::WeakPassword(format!(
            "must be at least {} characters",
            MIN_LENGTH
        )));
    }
    if class_count(password) < MIN_CLASSES {
        return Err(VaultError::WeakPassword(
            "must mix at least two of upper case, lower case, digits and symbols".to_string(),
        ));
    }
    Ok(strength(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy() {
        assert!(matches!(check_policy("short1A"), Err(VaultError::WeakPassword(_))));
        assert!(matches!(check_policy("alllowercase"), Err(VaultError::WeakPassword(_))));
        assert!(matches!(check_policy("        "), Err(VaultError::WeakPassword(_))));
        assert_eq!(check_policy("lowercase1").unwrap(), PasswordStrength::Medium);
        assert_eq!(check_policy("Sup3r$ecret!").unwrap(), PasswordStrength::Strong);
    }

    #[test]
    fn test_strength() {
        assert_eq!(strength("abc"), PasswordStrength::Weak);
        assert_eq!(strength("abcdefgh"), PasswordStrength::Weak);
        assert_eq!(strength("abcdefg1"), PasswordStrength::Medium);
        assert_eq!(strength("abcdefghijk1"), PasswordStrength::Medium);
        assert_eq!(strength("Abcdefghijk1"), PasswordStrength::Strong);
    }
}
