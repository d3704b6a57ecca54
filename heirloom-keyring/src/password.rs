//! Password strength validation.
//!
//! Pure and deterministic. Rejection reasons are enumerated variants so
//! the caller can render them without the password itself ever being
//! echoed back.

use serde::{Deserialize, Serialize};

/// Reasons a password was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PasswordIssue {
    TooShort { minimum: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSymbol,
    CommonPassword,
}

/// Passwords that appear in public breach lists; compared case-insensitively.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty",
    "qwerty123",
    "qwertyuiop",
    "letmein",
    "welcome",
    "welcome1",
    "iloveyou",
    "admin",
    "administrator",
    "abc123",
    "monkey",
    "dragon",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "superman",
    "trustno1",
    "master",
    "shadow",
    "michael",
    "jennifer",
];

/// Password strength policy.
#[derive(Clone, Debug)]
pub struct PasswordPolicy {
    pub minimum_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { minimum_length: 12 }
    }
}

impl PasswordPolicy {
    /// Validates a password, returning every issue found.
    pub fn validate(&self, password: &str) -> Result<(), Vec<PasswordIssue>> {
        let mut issues = Vec::new();

        if password.chars().count() < self.minimum_length {
            issues.push(PasswordIssue::TooShort {
                minimum: self.minimum_length,
            });
        }
        if !password.chars().any(|c| c.is_uppercase()) {
            issues.push(PasswordIssue::MissingUppercase);
        }
        if !password.chars().any(|c| c.is_lowercase()) {
            issues.push(PasswordIssue::MissingLowercase);
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            issues.push(PasswordIssue::MissingDigit);
        }
        if !password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            issues.push(PasswordIssue::MissingSymbol);
        }

        let lowered = password.to_lowercase();
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            issues.push(PasswordIssue::CommonPassword);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("Str0ng!Passw0rd123").is_ok());
    }

    #[test]
    fn short_password_reports_minimum() {
        let policy = PasswordPolicy::default();
        let issues = policy.validate("Ab1!").unwrap_err();
        assert!(issues.contains(&PasswordIssue::TooShort { minimum: 12 }));
    }

    #[test]
    fn each_missing_class_is_reported() {
        let policy = PasswordPolicy::default();

        let issues = policy.validate("lowercase-only-1!").unwrap_err();
        assert_eq!(issues, vec![PasswordIssue::MissingUppercase]);

        let issues = policy.validate("UPPERCASE-ONLY-1!").unwrap_err();
        assert_eq!(issues, vec![PasswordIssue::MissingLowercase]);

        let issues = policy.validate("No-Digits-Here!").unwrap_err();
        assert_eq!(issues, vec![PasswordIssue::MissingDigit]);

        let issues = policy.validate("NoSymbolsHere123").unwrap_err();
        assert_eq!(issues, vec![PasswordIssue::MissingSymbol]);
    }

    #[test]
    fn common_password_rejected_case_insensitively() {
        let policy = PasswordPolicy { minimum_length: 6 };
        let issues = policy.validate("QwErTy123").unwrap_err();
        assert!(issues.contains(&PasswordIssue::CommonPassword));
    }

    #[test]
    fn all_issues_are_accumulated() {
        let policy = PasswordPolicy::default();
        let issues = policy.validate("short").unwrap_err();
        assert!(issues.len() >= 3);
    }

    #[test]
    fn issues_serialize_without_the_password() {
        let json =
            serde_json::to_string(&vec![PasswordIssue::TooShort { minimum: 12 }]).unwrap();
        assert_eq!(json, r#"[{"reason":"too_short","minimum":12}]"#);
    }
}
