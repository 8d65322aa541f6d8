use crate::errors::{WalletError, WalletResult};
use regex::Regex;

/// Human-readable part of every Mica address.
pub const MICA_BECH32_HRP: &str = "mica";

/// Length in bytes of the identity key an address encodes.
pub const ADDRESS_PAYLOAD_LEN: usize = 32;

/// Pure syntactic and checksum validation of a candidate address.
///
/// Never performs I/O and never emits an event; identical input always
/// yields identical output.
pub fn is_address_well_formed(candidate: &str) -> bool {
    let Ok((hrp, data)) = bech32::decode(candidate) else {
        return false;
    };
    let Ok(expected) = bech32::Hrp::parse(MICA_BECH32_HRP) else {
        return false;
    };
    hrp == expected && data.len() == ADDRESS_PAYLOAD_LEN
}

/// Input validation utilities for caller-supplied strings.
pub struct InputValidator {
    label_pattern: Regex,
    // Blacklisted patterns for security
    malicious_patterns: Vec<Regex>,
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        let label_pattern = Regex::new(r"^[a-zA-Z0-9\s\-_]*$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid label regex: {}", e)))?;

        // Common malicious patterns to block
        let malicious_patterns = vec![
            Regex::new(r"<script").unwrap(),
            Regex::new(r"javascript:").unwrap(),
            Regex::new(r"data:text/html").unwrap(),
            Regex::new(r"vbscript:").unwrap(),
            Regex::new(r"onload=").unwrap(),
            Regex::new(r"onerror=").unwrap(),
        ];

        Ok(InputValidator {
            label_pattern,
            malicious_patterns,
        })
    }

    /// Validate an address label or category.
    pub fn validate_label(&self, label: &str) -> WalletResult<()> {
        self.check_basic_security(label)?;

        if label.len() > 50 {
            return Err(WalletError::ValidationError("Label too long".to_string()));
        }

        if !self.label_pattern.is_match(label) {
            return Err(WalletError::ValidationError(
                "Label contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a transaction comment.
    pub fn validate_comment(&self, comment: &str) -> WalletResult<()> {
        self.check_basic_security(comment)
    }

    /// Validate a wallet password candidate.
    pub fn validate_password(&self, password: &str) -> WalletResult<()> {
        if password.is_empty() {
            return Err(WalletError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        if password.len() > 256 {
            return Err(WalletError::ValidationError(
                "Password too long".to_string(),
            ));
        }

        Ok(())
    }

    /// Check for basic security issues in any input
    fn check_basic_security(&self, input: &str) -> WalletResult<()> {
        if input.len() > 1000 {
            return Err(WalletError::ValidationError("Input too long".to_string()));
        }

        for pattern in &self.malicious_patterns {
            if pattern.is_match(&input.to_lowercase()) {
                return Err(WalletError::ValidationError(
                    "Input contains potentially malicious content".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new().expect("Failed to create InputValidator")
    }
}
