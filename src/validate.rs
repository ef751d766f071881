/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Input validation: reject package identifiers that could enable command
//! injection (§4.2).

use crate::error::{Error, Result};

/// Maximum byte length of a valid package name.
pub const MAX_NAME_LEN: usize = 255;

fn is_allowed_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'+' | b':' | b'/')
}

/// Validate a single package name against the allow-list (§4.2).
///
/// Valid names contain only letters, digits, `-`, `_`, `.`, `+`, `:`
/// (architecture qualifiers), and `/` (repository-qualified names), with
/// length in `1..=255`. A `..` path segment is rejected even though each of
/// its bytes is individually allowed, since `/`-qualified names are meant
/// for repository prefixes, not filesystem traversal.
pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName(name.to_string()));
    }
    if name.bytes().all(is_allowed_byte) && !name.split('/').any(|segment| segment == "..") {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Validate every element of a list, per [`validate_package_name`].
pub fn validate_package_names<S: AsRef<str>>(names: &[S]) -> Result<()> {
    for name in names {
        validate_package_name(name.as_ref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_legitimate_names() {
        for name in [
            "vim",
            "libssl1.1",
            "gcc-9-base",
            "python3.8",
            "package:amd64",
            "repo/package",
            "g++",
        ] {
            assert!(validate_package_name(name).is_ok(), "expected {name:?} to be accepted");
        }
    }

    #[test]
    fn rejects_attack_corpus() {
        let attacks: Vec<String> = vec![
            "vim; rm -rf /".to_string(),
            "vim|cat".to_string(),
            "vim&&ls".to_string(),
            "vim`whoami`".to_string(),
            "vim$(whoami)".to_string(),
            "vim>out".to_string(),
            "vim name".to_string(),
            "vim\ttab".to_string(),
            "vim\nnewline".to_string(),
            "vim\0null".to_string(),
            "~root".to_string(),
            "vim*".to_string(),
            "../../etc/passwd".to_string(),
            "a".repeat(256),
            "".to_string(),
        ];
        for attack in attacks {
            assert!(
                validate_package_name(&attack).is_err(),
                "expected {attack:?} to be rejected"
            );
        }
    }

    #[test]
    fn bulk_validator_applies_single_rule_to_every_element() {
        assert!(validate_package_names(&["vim", "git"]).is_ok());
        assert!(validate_package_names(&["vim", "vim; rm -rf /"]).is_err());
    }
}
