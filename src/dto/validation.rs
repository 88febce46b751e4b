//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum length of a team abbreviation shown on compact scoreboards.
pub const MAX_ABBR_LEN: usize = 3;

/// Validates that a team abbreviation is at most three alphanumeric characters.
///
/// # Examples
///
/// ```ignore
/// validate_team_abbr("FCB") // Ok
/// validate_team_abbr("")    // Ok - not displayed
/// validate_team_abbr("FCBA") // Err - too long
/// validate_team_abbr("F-B") // Err - punctuation
/// ```
pub fn validate_team_abbr(abbr: &str) -> Result<(), ValidationError> {
    let len = abbr.chars().count();
    if len > MAX_ABBR_LEN {
        let mut err = ValidationError::new("team_abbr_length");
        err.message = Some(
            format!("Team abbreviation must be at most {MAX_ABBR_LEN} characters (got {len})")
                .into(),
        );
        return Err(err);
    }

    if !abbr.chars().all(char::is_alphanumeric) {
        let mut err = ValidationError::new("team_abbr_format");
        err.message = Some("Team abbreviation must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_short_alphanumeric_abbreviations() {
        assert!(validate_team_abbr("FCB").is_ok());
        assert!(validate_team_abbr("B04").is_ok());
        assert!(validate_team_abbr("").is_ok());
    }

    #[test]
    fn rejects_long_or_punctuated_abbreviations() {
        assert!(validate_team_abbr("FCBA").is_err());
        assert!(validate_team_abbr("F-B").is_err());
        assert!(validate_team_abbr("F B").is_err());
    }
}
