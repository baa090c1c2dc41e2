//! Pagination parameters shared by list endpoints

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Default page size when `take` is absent
pub const DEFAULT_TAKE: u64 = 10;

/// Upper bound applied to `take`
pub const MAX_ITEMS_PER_PAGE: u64 = 50;

/// Validated `skip` / `take` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: u64,
    pub take: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            take: DEFAULT_TAKE,
        }
    }
}

impl Pagination {
    /// Parse raw `skip` / `take` query values.
    ///
    /// Missing or empty values fall back to the defaults; `take` is capped at
    /// [`MAX_ITEMS_PER_PAGE`].
    pub fn parse(skip: Option<&str>, take: Option<&str>) -> Result<Self> {
        let skip = parse_count("skip", skip)?.unwrap_or(0);
        let take = parse_count("take", take)?
            .unwrap_or(DEFAULT_TAKE)
            .min(MAX_ITEMS_PER_PAGE);
        Ok(Self { skip, take })
    }
}

fn parse_count(param: &str, raw: Option<&str>) -> Result<Option<u64>> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    // Leading integer prefix, so "1.5" reads as 1 and "10px" as 10
    let digits_end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(raw.len(), |(i, _)| i);
    let value: i64 = raw[..digits_end]
        .parse()
        .map_err(|_| ValidationError::NotAnInteger {
            param: param.to_string(),
        })?;

    if value < 0 {
        return Err(ValidationError::Negative {
            param: param.to_string(),
        });
    }

    Ok(Some(value as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_absent() {
        assert_eq!(Pagination::parse(None, None).unwrap(), Pagination::default());
        assert_eq!(
            Pagination::parse(Some(""), Some("")).unwrap(),
            Pagination { skip: 0, take: 10 }
        );
    }

    #[test]
    fn test_take_is_capped() {
        let page = Pagination::parse(Some("5"), Some("500")).unwrap();
        assert_eq!(page, Pagination { skip: 5, take: MAX_ITEMS_PER_PAGE });
    }

    #[test]
    fn test_rejects_garbage_and_negatives() {
        let err = Pagination::parse(Some("abc"), None).unwrap_err();
        assert_eq!(err, ValidationError::NotAnInteger { param: "skip".into() });

        let err = Pagination::parse(None, Some("-1")).unwrap_err();
        assert_eq!(err.param(), "take");
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_reads_leading_integer_prefix() {
        let page = Pagination::parse(Some("1.5"), Some("20px")).unwrap();
        assert_eq!(page, Pagination { skip: 1, take: 20 });

        let err = Pagination::parse(Some(".5"), None).unwrap_err();
        assert_eq!(err, ValidationError::NotAnInteger { param: "skip".into() });
        assert!(Pagination::parse(None, Some("-")).is_err());
    }
}
