//! Storage bootstrap.
//!
//! Storage types are declared in a [`StorageRegistry`], instantiated once by
//! [`StorageBootstrap::create_instances`], and resolved by the trait they
//! implement through [`StorageBootstrap::resolve`].

mod pool;
mod registration;

pub use pool::StorageBootstrap;
pub use registration::{Constructor, RegistrationBuilder, StorageContext, StorageRegistry};

use std::fmt;

/// How an interface with several implementations is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// More than one implementation is an error.
    #[default]
    Strict,
    /// The earliest registration wins.
    Lenient,
}

impl ResolutionMode {
    /// Parses a mode name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" | "first" => Some(Self::Lenient),
            _ => None,
        }
    }

    /// Returns the mode as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("strict", Some(ResolutionMode::Strict))]
    #[test_case(" Lenient ", Some(ResolutionMode::Lenient))]
    #[test_case("first", Some(ResolutionMode::Lenient))]
    #[test_case("random", None)]
    fn test_parse(input: &str, expected: Option<ResolutionMode>) {
        assert_eq!(ResolutionMode::parse(input), expected);
    }

    #[test]
    fn test_display_round_trips() {
        for mode in [ResolutionMode::Strict, ResolutionMode::Lenient] {
            assert_eq!(ResolutionMode::parse(&mode.to_string()), Some(mode));
        }
    }
}
