//! POSIX signal name/number table.
//!
//! The control surface accepts signals as numbers or case-insensitive
//! names (`9`, `KILL`, `sigterm` are all valid). CLI tokens are parsed
//! numeric-first; symbolic names pass through unconverted and are only
//! resolved at delivery time.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// A signal given either as a raw number or a symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalSpec {
    Number(i32),
    Name(String),
}

/// Classic POSIX signal numbers (Linux x86-64 numbering).
const SIGNALS: &[(&str, i32)] = &[
    ("HUP", 1),
    ("INT", 2),
    ("QUIT", 3),
    ("ILL", 4),
    ("TRAP", 5),
    ("ABRT", 6),
    ("BUS", 7),
    ("FPE", 8),
    ("KILL", 9),
    ("USR1", 10),
    ("SEGV", 11),
    ("USR2", 12),
    ("PIPE", 13),
    ("ALRM", 14),
    ("TERM", 15),
    ("CHLD", 17),
    ("CONT", 18),
    ("STOP", 19),
    ("TSTP", 20),
    ("TTIN", 21),
    ("TTOU", 22),
    ("URG", 23),
    ("XCPU", 24),
    ("XFSZ", 25),
    ("VTALRM", 26),
    ("PROF", 27),
    ("WINCH", 28),
    ("IO", 29),
    ("SYS", 31),
];

const MAX_SIGNUM: i32 = 31;

impl SignalSpec {
    /// Parse a CLI token, preferring the pure-numeric interpretation.
    ///
    /// `"9"` becomes `Number(9)`; `"SIGTERM"` stays `Name("SIGTERM")`
    /// unchanged. A digit string too large for `i32` is kept as a name
    /// and rejected later by [`SignalSpec::resolve`].
    pub fn parse_token(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = token.parse::<i32>() {
                return Self::Number(n);
            }
        }
        Self::Name(token.to_string())
    }

    /// Resolve to a deliverable signal number.
    ///
    /// Names are matched case-insensitively with an optional `SIG`
    /// prefix. Unknown names and out-of-range numbers fail with
    /// `BadValue`, which callers must keep distinct from "process not
    /// found".
    pub fn resolve(&self) -> Result<i32> {
        match self {
            Self::Number(n) if (1..=MAX_SIGNUM).contains(n) => Ok(*n),
            Self::Number(n) => Err(GatewayError::BadValue(format!("signal number {n}"))),
            Self::Name(name) => {
                let upper = name.to_ascii_uppercase();
                let short = upper.strip_prefix("SIG").unwrap_or(&upper);
                SIGNALS
                    .iter()
                    .find(|(n, _)| *n == short)
                    .map(|&(_, num)| num)
                    .ok_or_else(|| GatewayError::BadValue(format!("signal name {name:?}")))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numeric_token_parses_as_number() {
        assert_eq!(SignalSpec::parse_token("9"), SignalSpec::Number(9));
        assert_eq!(SignalSpec::parse_token("15"), SignalSpec::Number(15));
    }

    #[test]
    fn symbolic_token_passes_through_unchanged() {
        assert_eq!(
            SignalSpec::parse_token("SIGTERM"),
            SignalSpec::Name("SIGTERM".to_string())
        );
        assert_eq!(
            SignalSpec::parse_token("hup"),
            SignalSpec::Name("hup".to_string())
        );
    }

    #[test]
    fn mixed_token_is_a_name() {
        assert_eq!(
            SignalSpec::parse_token("9TERM"),
            SignalSpec::Name("9TERM".to_string())
        );
    }

    #[test]
    fn oversized_digit_token_stays_a_name_and_fails_resolve() {
        let spec = SignalSpec::parse_token("99999999999999999999");
        assert!(matches!(spec, SignalSpec::Name(_)));
        assert!(matches!(spec.resolve(), Err(GatewayError::BadValue(_))));
    }

    #[test]
    fn resolve_names_case_insensitive_with_optional_prefix() {
        for token in ["SIGTERM", "sigterm", "TERM", "term"] {
            assert_eq!(SignalSpec::Name(token.to_string()).resolve().unwrap(), 15);
        }
        assert_eq!(SignalSpec::Name("kill".to_string()).resolve().unwrap(), 9);
        assert_eq!(SignalSpec::Name("SIGHUP".to_string()).resolve().unwrap(), 1);
    }

    #[test]
    fn resolve_number_in_range() {
        assert_eq!(SignalSpec::Number(9).resolve().unwrap(), 9);
    }

    #[test]
    fn resolve_rejects_unknown_and_out_of_range() {
        assert!(matches!(
            SignalSpec::Name("SIGBOGUS".to_string()).resolve(),
            Err(GatewayError::BadValue(_))
        ));
        assert!(matches!(
            SignalSpec::Number(0).resolve(),
            Err(GatewayError::BadValue(_))
        ));
        assert!(matches!(
            SignalSpec::Number(99).resolve(),
            Err(GatewayError::BadValue(_))
        ));
    }

    #[test]
    fn deserializes_from_number_or_string() {
        let n: SignalSpec = serde_json::from_str("9").unwrap();
        assert_eq!(n, SignalSpec::Number(9));
        let s: SignalSpec = serde_json::from_str("\"SIGTERM\"").unwrap();
        assert_eq!(s, SignalSpec::Name("SIGTERM".to_string()));
    }
}
