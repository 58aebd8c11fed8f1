use std::fmt;
use std::str::FromStr;

use super::IdError;

/// A 64-bit element, model or animation id.
///
/// Ids are exchanged as lowercase hex strings with a `0x` prefix, e.g. `0x1c`.
/// Zero is the invalid id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id64(pub u64);

impl Id64 {
    pub const INVALID: Id64 = Id64(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Id64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for Id64 {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| IdError::InvalidId64(s.to_string()))?;
        u64::from_str_radix(hex, 16)
            .map(Id64)
            .map_err(|_| IdError::InvalidId64(s.to_string()))
    }
}

impl From<u64> for Id64 {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_lowercase_hex() {
        assert_eq!(Id64(0x1c).to_string(), "0x1c");
        assert_eq!(Id64(0xABC).to_string(), "0xabc");
    }

    #[test]
    fn test_parse() {
        assert_eq!("0x1c".parse::<Id64>().unwrap(), Id64(0x1c));
        assert_eq!("0XFF".parse::<Id64>().unwrap(), Id64(0xff));
        assert!("1c".parse::<Id64>().is_err());
        assert!("0xzz".parse::<Id64>().is_err());
    }

    #[test]
    fn test_invalid() {
        assert!(!Id64::INVALID.is_valid());
        assert!(Id64(1).is_valid());
    }
}
