//! Numeric `MAJOR.MINOR.PATCH` script versions.
//!
//! Ordering compares segment by segment as integers, so `1.10.0 > 1.9.0`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version {
  pub major: u64,
  pub minor: u64,
  pub patch: u64,
}

impl Version {
  pub const fn new(major: u64, minor: u64, patch: u64) -> Self { Self { major, minor, patch } }
}

impl FromStr for Version {
  type Err = Error;

  /// Accepts exactly three dot-separated runs of ASCII digits.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::InvalidVersion(s.to_owned());
    let segment = |part: Option<&str>| -> Result<u64, Error> {
      let part = part.ok_or_else(invalid)?;
      if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
      }
      part.parse().map_err(|_| invalid())
    };

    let mut parts = s.split('.');
    let version = Self {
      major: segment(parts.next())?,
      minor: segment(parts.next())?,
      patch: segment(parts.next())?,
    };
    if parts.next().is_some() {
      return Err(invalid());
    }
    Ok(version)
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numeric_segment_ordering() {
    let a: Version = "1.9.0".parse().unwrap();
    let b: Version = "1.10.0".parse().unwrap();
    assert!(b > a);
    assert_eq!("0.0.7".parse::<Version>().unwrap(), Version::new(0, 0, 7));
  }

  #[test]
  fn rejects_malformed() {
    for bad in ["", "1", "1.2", "1.2.3.4", "1.2.x", "v1.2.3", "1..3", "-1.2.3", "1.2.3 "] {
      assert!(bad.parse::<Version>().is_err(), "{bad:?} accepted");
    }
  }
}
