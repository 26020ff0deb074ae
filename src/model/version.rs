use std::fmt;

/// Interface version. Equality is by both fields; compatibility (major
/// match, minor-or-newer) is the Arbitrator's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Version {
  pub major: u32,
  pub minor: u32,
}

impl Version {
  pub const fn new(major: u32, minor: u32) -> Self {
    Version { major, minor }
  }

  /// `true` if `self` (the provider's version) satisfies a consumer that
  /// requested `requested`: same major, minor at least as new.
  pub fn is_compatible_with(&self, requested: Version) -> bool {
    self.major == requested.major && self.minor >= requested.minor
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.major, self.minor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compatible_when_major_equal_and_minor_not_older() {
    assert!(Version::new(1, 3).is_compatible_with(Version::new(1, 2)));
    assert!(Version::new(1, 2).is_compatible_with(Version::new(1, 2)));
  }

  #[test]
  fn incompatible_on_major_mismatch_or_older_minor() {
    assert!(!Version::new(2, 0).is_compatible_with(Version::new(1, 0)));
    assert!(!Version::new(1, 1).is_compatible_with(Version::new(1, 2)));
  }
}
