//! Versioned partition naming.

/// The three partitions a worker generation owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
  /// Long-lived shell assets and external fonts
  Static,
  /// API and navigation responses, bounded in size
  Dynamic,
  /// The generation's general partition
  General,
}

/// Concrete partition names for one cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
  version: String,
  static_name: String,
  dynamic_name: String,
  general_name: String,
}

impl PartitionSet {
  /// Names are `{prefix}-static-{version}`, `{prefix}-dynamic-{version}`
  /// and `{prefix}-{version}`.
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      version: version.to_string(),
      static_name: format!("{}-static-{}", prefix, version),
      dynamic_name: format!("{}-dynamic-{}", prefix, version),
      general_name: format!("{}-{}", prefix, version),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn name(&self, partition: Partition) -> &str {
    match partition {
      Partition::Static => &self.static_name,
      Partition::Dynamic => &self.dynamic_name,
      Partition::General => &self.general_name,
    }
  }

  /// All current names, in lookup order.
  pub fn current(&self) -> [&str; 3] {
    [&self.static_name, &self.dynamic_name, &self.general_name]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current().contains(&name)
  }

  /// Names from `existing` that do not belong to this generation.
  pub fn stale<'a>(&self, existing: &'a [String]) -> Vec<&'a str> {
    existing
      .iter()
      .map(String::as_str)
      .filter(|name| !self.is_current(name))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_names_are_version_suffixed() {
    let set = PartitionSet::new("snu-connectome", "v1");
    assert_eq!(set.name(Partition::Static), "snu-connectome-static-v1");
    assert_eq!(set.name(Partition::Dynamic), "snu-connectome-dynamic-v1");
    assert_eq!(set.name(Partition::General), "snu-connectome-v1");
  }

  #[test]
  fn test_stale_excludes_only_current_names() {
    let set = PartitionSet::new("snu-connectome", "v2");
    let existing = vec![
      "snu-connectome-static-v1".to_string(),
      "snu-connectome-static-v2".to_string(),
      "snu-connectome-dynamic-v2".to_string(),
      "snu-connectome-v2".to_string(),
      "other".to_string(),
    ];

    assert_eq!(set.stale(&existing), vec!["snu-connectome-static-v1", "other"]);
  }
}
