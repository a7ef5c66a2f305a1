use std::collections::BTreeSet;

/// Paths the worker intercepts, fixed for one worker version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheManifest {
  /// Substitution plan views, revalidated against the network first
  pub plan_paths: BTreeSet<String>,
  /// Static resources, served from the cache first
  pub asset_paths: BTreeSet<String>,
  /// Where `/` redirects to
  pub default_plan_path: Option<String>,
}

/// How a request pathname is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
  Root,
  Plan,
  Asset,
  Other,
}

impl CacheManifest {
  pub fn new<P, A>(plan_paths: P, asset_paths: A) -> Self
  where
    P: IntoIterator,
    P::Item: Into<String>,
    A: IntoIterator,
    A::Item: Into<String>,
  {
    Self {
      plan_paths: plan_paths.into_iter().map(Into::into).collect(),
      asset_paths: asset_paths.into_iter().map(Into::into).collect(),
      default_plan_path: None,
    }
  }

  pub fn with_default_plan_path(mut self, path: Option<String>) -> Self {
    // an empty value means "no redirect"
    self.default_plan_path = path.filter(|p| !p.trim().is_empty());
    self
  }

  pub fn classify(&self, pathname: &str) -> PathClass {
    if pathname == "/" {
      PathClass::Root
    } else if self.plan_paths.contains(pathname) {
      PathClass::Plan
    } else if self.asset_paths.contains(pathname) {
      PathClass::Asset
    } else {
      PathClass::Other
    }
  }

  /// Whether entries for this pathname may stay in the cache.
  pub fn contains(&self, pathname: &str) -> bool {
    self.plan_paths.contains(pathname) || self.asset_paths.contains(pathname)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest() -> CacheManifest {
    CacheManifest::new(["/students/", "/teachers/"], ["/assets/style/main.css"])
  }

  #[test]
  fn test_classify() {
    let m = manifest();
    assert_eq!(m.classify("/"), PathClass::Root);
    assert_eq!(m.classify("/teachers/"), PathClass::Plan);
    assert_eq!(m.classify("/assets/style/main.css"), PathClass::Asset);
    assert_eq!(m.classify("/assets/style/other.css"), PathClass::Other);
    // no pattern matching, only exact paths
    assert_eq!(m.classify("/teachers"), PathClass::Other);
  }

  #[test]
  fn test_empty_default_plan_path_is_unset() {
    let m = manifest().with_default_plan_path(Some(String::new()));
    assert_eq!(m.default_plan_path, None);

    let m = manifest().with_default_plan_path(Some("/students/".to_string()));
    assert_eq!(m.default_plan_path.as_deref(), Some("/students/"));
  }

  #[test]
  fn test_contains() {
    let m = manifest();
    assert!(m.contains("/students/"));
    assert!(m.contains("/assets/style/main.css"));
    assert!(!m.contains("/"));
  }
}
