/// JAR name prefixes treated as first-party when the services document does
/// not configure its own list. Everything else is third-party and skipped by
/// the decompiler by default.
pub const DEFAULT_INTERNAL_PREFIXES: &[&str] = &["app-", "biz-", "core-", "common-", "svc-"];

/// Which kind of artifact a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Jar,
    Class,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Jar => "jar",
            ArtifactKind::Class => "class",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jar" => Some(ArtifactKind::Jar),
            "class" => Some(ArtifactKind::Class),
            _ => None,
        }
    }
}

/// Classify a JAR by name prefix. Internal JARs get decompiled; third-party
/// JARs are still listed and versioned.
pub fn is_third_party(jar_name: &str, internal_prefixes: &[String]) -> bool {
    !internal_prefixes.iter().any(|p| jar_name.starts_with(p.as_str()))
}

/// The effective prefix list: configured, or the built-in default.
pub fn internal_prefixes(configured: Option<&Vec<String>>) -> Vec<String> {
    match configured {
        Some(list) => list.clone(),
        None => DEFAULT_INTERNAL_PREFIXES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Derive a fully-qualified class name from a `.class` path below the
/// service's `classes_path`.
///
/// `com/x/Outer$Inner.class` becomes `com.x.Outer$Inner`: separators flip to
/// dots, the suffix is stripped, inner-class `$` markers stay verbatim.
pub fn class_name_from_class_path(rel_path: &str) -> Option<String> {
    let stripped = rel_path.strip_suffix(".class")?;
    Some(dotted(stripped))
}

/// Derive a fully-qualified class name from a `.java` path relative to a
/// decompile output root.
pub fn class_name_from_java_path(rel_path: &str) -> Option<String> {
    let stripped = rel_path.strip_suffix(".java")?;
    Some(dotted(stripped))
}

fn dotted(path: &str) -> String {
    path.trim_start_matches(['/', '\\'])
        .replace(['/', '\\'], ".")
}

/// File stem of a JAR name: `order-core-1.2.jar` → `order-core-1.2`.
pub fn jar_stem(jar_name: &str) -> &str {
    jar_name.strip_suffix(".jar").unwrap_or(jar_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        internal_prefixes(None)
    }

    #[test]
    fn default_prefixes_classify_internal() {
        assert!(!is_third_party("core-orders-1.4.jar", &prefixes()));
        assert!(!is_third_party("app-gateway.jar", &prefixes()));
    }

    #[test]
    fn unmatched_names_are_third_party() {
        assert!(is_third_party("guava-31.1-jre.jar", &prefixes()));
        assert!(is_third_party("spring-core-5.3.9.jar", &prefixes()));
    }

    #[test]
    fn configured_prefixes_override_defaults() {
        let custom = internal_prefixes(Some(&vec!["acme-".to_string()]));
        assert!(!is_third_party("acme-billing.jar", &custom));
        assert!(is_third_party("core-orders.jar", &custom));
    }

    #[test]
    fn class_name_from_class_path_keeps_inner_separators() {
        assert_eq!(
            class_name_from_class_path("com/x/Outer$Inner.class").as_deref(),
            Some("com.x.Outer$Inner")
        );
        assert_eq!(
            class_name_from_class_path("com/x/Z.class").as_deref(),
            Some("com.x.Z")
        );
    }

    #[test]
    fn class_name_requires_class_suffix() {
        assert!(class_name_from_class_path("com/x/Z.txt").is_none());
    }

    #[test]
    fn java_path_maps_to_identity() {
        assert_eq!(
            class_name_from_java_path("com/x/Y.java").as_deref(),
            Some("com.x.Y")
        );
        assert_eq!(class_name_from_java_path("Toplevel.java").as_deref(), Some("Toplevel"));
    }

    #[test]
    fn jar_stem_strips_extension_only() {
        assert_eq!(jar_stem("core-orders-1.4.jar"), "core-orders-1.4");
        assert_eq!(jar_stem("plain"), "plain");
    }
}
