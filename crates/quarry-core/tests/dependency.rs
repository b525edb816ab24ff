use quarry_core::dependency::parse_dependency;
use quarry_core::environment::Environment;
use quarry_core::specifier::parse_specifier;
use quarry_core::version::parse_version;
use quarry_core::Dependency;

#[test]
fn parse_name_only() {
    let dep = parse_dependency("requests").unwrap();
    assert_eq!(dep.name.as_str(), "requests");
    assert!(dep.specifier.is_allow_all());
    assert!(dep.extras.is_empty());
    assert!(dep.marker.is_none());
}

#[test]
fn parse_name_is_normalized() {
    let dep = parse_dependency("Zope.Interface>=5").unwrap();
    assert_eq!(dep.name.as_str(), "zope-interface");
    assert_eq!(dep.specifier, parse_specifier(">=5").unwrap());
}

#[test]
fn parse_full_requirement() {
    let dep =
        parse_dependency(r#"requests[Socks, security_extra] >=2.8.1, <3 ; python_version >= "3.8""#)
            .unwrap();
    assert_eq!(dep.name.as_str(), "requests");
    let extras: Vec<&str> = dep.extras.iter().map(String::as_str).collect();
    assert_eq!(extras, vec!["security-extra", "socks"]);
    assert!(dep.specifier.allows(&parse_version("2.9")));
    assert!(!dep.specifier.allows(&parse_version("3.0")));

    let py37 = Environment::new().with("python_version", "3.7");
    let py311 = Environment::new().with("python_version", "3.11");
    assert!(!dep.applies_to(&py37, None));
    assert!(dep.applies_to(&py311, None));
}

#[test]
fn parse_parenthesized_specifier() {
    let dep = parse_dependency("name (>=1.0)").unwrap();
    assert_eq!(dep.specifier, parse_specifier(">=1.0").unwrap());
}

#[test]
fn parse_url_requirement() {
    let dep = parse_dependency(r#"pkg @ https://host/pkg-1.0.whl ; os_name == "posix""#).unwrap();
    assert_eq!(dep.url().as_deref(), Some("https://host/pkg-1.0.whl"));
    assert!(dep.marker.is_some());
}

#[test]
fn url_without_marker_separator_is_rejected() {
    let err = parse_dependency("pkg @ https://host/pkg.whl extra").unwrap_err();
    assert_eq!(err.offending, "extra");
}

#[test]
fn specifier_error_points_into_requirement() {
    let err = parse_dependency("foo >=1.x").unwrap_err();
    assert_eq!(err.offending, "1.x");
    assert_eq!(err.span.offset(), 6);
    assert!(err.pointer().contains("foo >=1.x\n      ^^^"));
}

#[test]
fn marker_error_points_into_requirement() {
    let err = parse_dependency(r#"foo ; bogus_var == "1""#).unwrap_err();
    assert_eq!(err.offending, "bogus_var");
}

#[test]
fn missing_name_is_rejected() {
    assert!(parse_dependency(">=1.0").is_err());
    assert!(parse_dependency("foo[bar").is_err());
    assert!(parse_dependency("foo[a,,b]").is_err());
}

#[test]
fn display_round_trips() {
    for text in [
        "requests",
        "requests[socks]>=2.8, <3.0",
        r#"foo==1.5 ; python_version >= "3.8""#,
        "pkg @ https://host/pkg-1.0.whl",
    ] {
        let dep: Dependency = text.parse().unwrap();
        let reparsed: Dependency = dep.to_string().parse().unwrap();
        assert_eq!(dep, reparsed, "{text}");
    }
}

#[test]
fn extra_markers_apply_only_with_extra() {
    let dep = parse_dependency(r#"pysocks ; extra == "socks""#).unwrap();
    let env = Environment::new();
    assert!(!dep.applies_to(&env, None));
    assert!(dep.applies_to(&env, Some("socks")));
    assert!(dep.applies_to(&env, Some("SOCKS")));
    assert!(!dep.applies_to(&env, Some("other")));
}
