use quarry_core::version::{looks_like_url, parse_standard, parse_version, PreRelease, Version};

fn v(s: &str) -> Version {
    parse_version(s)
}

#[test]
fn parses_plain_release() {
    let version = v("1.2.3");
    let standard = version.as_standard().unwrap();
    assert_eq!(standard.epoch, 0);
    assert_eq!(standard.release, vec![1, 2, 3]);
    assert!(standard.pre.is_none());
    assert!(standard.post.is_none());
    assert!(standard.dev.is_none());
    assert!(standard.local.is_none());
}

#[test]
fn parses_alpha_prerelease() {
    let version = v("1.0a1");
    let standard = version.as_standard().unwrap();
    assert_eq!(standard.release, vec![1, 0]);
    assert_eq!(standard.pre, Some((PreRelease::Alpha, 1)));
    assert!(version.is_prerelease());
}

#[test]
fn prerelease_spellings_normalize() {
    assert_eq!(v("1.0alpha2"), v("1.0a2"));
    assert_eq!(v("1.0beta3"), v("1.0b3"));
    assert_eq!(v("1.0c1"), v("1.0rc1"));
    assert_eq!(v("1.0pre1"), v("1.0rc1"));
    assert_eq!(v("1.0preview1"), v("1.0rc1"));
    assert_eq!(v("1.0-rev4"), v("1.0.post4"));
    assert_eq!(v("1.0-4"), v("1.0.post4"));
}

#[test]
fn full_pep440_ordering() {
    let ordered = [
        "1.0.dev0",
        "1.0a1.dev1",
        "1.0a1",
        "1.0a2",
        "1.0b1",
        "1.0rc1",
        "1.0",
        "1.0+local.1",
        "1.0.post1.dev0",
        "1.0.post1",
        "1.1.dev0",
        "1.1",
        "2.0",
        "1!0.1",
    ];
    for pair in ordered.windows(2) {
        assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
    }
}

#[test]
fn display_is_normalized() {
    assert_eq!(v("V1.0-ALPHA-1").to_string(), "1.0a1");
    assert_eq!(v("0!1.0").to_string(), "1.0");
    assert_eq!(v("1.0.dev").to_string(), "1.0.dev0");
}

#[test]
fn unparseable_text_becomes_named() {
    let version = v("latest-nightly");
    assert_eq!(version, Version::Named("latest-nightly".to_string()));
    assert!(!version.is_standard());
}

#[test]
fn url_text_becomes_url() {
    let version = v("https://files.example.org/pkg-1.0.tar.gz");
    assert!(matches!(version, Version::Url(_)));
    assert!(looks_like_url("git+ssh://host/repo"));
    assert!(!looks_like_url("1.0"));
}

#[test]
fn strict_parse_rejects_named() {
    let err = parse_standard("1.x").unwrap_err();
    assert_eq!(err.offending, "1.x");
    assert!(parse_standard("2.0.post3").is_ok());
}

#[test]
fn named_versions_sort_after_standard() {
    let mut versions = vec![v("zeta"), v("https://a/b"), v("3.0"), v("alpha")];
    versions.sort();
    assert_eq!(
        versions,
        vec![v("3.0"), v("alpha"), v("zeta"), v("https://a/b")]
    );
}

#[test]
fn serde_uses_display_form() {
    let json = serde_json::to_string(&v("1.0-1")).unwrap();
    assert_eq!(json, "\"1.0.post1\"");
    let back: Version = serde_json::from_str(&json).unwrap();
    assert_eq!(back, v("1.0.post1"));
}

#[test]
fn serde_keeps_the_version_family() {
    let cases = [
        Version::Named("1.0".to_string()),
        Version::Named("nightly".to_string()),
        Version::Named("===odd".to_string()),
        Version::Url("https://host/a.whl".to_string()),
        Version::Url("local-build".to_string()),
    ];
    for version in cases {
        let json = serde_json::to_string(&version).unwrap();
        let back: Version = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            (&version, &back),
            (Version::Named(a), Version::Named(b)) | (Version::Url(a), Version::Url(b)) if a == b
        ), "{json}");
    }
    assert_eq!(
        serde_json::to_string(&Version::Named("1.0".to_string())).unwrap(),
        "\"===1.0\""
    );
    assert_eq!(serde_json::to_string(&v("nightly")).unwrap(), "\"nightly\"");
}
