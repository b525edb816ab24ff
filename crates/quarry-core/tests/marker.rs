use quarry_core::environment::Environment;
use quarry_core::marker::{parse_marker, MarkerTree};

fn linux_py38() -> Environment {
    Environment::new()
        .with("python_version", "3.8")
        .with("python_full_version", "3.8.10")
        .with("sys_platform", "linux")
        .with("os_name", "posix")
        .with("platform_machine", "x86_64")
}

fn eval(text: &str, env: &Environment) -> bool {
    parse_marker(text).unwrap().evaluate(env, None)
}

#[test]
fn version_keys_compare_as_versions() {
    let env = linux_py38();
    assert!(eval(r#"python_version >= "3.8""#, &env));
    assert!(eval(r#"python_version < "3.10""#, &env));
    assert!(!eval(r#"python_version > "3.8""#, &env));
    assert!(eval(r#"python_full_version ~= "3.8.0""#, &env));
    assert!(eval(r#"python_version == "3.*""#, &env));
}

#[test]
fn reversed_operands_flip() {
    let env = linux_py38();
    assert!(eval(r#""3.10" > python_version"#, &env));
    assert!(!eval(r#""3.7" >= python_version"#, &env));
}

#[test]
fn string_keys_compare_as_strings() {
    let env = linux_py38();
    assert!(eval(r#"sys_platform == "linux""#, &env));
    assert!(eval(r#"sys_platform != 'win32'"#, &env));
    assert!(eval(r#""linux" in sys_platform"#, &env));
    assert!(eval(r#"platform_machine not in "arm64 aarch64""#, &env));
}

#[test]
fn boolean_combinations() {
    let env = linux_py38();
    assert!(eval(
        r#"sys_platform == "win32" or (os_name == "posix" and python_version >= "3.6")"#,
        &env
    ));
    assert!(!eval(
        r#"sys_platform == "win32" and python_version >= "3.6""#,
        &env
    ));
}

#[test]
fn unknown_values_are_empty() {
    let env = Environment::new();
    assert!(eval(r#"implementation_name == """#, &env));
    assert!(!eval(r#"platform_system == "Linux""#, &env));
}

#[test]
fn extra_comparison() {
    let tree = parse_marker(r#"extra == "Test_Utils""#).unwrap();
    let env = Environment::new();
    assert!(tree.evaluate(&env, Some("test-utils")));
    assert!(!tree.evaluate(&env, None));
}

#[test]
fn display_parenthesizes_nested_or() {
    let tree: MarkerTree = r#"os_name == "nt" and (sys_platform == "a" or sys_platform == "b")"#
        .parse()
        .unwrap();
    assert_eq!(
        tree.to_string(),
        r#"os_name == "nt" and (sys_platform == "a" or sys_platform == "b")"#
    );
}

#[test]
fn parse_errors_point_at_tokens() {
    let err = parse_marker(r#"os_name = "nt""#).unwrap_err();
    assert_eq!(err.offending, "=");

    let err = parse_marker(r#"os_name == "nt" and"#).unwrap_err();
    assert!(err.message.contains("expected"), "{err}");

    let err = parse_marker(r#"(os_name == "nt""#).unwrap_err();
    assert!(err.message.contains("`)`"), "{err}");

    let err = parse_marker(r#"os_name == "nt"#).unwrap_err();
    assert_eq!(err.message, "unterminated string");
}
