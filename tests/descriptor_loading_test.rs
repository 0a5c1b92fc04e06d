use anyhow::Result;
use small_stack::config::{Interpolator, StackConfig};
use small_stack::domain::model::CommandSpec;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_env_file_next_to_descriptor_feeds_interpolation() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join(".env"),
        "LOADER_TEST_IMAGE=postgres\nLOADER_TEST_PORT=5433\n",
    )?;
    fs::write(
        dir.path().join("stack.yaml"),
        r#"
name: demo
services:
  db:
    command: ["${LOADER_TEST_IMAGE}", "--port", "${LOADER_TEST_PORT:-5432}"]
"#,
    )?;

    let config = StackConfig::from_file(dir.path().join("stack.yaml"))?;
    let db = config.service("db").unwrap();
    assert_eq!(
        db.command,
        CommandSpec::Exec(vec![
            "postgres".to_string(),
            "--port".to_string(),
            "5433".to_string(),
        ])
    );
    Ok(())
}

#[test]
fn test_missing_variable_becomes_empty_not_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("stack.yaml"),
        "services:\n  web:\n    command: \"serve --flag=${LOADER_TEST_NEVER_SET}\"\n",
    )?;

    let config = StackConfig::from_file(dir.path().join("stack.yaml"))?;
    config.validate_config()?;
    let web = config.service("web").unwrap();
    assert_eq!(web.command, CommandSpec::Shell("serve --flag=".to_string()));
    Ok(())
}

#[test]
fn test_os_environment_beats_the_project_env_file() -> Result<()> {
    let dir = TempDir::new()?;
    std::env::set_var("LOADER_TEST_WINNER", "from-os");
    fs::write(dir.path().join(".env"), "LOADER_TEST_WINNER=from-file\n")?;
    fs::write(
        dir.path().join("stack.yaml"),
        "services:\n  web:\n    command: \"serve ${LOADER_TEST_WINNER}\"\n",
    )?;

    let config = StackConfig::from_file(dir.path().join("stack.yaml"))?;
    let web = config.service("web").unwrap();
    assert_eq!(web.command, CommandSpec::Shell("serve from-os".to_string()));
    std::env::remove_var("LOADER_TEST_WINNER");
    Ok(())
}

#[test]
fn test_explicit_env_file_instead_of_dot_env() -> Result<()> {
    let dir = TempDir::new()?;
    // A stray .env must be ignored when the caller names another file
    fs::write(dir.path().join(".env"), "LOADER_TEST_NAME=wrong\n")?;
    fs::write(dir.path().join("custom.env"), "LOADER_TEST_NAME=right\n")?;
    fs::write(
        dir.path().join("stack.yaml"),
        "services:\n  web:\n    command: \"serve ${LOADER_TEST_NAME}\"\n",
    )?;

    let interp = Interpolator::from_env_file(dir.path().join("custom.env"))?;
    let config = StackConfig::from_file_with(dir.path().join("stack.yaml"), &interp)?;
    let web = config.service("web").unwrap();
    assert_eq!(web.command, CommandSpec::Shell("serve right".to_string()));
    Ok(())
}

#[test]
fn test_service_env_files_layer_in_order_with_inline_on_top() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("base.env"), "A=base\nB=base\nC=base\n")?;
    fs::write(dir.path().join("override.env"), "B=override\nC=override\n")?;
    fs::write(
        dir.path().join("stack.yaml"),
        r#"
services:
  web:
    command: "serve"
    env_file:
      - base.env
      - override.env
    environment:
      C: inline
"#,
    )?;

    let config = StackConfig::from_file(dir.path().join("stack.yaml"))?;
    let env = config.resolved_environment("web", dir.path())?;
    assert_eq!(env["A"], "base");
    assert_eq!(env["B"], "override");
    assert_eq!(env["C"], "inline");
    Ok(())
}

#[test]
fn test_extra_hosts_rewrite_environment_values() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("stack.yaml"),
        r#"
services:
  web:
    command: "serve"
    environment:
      DATABASE_URL: "postgres://app@host.docker.internal:5432/app"
    extra_hosts:
      - "host.docker.internal:host-gateway"
"#,
    )?;

    let config = StackConfig::from_file(dir.path().join("stack.yaml"))?;
    let env = config.resolved_environment("web", dir.path())?;
    assert_eq!(env["DATABASE_URL"], "postgres://app@127.0.0.1:5432/app");
    Ok(())
}

#[test]
fn test_missing_service_env_file_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("stack.yaml"),
        "services:\n  web:\n    command: \"serve\"\n    env_file: missing.env\n",
    )?;

    let config = StackConfig::from_file(dir.path().join("stack.yaml"))?;
    let result = config.resolved_environment("web", dir.path());
    assert!(result.is_err());
    Ok(())
}
