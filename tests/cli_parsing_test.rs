#![cfg(feature = "cli")]

use clap::Parser;
use small_stack::config::cli::{Cli, Commands};
use std::path::PathBuf;

#[test]
fn test_up_with_selection_and_monitor() {
    let cli = Cli::parse_from([
        "small-stack",
        "-f",
        "demo/stack.yaml",
        "up",
        "web",
        "db",
        "--monitor",
    ]);

    assert_eq!(cli.file, "demo/stack.yaml");
    assert_eq!(cli.descriptor_dir(), PathBuf::from("demo"));
    assert_eq!(cli.resolve_state_dir(), PathBuf::from("demo/.small-stack"));
    match cli.command {
        Commands::Up { services, monitor } => {
            assert_eq!(services, ["web", "db"]);
            assert!(monitor);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_defaults_point_next_to_the_descriptor() {
    let cli = Cli::parse_from(["small-stack", "config"]);

    assert_eq!(cli.file, "stack.yaml");
    assert!(cli.env_file_override().is_none());
    assert_eq!(cli.descriptor_dir(), PathBuf::from("."));
    assert_eq!(cli.resolve_state_dir(), PathBuf::from("./.small-stack"));
    assert!(!cli.verbose);
    assert!(!cli.json_logs);
}

#[test]
fn test_state_dir_and_env_file_overrides() {
    let cli = Cli::parse_from([
        "small-stack",
        "--state-dir",
        "/var/run/demo",
        "--env-file",
        "prod.env",
        "ps",
    ]);

    assert_eq!(cli.resolve_state_dir(), PathBuf::from("/var/run/demo"));
    assert_eq!(cli.env_file_override(), Some(PathBuf::from("prod.env")));
    assert!(matches!(cli.command, Commands::Ps));
}

#[test]
fn test_config_render_flags() {
    let cli = Cli::parse_from(["small-stack", "config", "--json", "--services"]);
    match cli.command {
        Commands::Config { json, services } => {
            assert!(json);
            assert!(services);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}
