//! Configuration loading end to end: files on disk, environment, CLI overrides.

use clap::Parser;
use roboto::cli::{Cli, RunContext};
use roboto::config::{ConfigLoader, RobotoConfig};
use roboto::error::ApiError;
use std::path::Path;

use super::test_utils::with_isolated_env;

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

#[test]
fn load_from_file_reads_every_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roboto.toml");
    write_file(
        &path,
        r#"
endpoint = "http://localhost:8000"
api_key = "file-key"
org_id = "og_file"

[http]
connect_timeout_secs = 2
request_timeout_secs = 15

[logging]
level = "info"
format = "json"

[logging.modules]
"roboto::actions" = "trace"
"#,
    );

    let config = ConfigLoader::load_from_file(&path).unwrap();

    assert_eq!(config.endpoint, "http://localhost:8000");
    assert_eq!(config.api_key.as_deref(), Some("file-key"));
    assert_eq!(config.org_id.as_deref(), Some("og_file"));
    assert_eq!(config.http.connect_timeout_secs, 2);
    assert_eq!(config.http.request_timeout_secs, 15);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        config.logging.modules.get("roboto::actions").map(String::as_str),
        Some("trace")
    );
}

#[test]
fn environment_overrides_global_file() {
    with_isolated_env(|home| {
        write_file(
            &home.join(".config").join("roboto").join("config.toml"),
            "endpoint = \"https://global.example.com\"\norg_id = \"og_global\"\n",
        );
        std::env::set_var("ROBOTO_ORG_ID", "og_env");
        std::env::set_var("ROBOTO_HTTP__CONNECT_TIMEOUT_SECS", "7");

        let config = ConfigLoader::load(None).unwrap();

        assert_eq!(config.endpoint, "https://global.example.com");
        assert_eq!(config.org_id.as_deref(), Some("og_env"));
        assert_eq!(config.http.connect_timeout_secs, 7);
    });
}

#[test]
fn global_file_under_xdg_config_home_is_used() {
    with_isolated_env(|home| {
        let xdg = home.join("xdg");
        std::env::set_var("XDG_CONFIG_HOME", &xdg);
        write_file(
            &xdg.join("roboto").join("config.toml"),
            "org_id = \"og_xdg\"\n",
        );
        // Ignored once XDG_CONFIG_HOME is set.
        write_file(
            &home.join(".config").join("roboto").join("config.toml"),
            "org_id = \"og_home\"\n",
        );

        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config.org_id.as_deref(), Some("og_xdg"));
    });
}

#[test]
fn invalid_environment_value_fails_validation() {
    with_isolated_env(|_| {
        std::env::set_var("ROBOTO_ENDPOINT", "ftp://files.example.com");
        let err = ConfigLoader::load(None).unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));
        assert!(err.to_string().contains("unsupported scheme"));
    });
}

#[test]
fn run_context_applies_cli_overrides_last() {
    with_isolated_env(|home| {
        let explicit = home.join("work.toml");
        write_file(
            &explicit,
            "endpoint = \"https://file.example.com\"\norg_id = \"og_file\"\napi_key = \"k\"\n",
        );

        let context = RunContext::new(
            Some(&explicit),
            Some("http://127.0.0.1:9000"),
            Some("og_flag"),
        )
        .unwrap();

        let config = context.config();
        assert_eq!(config.endpoint, "http://127.0.0.1:9000");
        assert_eq!(config.org_id.as_deref(), Some("og_flag"));
        assert_eq!(config.api_key.as_deref(), Some("k"));
    });
}

#[test]
fn run_context_rejects_invalid_override() {
    with_isolated_env(|_| {
        let result = RunContext::new(None, Some("not a url"), None);
        assert!(matches!(result, Err(ApiError::ConfigError(_))));
    });
}

#[test]
fn config_path_command_prints_global_location() {
    with_isolated_env(|home| {
        let context = RunContext::new(None, None, None).unwrap();
        let cli = Cli::try_parse_from(["roboto", "config", "path"]).unwrap();
        let mut out = Vec::new();
        context.execute(&cli.command, &mut out).unwrap();

        let expected = home.join(".config").join("roboto").join("config.toml");
        assert_eq!(
            String::from_utf8(out).unwrap().trim(),
            expected.display().to_string()
        );
    });
}

#[test]
fn config_show_reflects_loaded_file() {
    with_isolated_env(|home| {
        let explicit = home.join("work.toml");
        write_file(&explicit, "org_id = \"og_file\"\napi_key = \"hidden\"\n");
        let context = RunContext::new(Some(&explicit), None, None).unwrap();
        let cli = Cli::try_parse_from(["roboto", "config", "show"]).unwrap();
        let mut out = Vec::new();
        context.execute(&cli.command, &mut out).unwrap();

        let rendered = String::from_utf8(out).unwrap();
        let parsed: RobotoConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.org_id.as_deref(), Some("og_file"));
        assert_eq!(parsed.api_key.as_deref(), Some("********"));
    });
}
