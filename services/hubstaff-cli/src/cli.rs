use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Hubstaff API client using a personal access token.
///
/// Tokens are read from and refreshed into the state file; API responses are
/// printed to stdout as JSON.
#[derive(Debug, Parser)]
#[command(name = "hubstaff", version, about)]
pub struct Cli {
    /// Path to the config file (default: hubstaff.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the user that owns the token.
    Me,
    /// GET an API path.
    Get {
        /// Path relative to the API base, e.g. v2/organizations.
        path: String,
        /// Query parameters as key=value.
        #[arg(value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
    /// POST a JSON body to an API path.
    Post {
        path: String,
        /// Body fields as key=value (sent as JSON strings).
        #[arg(value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Raw JSON body; replaces any key=value fields.
        #[arg(long)]
        data: Option<String>,
    },
    /// GET every page of a paginated collection, one JSON document per page.
    Paged {
        path: String,
        #[arg(value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Page size sent as page_limit.
        #[arg(long)]
        page_limit: Option<u32>,
        /// Stop after this many requests.
        #[arg(long)]
        max_requests: Option<usize>,
    },
    /// Report token state without contacting the network.
    Status,
    /// Refresh the access token now.
    Refresh,
    /// Install a new token pair, e.g. after the refresh token was revoked.
    SetToken {
        #[arg(long, env = "HUBSTAFF_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long, env = "HUBSTAFF_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
}

/// Split `key=value` on the first `=`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("empty key in `{s}`")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got `{s}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_key_val("empty=").unwrap().1, "");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn parses_paged_options() {
        let cli = Cli::try_parse_from([
            "hubstaff",
            "paged",
            "v2/organizations/1/members",
            "include=users",
            "--page-limit",
            "50",
            "--max-requests",
            "2",
        ])
        .unwrap();
        match cli.command {
            Command::Paged {
                path,
                params,
                page_limit,
                max_requests,
            } => {
                assert_eq!(path, "v2/organizations/1/members");
                assert_eq!(params, vec![("include".into(), "users".into())]);
                assert_eq!(page_limit, Some(50));
                assert_eq!(max_requests, Some(2));
            }
            other => panic!("expected paged, got {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["hubstaff", "status", "--config", "/etc/h.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/h.toml")));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn bad_param_is_usage_error() {
        let err = Cli::try_parse_from(["hubstaff", "get", "v2/users/me", "oops"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
