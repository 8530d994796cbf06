use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use secure_proxy_gateway::config::{ConfigStore, MaskRule, RouteConfig, SystemConfig};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the Secure Proxy Gateway", long_about = None)]
struct Cli {
    /// Configuration file to edit
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured routes
    Ls,
    /// Add a route
    Add {
        path: String,
        target: String,
        /// Unique route name (defaults to the path)
        #[arg(long)]
        name: Option<String>,
        /// HTTP method, * for all
        #[arg(long, default_value = "*")]
        method: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a route by name
    Rm { name: String },
    /// Add a masking rule to a route
    Mask {
        name: String,
        #[arg(long)]
        pattern: String,
        #[arg(long)]
        repl: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// Validate the configuration file
    Validate,
    /// Query the running gateway's admin API
    Status {
        #[arg(short, long, default_value = "http://127.0.0.1:8001")]
        url: String,
        /// Admin api key (defaults to the one in the config file)
        #[arg(short, long)]
        key: Option<String>,
    },
}

fn default_route_name(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}

fn add_route(config: &mut SystemConfig, route: RouteConfig) -> Result<(), String> {
    if config.routes.iter().any(|r| r.name == route.name) {
        return Err(format!("Route name '{}' already exists", route.name));
    }
    config.routes.push(route);
    Ok(())
}

fn remove_route(config: &mut SystemConfig, name: &str) -> Result<(), String> {
    let before = config.routes.len();
    config.routes.retain(|r| r.name != name);
    if config.routes.len() == before {
        return Err(format!("Route {} not found", name));
    }
    Ok(())
}

fn add_mask(config: &mut SystemConfig, name: &str, rule: MaskRule) -> Result<(), String> {
    let route = config
        .routes
        .iter_mut()
        .find(|r| r.name == name)
        .ok_or_else(|| format!("Route {} not found", name))?;
    route.response_rules.mask_regex.push(rule);
    Ok(())
}

fn print_routes(config: &SystemConfig) {
    println!("{:<20} {:<8} {:<24} {:<40} DESCRIPTION", "NAME", "METHOD", "PATH", "TARGET");
    for route in &config.routes {
        println!(
            "{:<20} {:<8} {:<24} {:<40} {}",
            route.name,
            route.method,
            route.path_prefix,
            route.target,
            route.description.as_deref().unwrap_or("")
        );
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn edit(
    store: &ConfigStore,
    change: impl FnOnce(&mut SystemConfig) -> Result<(), String>,
) -> Result<(), String> {
    let mut config = store.load().await.map_err(|e| e.to_string())?;
    change(&mut config)?;
    store.save(config).await.map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = ConfigStore::new(cli.config);

    let outcome = match cli.command {
        Commands::Ls => {
            let config = store.load().await?;
            print_routes(&config);
            Ok(())
        }
        Commands::Add {
            path,
            target,
            name,
            method,
            description,
        } => {
            let name = name.unwrap_or_else(|| default_route_name(&path));
            let mut route = RouteConfig::new(name.clone(), path, target);
            route.method = method;
            route.description = description;
            edit(&store, |config| add_route(config, route))
                .await
                .map(|_| println!("Added route {}", name))
        }
        Commands::Rm { name } => edit(&store, |config| remove_route(config, &name))
            .await
            .map(|_| println!("Removed route {}", name)),
        Commands::Mask {
            name,
            pattern,
            repl,
            label,
        } => {
            let mut rule = MaskRule::new(pattern, repl);
            rule.label = label;
            edit(&store, |config| add_mask(config, &name, rule))
                .await
                .map(|_| println!("Added mask rule to {}", name))
        }
        Commands::Validate => store
            .load()
            .await
            .map(|_| println!("Config is valid"))
            .map_err(|e| format!("Config invalid: {}", e)),
        Commands::Status { url, key } => {
            let key = match key {
                Some(key) => key,
                None => store.load().await?.admin.api_key,
            };
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

            let res = reqwest::Client::new()
                .get(format!("{}/admin/status", url.trim_end_matches('/')))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
            Ok(())
        }
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(message) => {
            eprintln!("Error: {}", message);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_route_name() {
        assert_eq!(default_route_name("/api/users/"), "api/users");
        assert_eq!(default_route_name("/"), "root");
    }

    #[test]
    fn test_route_edits() {
        let mut config = SystemConfig::default();
        add_route(&mut config, RouteConfig::new("api", "/api", "http://up")).unwrap();
        assert!(add_route(&mut config, RouteConfig::new("api", "/other", "http://up")).is_err());

        add_mask(&mut config, "api", MaskRule::new(r"\d{4}", "****")).unwrap();
        assert_eq!(config.routes[0].response_rules.mask_regex.len(), 1);
        assert!(add_mask(&mut config, "missing", MaskRule::new("x", "y")).is_err());

        remove_route(&mut config, "api").unwrap();
        assert!(config.routes.is_empty());
        assert!(remove_route(&mut config, "api").is_err());
    }

    #[tokio::test]
    async fn test_edit_persists_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("gateway.toml"));

        edit(&store, |config| add_route(config, RouteConfig::new("api", "/api/", "http://up")))
            .await
            .unwrap();
        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.routes[0].path_prefix, "/api");

        // Invalid edits never reach the file
        let err = edit(&store, |config| add_route(config, RouteConfig::new("bad", "bad", "http://up")))
            .await
            .unwrap_err();
        assert!(err.contains("routes[1].path"));
        assert_eq!(store.load().await.unwrap().routes.len(), 1);
    }
}
