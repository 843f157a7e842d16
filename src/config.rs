use dotenvy::dotenv;
use eyre::Result;
use std::{env, fmt, net::IpAddr, time::Duration};
use tracing::info;

use crate::tokens::UnresolvedOwnerPolicy;

#[derive(Clone)]
pub struct Config {
    pub rpc_http_url: String,       // ✅ Solana JSON-RPC endpoint
    pub cluster: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub completion: CompletionConfig,
    pub token_list_url: Option<String>,
    pub owner_policy: UnresolvedOwnerPolicy,
    pub prompt_hardening: bool,
}

#[derive(Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub model: String,
    pub timeout: Duration,      // deadline for response headers
    pub idle_timeout: Duration, // max gap between streamed chunks
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_http_url", &self.rpc_http_url)
            .field("cluster", &self.cluster)
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("completion", &self.completion)
            .field("token_list_url", &self.token_list_url)
            .field("owner_policy", &self.owner_policy)
            .field("prompt_hardening", &self.prompt_hardening)
            .finish()
    }
}

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";

fn var_with_alias(name: &str, alias: &str) -> Option<String> {
    env::var(name)
        .or_else(|_| env::var(alias))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // ✅ Load from .env file

    // ✅ RPC URL (SOLANA_RPC alias, falls back to public mainnet)
    let rpc_http_url = var_with_alias("RPC_HTTP_URL", "SOLANA_RPC")
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

    let cluster = env::var("CLUSTER").unwrap_or_else(|_| "mainnet-beta".to_string());

    let bind_addr = parse_or("BIND_ADDR", IpAddr::from([127, 0, 0, 1]));
    let port = parse_or("PORT", 8080u16);

    // ✅ Completion service (Azure-style variables accepted as aliases)
    let completion = CompletionConfig {
        base_url: var_with_alias("COMPLETION_BASE_URL", "AZURE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
        api_key: var_with_alias("COMPLETION_API_KEY", "STROMA_AZURE_KEY"),
        api_version: env::var("COMPLETION_API_VERSION").ok().filter(|s| !s.is_empty()),
        model: env::var("COMPLETION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        timeout: Duration::from_secs(parse_or("COMPLETION_TIMEOUT_SECS", 30)),
        idle_timeout: Duration::from_secs(parse_or("COMPLETION_IDLE_TIMEOUT_SECS", 60)),
    };

    let token_list_url = env::var("TOKEN_LIST_URL").ok().filter(|s| !s.is_empty());

    let owner_policy = if parse_flag("KEEP_UNRESOLVED_OWNER_ROWS", false) {
        UnresolvedOwnerPolicy::Keep
    } else {
        UnresolvedOwnerPolicy::Drop
    };

    let cfg = Config {
        rpc_http_url,
        cluster,
        bind_addr,
        port,
        completion,
        token_list_url,
        owner_policy,
        prompt_hardening: parse_flag("PROMPT_HARDENING", true),
    };

    // ✅ Log loaded config for debugging (api key redacted by Debug impl)
    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
