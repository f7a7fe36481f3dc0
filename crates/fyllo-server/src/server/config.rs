//! Command-line and environment configuration.
//!
//! Every flag can also be set through the environment variable named in its
//! help text; a `.env` file in the working directory is loaded first.

use anyhow::Context;
use clap::Parser;
use fyllo::ProviderSpec;
use std::net::SocketAddr;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fyllo-server",
    version,
    about = "HTTP service for distributed unique ID generation"
)]
pub struct CliArgs {
    /// Address to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8080")]
    pub server_addr: String,

    /// Snowflake provider: `static` or `elected`.
    #[arg(long, env = "SNOWFLAKE_PROVIDER", default_value = "static")]
    pub snowflake_provider: String,

    /// Argument string for the snowflake provider.
    #[arg(long, env = "SNOWFLAKE_PROVIDER_ARGS", default_value = "0")]
    pub snowflake_provider_args: String,

    /// Segment provider: `mem` or `sql`.
    #[arg(long, env = "SEGMENT_PROVIDER", default_value = "mem")]
    pub segment_provider: String,

    /// Argument string for the segment provider.
    #[arg(
        long,
        env = "SEGMENT_PROVIDER_ARGS",
        default_value = "tag=default,step=1000"
    )]
    pub segment_provider_args: String,

    /// Random provider.
    #[arg(long, env = "RANDOM_PROVIDER", default_value = "uuid")]
    pub random_provider: String,

    /// Argument string for the random provider.
    #[arg(long, env = "RANDOM_PROVIDER_ARGS", default_value = "")]
    pub random_provider_args: String,
}

/// Validated server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub server_addr: SocketAddr,
    pub snowflake: ProviderSpec,
    pub segment: ProviderSpec,
    pub random: ProviderSpec,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> anyhow::Result<Self> {
        let server_addr = args
            .server_addr
            .parse()
            .with_context(|| format!("invalid server address `{}`", args.server_addr))?;

        let provider = |family: &str, name: String, args: String| {
            let name = name.trim().to_owned();
            if name.is_empty() {
                anyhow::bail!("{family} provider name must not be empty");
            }
            Ok(ProviderSpec::new(name, args))
        };

        Ok(Self {
            server_addr,
            snowflake: provider(
                "snowflake",
                args.snowflake_provider,
                args.snowflake_provider_args,
            )?,
            segment: provider(
                "segment",
                args.segment_provider,
                args.segment_provider_args,
            )?,
            random: provider("random", args.random_provider, args.random_provider_args)?,
        })
    }
}
