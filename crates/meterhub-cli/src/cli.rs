use clap::{Parser, Subcommand};

/// CLI surface definition. The poll command doubles as the on-demand
/// trigger; the scheduler simply invokes it periodically.
#[derive(Parser, Debug)]
#[command(
    name = "meterhub",
    about = "Multi-tenant meter fleet poller for the SwitchBot device API",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one poll cycle over all enrolled tenants, or a single tenant.
    Poll {
        /// Poll only this tenant.
        #[arg(long)]
        tenant: Option<String>,
    },
    /// List the devices visible to a tenant's credentials.
    Devices {
        #[arg(long)]
        tenant: String,
    },
    /// Seal and store a tenant's API token/secret and enroll the tenant.
    Register {
        #[arg(long)]
        tenant: String,
        /// API token (hex, at least 40 characters).
        #[arg(long)]
        token: String,
        /// API secret (hex, at least 24 characters).
        #[arg(long)]
        secret: String,
        /// Device to bind for polling.
        #[arg(long)]
        device: Option<String>,
    },
    /// Remove a tenant's credentials and device binding and unenroll it.
    Disable {
        #[arg(long)]
        tenant: String,
    },
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
