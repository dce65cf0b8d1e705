//! Command-line interface definitions for the crawler.
//!
//! All options besides the task file can also come from the environment,
//! which keeps credentials and deployment-specific URLs out of shell
//! history and cron lines.

use clap::Parser;

use crate::web::DEFAULT_BASE_URL;

/// Command-line arguments for the crawler.
///
/// # Examples
///
/// ```sh
/// # Run the tasks in tasks.json against the public front end
/// ptt_text_crawler tasks.json
///
/// # With a credential file and a slower request cadence
/// ptt_text_crawler tasks.json -c my_private_password.json --delay 1.0
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Task configuration file (JSON)
    pub config: String,

    /// Credential file ({"account": ..., "password": ...}), for gateways
    /// that require HTTP auth
    #[arg(short = 'c', long, env = "PTT_CREDENTIALS")]
    pub credentials: Option<String>,

    /// Base URL of the board web front end
    #[arg(long, env = "PTT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Override the configured delay between remote requests (seconds)
    #[arg(long)]
    pub delay: Option<f64>,
}
