use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the redirect / preview service.
    Serve {
        /// Address to listen on. Overrides `bind_addr` from config.yaml
        #[clap(short, long)]
        bind: Option<String>,
    },
    /// Fetch a page and print the metadata a preview would carry
    Meta {
        /// A url
        #[clap(allow_hyphen_values = true)]
        url: String,

        /// Print the synthesized preview page instead of JSON
        #[clap(long, default_value = "false")]
        html: bool,

        /// User-Agent to send instead of the configured fallback
        #[clap(long)]
        user_agent: Option<String>,
    },
    /// Print every persisted request log entry as JSON.
    Logs {},
}
