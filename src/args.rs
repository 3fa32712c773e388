use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::gemini::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether the browser connects to ai-imager over https.
    /// If so, the sessionid cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address ai-imager should listen on. By default
    /// ai-imager will listen just on the IPv4 loopback.
    #[arg(short, long)]
    address: Option<String>,

    /// The port ai-imager listens on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Where users are stored.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Key for the generative AI API. Falls back to $GEMINI_API_KEY when
    /// neither this nor $API_KEY is set.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the generative AI API.
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    api_base_url: String,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }
}
