//! Command-line argument parsing

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use hotline_common::DEFAULT_PORT;

/// Hotline file transfer client
///
/// Runs one transfer on the transfer port of a server whose control session
/// already issued a reference number.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Validate the server certificate on TLS connections
    #[arg(long, global = true, default_value = "false")]
    pub verify_certificates: bool,

    /// Accept forks that end before their declared size
    #[arg(long, global = true, default_value = "false")]
    pub tolerate_short_reads: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a file into the download directory
    Download(DownloadArgs),
    /// Upload a local file
    Upload(UploadArgs),
}

/// Where the control session is connected
#[derive(ClapArgs, Debug)]
pub struct SessionArgs {
    /// Control connection address (HOST[:PORT], default port 5500); transfers use PORT + 1
    #[arg(short, long)]
    pub server: String,

    /// The control connection uses TLS
    #[arg(long, default_value = "false")]
    pub tls: bool,

    /// Reference number from the control reply (decimal or 0x-prefixed hex)
    #[arg(short, long, value_parser = parse_reference)]
    pub reference: u32,

    /// Remote folder, '/' separated
    #[arg(long, default_value = "")]
    pub folder: String,
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// File name on the server
    #[arg(short, long)]
    pub name: String,

    /// Transfer size from the control reply
    #[arg(long)]
    pub size: u32,

    /// File size from the control reply
    #[arg(long)]
    pub file_size: Option<u32>,

    /// Download directory (overrides settings)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Local file to upload
    #[arg(short, long)]
    pub file: PathBuf,

    /// Transfer size from the control reply, if any
    #[arg(long, default_value_t = 0)]
    pub size: u32,
}

impl SessionArgs {
    /// Split `--server` into host and port, filling in the default port
    ///
    /// Accepts `host`, `host:port`, bare IPv6 addresses and `[v6]:port`.
    pub fn host_and_port(&self) -> Result<(String, u16), String> {
        let server = self.server.trim();
        if let Ok(ip) = server.parse::<IpAddr>() {
            return Ok((ip.to_string(), DEFAULT_PORT));
        }

        let (host, port) = match server.strip_prefix('[') {
            Some(bracketed) => {
                let (host, rest) = bracketed
                    .split_once(']')
                    .ok_or_else(|| format!("invalid server address '{server}'"))?;
                (host, rest.strip_prefix(':'))
            }
            None => match server.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (server, None),
            },
        };

        if host.is_empty() {
            return Err(format!("invalid server address '{server}'"));
        }
        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|e| format!("invalid port in '{server}': {e}"))?,
            None => DEFAULT_PORT,
        };
        Ok((host.to_string(), port))
    }

    /// Remote folder split into segments
    pub fn folder_segments(&self) -> Vec<String> {
        self.folder
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn parse_reference(value: &str) -> Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid reference number '{value}': {e}"))
}
