use std::path::PathBuf;

use clap::Parser;

use rustymux::Server;
use rustymux::config::ServerConfig;
use rustymux::handler::{Compress, FileServer, Handler, text, welcome};
use rustymux::http::status::HttpStatus;
use rustymux::logging;

#[derive(Debug, Parser)]
#[command(version, about = "Serve static files and a few built-in routes")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = "rustymux.toml")]
    config: PathBuf,

    /// Listen address, overrides the configured address and port
    #[arg(long)]
    addr: Option<String>,
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = ServerConfig::load(&cli.config);
    let config = loaded.as_ref().cloned().unwrap_or_default();
    logging::init(&config.log_level);
    if let Err(err) = loaded {
        tracing::warn!(%err, "falling back to default config");
    }

    let server = Server::new(config);
    let mux = server.mux();

    let files = Compress::new(FileServer::new(&server.config().static_files_root));
    let name = server.config().server_name.clone();
    mux.handle_func("/", move |res, req| {
        if req.path == "/" {
            welcome(res, &name);
        } else {
            files.serve(res, req);
        }
    })?;
    mux.handle_func("/healthz", |res, _req| text(res, HttpStatus::Ok, "ok\n"))?;

    match cli.addr {
        Some(addr) => server.listen_and_serve(addr.as_str(), None).await?,
        None => server.run().await?,
    }
    Ok(())
}
