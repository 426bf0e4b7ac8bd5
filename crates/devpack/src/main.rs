//! devpack - development server entry point.

use clap::Parser;
use devpack::host::{Dispatcher, ServerOptions};
use devpack::{cli::Cli, error, logger};
use devpack_config::DevModuleOptions;
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    run(args).await.map_err(error::to_miette)
}

async fn run(args: Cli) -> devpack::Result<()> {
    let root = std::path::absolute(&args.root)?;
    let options = DevModuleOptions::load(&root, args.config.as_deref())?;

    let mut server = ServerOptions::new(&root, &args.build_dir);
    let module = devpack::setup(&mut server, &options)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    };

    let result = Dispatcher::new(&server).serve(args.addr(), shutdown).await;
    module.close();
    result
}
