// src/main.rs

use flowbuild::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(clean) if clean => {}
        Ok(_) => std::process::exit(1),
        Err(err) => {
            eprintln!("flowbuild error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> flowbuild::errors::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level.as_deref())?;
    let summary = run(args).await?;
    Ok(summary.is_clean())
}
