use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let workspace_root = match std::env::current_dir() {
        Ok(path) => path,
        Err(error) => {
            tracing::error!(%error, "failed to resolve current directory");
            std::process::exit(1);
        }
    };
    if let Err(error) = timer_lock::run(workspace_root).await {
        tracing::error!(%error, "timer lock host stopped");
        std::process::exit(1);
    }
}
