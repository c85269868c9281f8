use clap::Parser;
use leaderboard_session::cli::{login_hint, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.execute().await {
        eprintln!("Error: {}", e);
        if let Some(hint) = login_hint(&e) {
            eprintln!("{hint}");
        }
        std::process::exit(1);
    }
}
