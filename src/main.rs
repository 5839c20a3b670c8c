use colored::Colorize;

#[tokio::main]
async fn main() {
    if let Err(e) = pve_vman::cli::run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
