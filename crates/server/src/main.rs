#[tokio::main]
async fn main() {
    std::process::exit(tamer_server::cli::run().await)
}
