#[tokio::main]
async fn main() -> std::io::Result<()> {
    battle_server::frameworks::server::run_with_config().await
}
