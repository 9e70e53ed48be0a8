//! AERIS weather node binary

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    aeris_node::runner::run_node().await
}
