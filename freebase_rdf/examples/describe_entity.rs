//! Resolves an entity by name, loads everything its types declare and prints
//! the result as N-Triples.
//!
//! ```text
//! FREEBASE_API_KEY=... cargo run -p freebase_rdf --example describe_entity -- "SAP AG"
//! ```

use freebase_rdf::{ClientConfig, DEFAULT_NAMESPACE, FreebaseClient, write_ntriples};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "SAP AG".to_string());

    let client = FreebaseClient::from_config(ClientConfig::from_env()?).await?;
    let mut entity = client.find_by_name(&name).await?;
    client.load_all(&mut entity).await?;

    let stdout = std::io::stdout();
    let written = write_ntriples(&mut stdout.lock(), entity.triples(DEFAULT_NAMESPACE))?;
    tracing::info!(entity = ?entity.id(), triples = written, "done");

    client.close().await?;
    Ok(())
}
