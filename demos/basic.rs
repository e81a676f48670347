//! Basic usage example with the in-memory credential store.
//!
//! Needs the `op` CLI on `OP_CLI_PATH` (a directory) or in the current
//! directory, and a service account token in `OP_SERVICE_ACCOUNT_TOKEN`.
//! Run with `cargo run --example basic -- op://vault/item/field`.

use opinject::credential::InMemoryCredentialStore;
use opinject::{
    Configuration, Credential, CredentialScope, JobContext, SecretOrchestrator, SecretReference,
};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> opinject::Result<()> {
    let reference = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "op://Private/example/password".to_string());
    let token = std::env::var("OP_SERVICE_ACCOUNT_TOKEN").unwrap_or_default();
    let cli_path = std::env::var("OP_CLI_PATH").unwrap_or_else(|_| ".".to_string());

    println!("Creating credential store...");
    let store = InMemoryCredentialStore::new().with_credential(Credential::new(
        "example-sa",
        token,
        "Example service account token",
        CredentialScope::Global,
    ));
    let orchestrator = SecretOrchestrator::new(Arc::new(store));

    let job = JobContext::new("demo/basic", ".");
    let config = Configuration::new()
        .with_service_account_credential_id("example-sa")
        .with_cli_path(cli_path);
    let secrets = vec![SecretReference::new("EXAMPLE_SECRET", reference)?];

    println!("Retrieving {} secret(s)...", secrets.len());
    let overrides = orchestrator
        .retrieve_secrets(&job, &mut std::io::stdout(), &HashMap::new(), Some(&config), &secrets)
        .await?;

    // Values stay out of the output.
    for name in overrides.keys() {
        println!("Injected: {}", name);
    }

    Ok(())
}
