//! `railchat tools`: list the tools the railway server exposes.

use railchat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.rpc.api_key.as_deref().is_none_or(str::is_empty) {
        return Err("RAPIDAPI_KEY environment variable is required".into());
    }

    let client = railchat_gateway::build_rpc_client(&config)?;
    let schemas = client.discover_tools().await?;

    println!();
    println!("  {} tools at {}", schemas.len(), config.rpc.endpoint);
    println!();
    for schema in &schemas {
        let marker = if schema.idempotent { " (read-only)" } else { "" };
        println!("  {}{marker}", schema.name);
        if !schema.description.is_empty() {
            println!("      {}", schema.description);
        }
    }
    println!();
    Ok(())
}
