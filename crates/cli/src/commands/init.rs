//! `railchat init`: write a default configuration file.

use std::path::Path;

use railchat_config::AppConfig;

pub fn run(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    std::fs::write(path, AppConfig::default_toml())?;
    println!("Wrote {}", path.display());
    println!();
    println!("  Credentials are read from the environment:");
    println!("    OPENAI_API_KEY   completion endpoint key");
    println!("    RAPIDAPI_KEY     railway tool server key");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("railchat.toml");

        run(&path, false).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_iterations, 10);

        // Refuses to clobber without --force.
        assert!(run(&path, false).is_err());
        run(&path, true).unwrap();
    }
}
