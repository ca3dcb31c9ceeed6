use anyhow::Result;

use crate::setup::{build_registry, load_settings, Overrides};

pub fn execute(overrides: &Overrides) -> Result<()> {
    let settings = load_settings(overrides)?;
    let registry = build_registry(&settings)?;

    if registry.is_empty() {
        eprintln!("no tools registered, set DB_NAME and DB_USER, DB_SNAPSHOT, or pass --snapshot");
    }
    println!("{}", serde_json::to_string_pretty(&registry.schemas())?);
    Ok(())
}
