use anyhow::Result;

use crate::config::Config;
use crate::decoders::DecoderRegistry;

/// Health of the filesystem import root.
pub fn filesystem_status(config: &Config) -> (&'static str, bool) {
    match &config.connectors.filesystem {
        Some(fs_config) => {
            if fs_config.root.exists() {
                ("OK", true)
            } else {
                ("NOT CONFIGURED (root does not exist)", false)
            }
        }
        None => ("NOT CONFIGURED", false),
    }
}

pub fn list_sources(config: &Config, registry: &DecoderRegistry) -> Result<()> {
    let fs_status = filesystem_status(config);

    println!("{:<16} {:<12} HEALTHY", "CONNECTOR", "STATUS");
    println!("{:<16} {:<12} {}", "filesystem", fs_status.0, fs_status.1);
    if let Some(fs_config) = &config.connectors.filesystem {
        println!("  root: {}", fs_config.root.display());
    }

    println!();
    println!("{:<16} {:<12} DESCRIPTION", "DECODER", "FILES");
    for decoder in registry.decoders() {
        println!(
            "{:<16} {:<12} {}",
            decoder.name(),
            decoder.file_globs().join(" "),
            decoder.description()
        );
    }

    Ok(())
}
