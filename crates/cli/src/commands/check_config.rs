//! Check-config command - parse and validate a load test file

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::output;
use crate::settings::{self, LoadArgs};

/// Execute check-config command
pub fn execute(path: &Path) -> Result<()> {
    let file = settings::load_file(path)?;
    let (config, profile) = settings::resolve(&LoadArgs::default(), file)?;
    config.validate()?;

    println!("{} {}", "✅".green(), path.display());
    println!("{}", output::config_table(&config));
    println!(
        "simulator: connect failure rate {}, reject rate {}, connect delay {:?}ms, answer delay {:?}ms",
        profile.connect_failure_rate, profile.reject_rate, profile.connect_delay_ms, profile.answer_delay_ms
    );
    Ok(())
}
