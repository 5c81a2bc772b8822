//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `repokit_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use repokit_core::db::{migrations::latest_version, open_db_in_memory};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("repokit_core ping={}", repokit_core::ping());
    println!("repokit_core version={}", repokit_core::core_version());
    println!("repokit_core schema_version={}", latest_version());

    match open_db_in_memory() {
        Ok(_) => {
            println!("repokit_core in_memory_db=ok");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("repokit_core in_memory_db=error {err}");
            ExitCode::FAILURE
        }
    }
}
