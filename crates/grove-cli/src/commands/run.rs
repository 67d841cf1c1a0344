//! `grove run` command implementation.

use super::{fail, load_project, runtime};
use grove_core::{Config, Error};
use miette::Result;
use std::time::Instant;
use tracing::info;

/// Run each named task in turn. The first failure is reported and ends the
/// process with a non-zero status.
pub fn run(config: Config, tasks: &[String]) -> Result<()> {
    let json = config.json_logs;
    let project = match load_project(config) {
        Ok(project) => project,
        Err(e) => fail(&e, json),
    };

    let start = Instant::now();
    let outcome = runtime()?.block_on(async {
        for name in tasks {
            project.run(name).await?;
        }
        Ok::<_, Error>(())
    });

    if let Err(e) = outcome {
        fail(&e, json);
    }

    let elapsed_ms = start.elapsed().as_millis();
    info!(tasks = tasks.len(), elapsed_ms, "Run finished");
    if json {
        let out = serde_json::json!({ "ok": true, "tasks": tasks, "elapsed_ms": elapsed_ms });
        println!("{out}");
    }
    Ok(())
}
