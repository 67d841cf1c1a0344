//! `grove tree` command implementation.

use super::{fail, load_project, runtime};
use grove_core::pkg::LockRecord;
use grove_core::{Config, Error};
use miette::Result;

/// Run the resolve task `task` (and its dependencies) and print the tree
/// it publishes.
pub fn run(config: Config, task: &str) -> Result<()> {
    let json = config.json_logs;
    let project = match load_project(config) {
        Ok(project) => project,
        Err(e) => fail(&e, json),
    };

    if let Err(e) = runtime()?.block_on(project.run(task)) {
        fail(&Error::Task(e), json);
    }

    let Some(tree) = project.resolved_tree(task) else {
        fail(
            &Error::ManifestInvalid(format!("task '{task}' does not resolve dependencies")),
            json,
        );
    };

    if json {
        let out = serde_json::json!({ "ok": true, "tree": LockRecord::from_tree(&tree) });
        println!("{out}");
    } else {
        print!("{}", tree.render());
    }
    Ok(())
}
