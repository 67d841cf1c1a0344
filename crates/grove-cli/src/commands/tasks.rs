//! `grove tasks` command implementation.

use super::{fail, load_project};
use grove_core::Config;
use miette::Result;
use serde::Serialize;

#[derive(Serialize)]
struct TaskInfo<'a> {
    name: &'a str,
    depends_on: &'a [String],
}

pub fn run(config: Config) -> Result<()> {
    let json = config.json_logs;
    let project = match load_project(config) {
        Ok(project) => project,
        Err(e) => fail(&e, json),
    };

    let tasks: Vec<TaskInfo<'_>> = project
        .tasks()
        .map(|task| TaskInfo {
            name: task.name(),
            depends_on: task.dependencies(),
        })
        .collect();

    if json {
        let out = serde_json::json!({ "ok": true, "tasks": tasks });
        println!("{out}");
        return Ok(());
    }

    for task in &tasks {
        if task.depends_on.is_empty() {
            println!("{}", task.name);
        } else {
            println!("{} <- {}", task.name, task.depends_on.join(", "));
        }
    }
    Ok(())
}
