pub mod run;
pub mod tasks;
pub mod tree;
pub mod version;

use grove_core::paths::{project_root, MANIFEST_NAME};
use grove_core::{Config, Error, Manifest, Project, TaskError};
use miette::{IntoDiagnostic, Result};

/// Exit code for a failed task run or project load.
pub const EXIT_FAILURE: i32 = 1;

/// Find `grove.json` above the configured cwd and build the project.
pub fn load_project(config: Config) -> Result<Project, Error> {
    let root = project_root(&config.cwd).ok_or_else(|| Error::ProjectNotFound {
        start: config.cwd.clone(),
    })?;
    let manifest = Manifest::load(&root.join(MANIFEST_NAME))?;
    manifest.into_project(&root, config)
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}

/// Stable error code for `--json` output.
pub fn error_code(err: &Error) -> &'static str {
    match err {
        Error::ManifestRead { .. } | Error::ManifestParse { .. } | Error::ManifestInvalid(_) => {
            "MANIFEST_INVALID"
        }
        Error::ProjectNotFound { .. } => "PROJECT_NOT_FOUND",
        Error::Pkg(e) => e.code(),
        Error::Task(e) => task_error_code(e),
        Error::Io(_) | Error::Other(_) => "INTERNAL_ERROR",
    }
}

fn task_error_code(err: &TaskError) -> &'static str {
    match err.root_cause() {
        TaskError::Cycle { .. } => "TASK_CYCLE",
        TaskError::UnknownTask(_) => "TASK_UNKNOWN",
        TaskError::Configuration { .. } | TaskError::DuplicateTask(_) => "TASK_CONFIGURATION",
        TaskError::Pkg(e) => e.code(),
        _ => "TASK_FAILED",
    }
}

/// Print `err` (as a JSON object on stdout with `--json`) and exit.
pub fn fail(err: &Error, json: bool) -> ! {
    if json {
        let out = serde_json::json!({
            "ok": false,
            "error": {
                "code": error_code(err),
                "message": err.to_string(),
            }
        });
        println!("{out}");
    } else {
        eprintln!("error: {err}");
        if let Error::Task(task) = err {
            let cause = task.root_cause();
            if cause != task {
                eprintln!("  caused by: {cause}");
            }
        }
    }
    std::process::exit(EXIT_FAILURE);
}
