//! The execution launcher.
//!
//! Turns a fully cached selection set into a concrete process
//! invocation: entry-point resolution (with optional override), wrapper
//! injection, environment composition via the binding resolver, and
//! finally either a dry-run report, a process-image replacement, or an
//! isolated test run with captured output.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

use opal_schema::{ImplId, Selection, SelectionSet, SelectionsError};

use crate::bindings::{self, BindingError};
use crate::store::{ImplStore, StoreError};

/// Failures while composing or starting the program.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The chosen implementation declares no entry point and no override
    /// was given: it is a library, not a program.
    #[error(
        "Implementation '{0}' cannot be executed directly; it is just a library \
         to be used by other programs (or missing 'main' attribute)"
    )]
    NotExecutable(ImplId),

    /// The computed entry-point file does not exist.
    #[error("File '{path}' does not exist.\n(implementation '{id}' + program '{main}')")]
    MissingFile {
        /// The computed absolute entry-point path.
        path: PathBuf,
        /// The implementation it was computed for.
        id: ImplId,
        /// The entry point relative to the implementation root.
        main: String,
    },

    /// The operating system refused to start the program.
    #[error("Failed to run '{program}': {source}")]
    Launch {
        /// The program that could not be started.
        program: PathBuf,
        /// The underlying OS error.
        source: io::Error,
    },

    /// The selection set violates its closure invariants.
    #[error(transparent)]
    Selections(#[from] SelectionsError),

    /// A selection has no usable store path.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Binding computation failed.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Local IO error while capturing test output.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Launch options beyond the program arguments.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Entry-point override. An absolute path is taken relative to the
    /// implementation root; a relative one resolves against the declared
    /// `main`'s directory.
    pub main: Option<String>,

    /// Wrapper command interposed around the entry point, e.g. a
    /// debugger. The wrapper receives the real command via `"$@"`.
    pub wrapper: Option<String>,
}

/// A fully computed command line, ready to execute or report.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Absolute program path.
    pub program: PathBuf,

    /// Arguments, wrapper markers included.
    pub args: Vec<String>,

    /// Complete child environment (current environment plus bindings).
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    /// The command line as a display string for dry-run reporting.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Compose the invocation for `set`, using the current process
/// environment as the binding base. No side effects: callers doing a dry
/// run stop here.
pub fn compose(
    set: &SelectionSet,
    store: &ImplStore,
    opts: &LaunchOptions,
    args: &[String],
) -> Result<Invocation, ExecError> {
    compose_with_env(set, store, opts, args, std::env::vars().collect())
}

/// [`compose`] with an explicit environment base, for callers (and
/// tests) that control the environment themselves.
pub fn compose_with_env(
    set: &SelectionSet,
    store: &ImplStore,
    opts: &LaunchOptions,
    args: &[String],
    mut env: BTreeMap<String, String>,
) -> Result<Invocation, ExecError> {
    set.validate()?;
    bindings::resolve_env(set, store, &mut env)?;

    let root = set.root().expect("validated set has a root");
    let program = entry_point(root, store, opts.main.as_deref())?;

    let (program, args) = match &opts.wrapper {
        None => (program, args.to_vec()),
        Some(wrapper) => {
            // The shell runs the wrapper; the real command arrives via
            // positional arguments, so the wrapper can exec "$@".
            let mut wrapped = vec![
                "-c".to_string(),
                format!("{wrapper} \"$@\""),
                "-".to_string(),
                program.to_string_lossy().into_owned(),
            ];
            wrapped.extend(args.iter().cloned());
            (PathBuf::from("/bin/sh"), wrapped)
        }
    };

    Ok(Invocation { program, args, env })
}

/// Resolve the entry-point file for the root selection.
fn entry_point(
    root: &Selection,
    store: &ImplStore,
    main_override: Option<&str>,
) -> Result<PathBuf, ExecError> {
    if root.id.is_native() {
        // Native implementations live on the host; main is already an
        // absolute path.
        let main = main_override
            .or(root.main.as_deref())
            .ok_or_else(|| ExecError::NotExecutable(root.id.clone()))?;
        return check_exists(PathBuf::from(main), &root.id, main);
    }

    let main = match main_override {
        None => root
            .main
            .clone()
            .ok_or_else(|| ExecError::NotExecutable(root.id.clone()))?,
        Some(over) => {
            if let Some(stripped) = over.strip_prefix('/') {
                // Absolute override: relative to the implementation root.
                stripped.to_string()
            } else if let Some(declared) = &root.main {
                // Relative override: sibling of the declared entry point.
                match Path::new(declared).parent() {
                    Some(dir) if dir != Path::new("") => {
                        format!("{}/{over}", dir.to_string_lossy())
                    }
                    _ => over.to_string(),
                }
            } else {
                over.to_string()
            }
        }
    };

    let impl_root = store.lookup(&root.id)?;
    check_exists(impl_root.join(&main), &root.id, &main)
}

fn check_exists(path: PathBuf, id: &ImplId, main: &str) -> Result<PathBuf, ExecError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(ExecError::MissingFile {
            path,
            id: id.clone(),
            main: main.to_string(),
        })
    }
}

/// Replace the current process image with the invocation.
///
/// On success this call does not return: the program takes over the
/// process. The only way it returns is with the launch failure.
#[cfg(unix)]
pub fn execute(inv: &Invocation) -> Result<Infallible, ExecError> {
    use std::os::unix::process::CommandExt;

    tracing::info!(program = %inv.program.display(), "executing");
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    let err = Command::new(&inv.program)
        .args(&inv.args)
        .env_clear()
        .envs(&inv.env)
        .exec();

    Err(ExecError::Launch {
        program: inv.program.clone(),
        source: err,
    })
}

/// Outcome of an isolated test run.
#[derive(Debug, Clone)]
pub struct TestOutput {
    /// Combined stdout and stderr, with a trailing note appended when
    /// the child did not exit cleanly.
    pub output: String,

    /// Whether the child exited with status zero.
    pub success: bool,
}

/// Run the invocation in an isolated child process, capturing combined
/// stdout/stderr, and wait for it (bounded by `timeout` if given).
///
/// The caller's own standard streams are untouched; this is the variant
/// test harnesses use instead of [`execute`].
pub fn test_run(inv: &Invocation, timeout: Option<Duration>) -> Result<TestOutput, ExecError> {
    let mut capture = tempfile::tempfile()?;

    let mut child = Command::new(&inv.program)
        .args(&inv.args)
        .env_clear()
        .envs(&inv.env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(capture.try_clone()?))
        .stderr(Stdio::from(capture.try_clone()?))
        .spawn()
        .map_err(|source| ExecError::Launch {
            program: inv.program.clone(),
            source,
        })?;

    tracing::info!("waiting for test process to finish");
    let status = match timeout {
        None => Some(child.wait()?),
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => Some(status),
            None => {
                child.kill()?;
                child.wait()?;
                None
            }
        },
    };

    capture.seek(SeekFrom::Start(0))?;
    let mut output = String::new();
    capture.read_to_string(&mut output)?;

    let success = match status {
        Some(status) if status.success() => true,
        Some(status) => {
            output.push_str(&format!(
                "Error from child process: exit code = {}",
                status.code().unwrap_or(-1)
            ));
            false
        }
        None => {
            output.push_str("Error from child process: timed out");
            false
        }
    };

    Ok(TestOutput { output, success })
}
