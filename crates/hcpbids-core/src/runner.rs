//! Running plans: the process boundary and the step executor.

use std::io::{BufRead, BufReader, Write};
use std::process::{ChildStdout, Command, Stdio};
use std::sync::Mutex;

use crate::error::{HcpError, Result};
use crate::io;
use crate::plan::{Plan, Step};
use crate::stages::Invocation;

/// Something that can run an external program to completion.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Spawns the program directly (no shell) and streams its stdout.
///
/// The child inherits this process's environment plus the invocation's
/// variables, minus `DEBUG`: the pipeline scripts switch on `set -x`
/// tracing when it is set. stderr is inherited.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        io::ensure_dir(&invocation.cwd)?;

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&invocation.env)
            .env_remove("DEBUG")
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| HcpError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        // Always reap the child, even when forwarding its output failed.
        let forwarded = match child.stdout.take() {
            Some(stdout) => forward_stdout(stdout, &invocation.program),
            None => Ok(()),
        };
        let status = child.wait()?;
        forwarded?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(HcpError::NonZeroExit {
                program: invocation.program.clone(),
                code,
            }),
            None => Err(HcpError::Terminated(invocation.program.clone())),
        }
    }
}

/// Copy the child's stdout to ours line by line, as raw bytes: pipeline
/// tools print whatever encoding they like. If our own stdout goes away the
/// pipe is still drained so the stage can run to completion.
fn forward_stdout(stdout: ChildStdout, program: &str) -> std::io::Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut out = std::io::stdout().lock();
    let mut line = Vec::new();
    let mut forwarding = true;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if forwarding {
            if let Err(e) = out.write_all(&line) {
                tracing::warn!(program, error = %e, "cannot forward output; discarding the rest");
                forwarding = false;
            }
        }
    }
    if forwarding {
        let _ = out.flush();
    }
    Ok(())
}

/// Records invocations instead of running them. Optionally fails the
/// invocation with a given label, to exercise error paths.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_label: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(label: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_label: Some(label.into()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        if self.fail_label.as_deref() == Some(invocation.label.as_str()) {
            return Err(HcpError::NonZeroExit {
                program: invocation.program.clone(),
                code: 1,
            });
        }
        Ok(())
    }
}

/// Runs plan steps strictly in order, stopping at the first failure.
pub struct Executor<'r> {
    runner: &'r dyn CommandRunner,
}

impl<'r> Executor<'r> {
    pub fn new(runner: &'r dyn CommandRunner) -> Self {
        Self { runner }
    }

    pub fn execute(&self, plan: &Plan) -> Result<()> {
        for step in &plan.steps {
            self.step(&plan.subject, step)?;
        }
        Ok(())
    }

    fn step(&self, subject: &str, step: &Step) -> Result<()> {
        match step {
            Step::CreateDir { path } => io::ensure_dir(path),
            Step::WriteFile { path, contents } => {
                tracing::debug!(path = %path.display(), "writing file");
                io::atomic_write(path, contents.as_bytes())
            }
            Step::CopyTree { from, to } => {
                if io::copy_tree_if_missing(from, to)? {
                    tracing::info!(from = %from.display(), to = %to.display(), "copied");
                } else {
                    tracing::debug!(to = %to.display(), "already present; not copied");
                }
                Ok(())
            }
            Step::Command(inv) => {
                tracing::info!(subject, stage = %inv.label, "{inv}");
                self.runner.run(inv)
            }
        }
    }
}
