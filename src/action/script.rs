// src/action/script.rs

//! Actions implemented as external rule scripts.
//!
//! A rule script is an executable that receives the source file path as
//! its first argument and talks to the driver over its stdio: one command
//! per stdout line, replies written back on stdin. The protocol is stable:
//!
//! ```text
//! findProvider <id>          -> reply: provider path, or empty line
//! findOptionalProvider <id>  -> reply: provider path, or empty line
//! findInput <path>           -> reply: path resolved against the input dir
//! newOutput <basename>       -> reply: allocated path under the tmp dir
//! provide <path> <id>...
//! log <text>
//! passed
//! trigger <entity>           (accepted; trigger interests are declared in
//!                             configuration, so this is warned and ignored)
//! ```
//!
//! Exit status 0 reports success (or passed, if flagged); non-zero reports
//! failure. If any `findProvider` missed, the action reports failure so the
//! driver rolls it back and retries it once the entity appears.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tracing::warn;

use crate::driver::BuildContext;
use crate::entity::EntityId;
use crate::errors::Result;
use crate::fs::FileHandle;

use super::{Action, ActionFactory};

/// Factory that matches files by filename suffix and runs a rule script
/// against each match. The same script is reused for trigger firings.
pub struct ScriptFactory {
    script: PathBuf,
    match_suffix: String,
    verb: String,
    triggers: Vec<EntityId>,
}

impl ScriptFactory {
    pub fn new(
        script: impl Into<PathBuf>,
        match_suffix: impl Into<String>,
        verb: impl Into<String>,
    ) -> Self {
        Self {
            script: script.into(),
            match_suffix: match_suffix.into(),
            verb: verb.into(),
            triggers: Vec::new(),
        }
    }

    pub fn with_triggers(mut self, triggers: Vec<EntityId>) -> Self {
        self.triggers = triggers;
        self
    }
}

impl ActionFactory for ScriptFactory {
    fn try_make_action(&self, file: &FileHandle) -> Option<Box<dyn Action>> {
        if !file.basename().ends_with(&self.match_suffix) {
            return None;
        }
        Some(Box::new(ScriptAction {
            script: self.script.clone(),
            verb: self.verb.clone(),
            input: file.clone(),
            trigger: None,
        }))
    }

    fn try_make_trigger_action(
        &self,
        id: &EntityId,
        file: &FileHandle,
    ) -> Option<Box<dyn Action>> {
        Some(Box::new(ScriptAction {
            script: self.script.clone(),
            verb: self.verb.clone(),
            input: file.clone(),
            trigger: Some(id.clone()),
        }))
    }

    fn trigger_entities(&self) -> Vec<EntityId> {
        self.triggers.clone()
    }
}

/// One invocation of a rule script against one input file.
pub struct ScriptAction {
    script: PathBuf,
    verb: String,
    input: FileHandle,
    trigger: Option<EntityId>,
}

#[async_trait]
impl Action for ScriptAction {
    fn verb(&self) -> &str {
        &self.verb
    }

    async fn start(&self, ctx: &BuildContext) -> Result<()> {
        let mut cmd = Command::new(&self.script);
        cmd.arg(self.input.path());
        if let Some(trigger) = &self.trigger {
            cmd.env("FLOWBUILD_TRIGGER", trigger.as_str());
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning rule script {:?}", self.script))?;

        let mut stdin = child
            .stdin
            .take()
            .context("rule script stdin not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("rule script stdout not captured")?;

        // Drain stderr in the background; surfaced on the task afterwards.
        let stderr_buf = Arc::new(Mutex::new(Vec::<String>::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    buf.lock().unwrap().push(line);
                }
            })
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut missed = false;
        let mut passed = false;

        while let Some(line) = lines
            .next_line()
            .await
            .context("reading rule script stdout")?
        {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

            match command {
                "findProvider" => {
                    let id = EntityId::parse(rest.trim());
                    match ctx.find_provider(&id, rest.trim())? {
                        Some(file) => reply(&mut stdin, &file.display_name()).await?,
                        None => {
                            missed = true;
                            reply(&mut stdin, "").await?;
                        }
                    }
                }
                "findOptionalProvider" => {
                    let id = EntityId::parse(rest.trim());
                    match ctx.find_optional_provider(&id)? {
                        Some(file) => reply(&mut stdin, &file.display_name()).await?,
                        None => reply(&mut stdin, "").await?,
                    }
                }
                "findInput" => {
                    let dir = self.input.parent().unwrap_or_else(|| self.input.clone());
                    reply(&mut stdin, &dir.relative(rest.trim()).display_name()).await?;
                }
                "newOutput" => {
                    let file = ctx.new_output(rest.trim())?;
                    reply(&mut stdin, &file.display_name()).await?;
                }
                "provide" => {
                    let mut parts = rest.split_whitespace();
                    let Some(path) = parts.next() else {
                        ctx.log("provide: missing path")?;
                        continue;
                    };
                    let ids: Vec<EntityId> = parts.map(EntityId::parse).collect();
                    let file = FileHandle::new(Arc::clone(self.input.filesystem()), path);
                    ctx.provide(&file, ids)?;
                }
                "log" => ctx.log(rest)?,
                "passed" => passed = true,
                "trigger" => {
                    warn!(
                        script = %self.script.display(),
                        entity = rest,
                        "rule script declared a trigger at runtime; declare it in configuration"
                    );
                }
                other => ctx.log(&format!("unknown rule command: {other}"))?,
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for rule script {:?}", self.script))?;

        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        for line in stderr_buf.lock().unwrap().drain(..) {
            ctx.log(&line)?;
        }

        if missed {
            ctx.failed()?;
        } else if status.success() {
            if passed {
                ctx.passed()?;
            } else {
                ctx.success()?;
            }
        } else {
            ctx.log(&format!("rule script exited with {status}"))?;
            ctx.failed()?;
        }

        Ok(())
    }
}

async fn reply(stdin: &mut ChildStdin, text: &str) -> Result<()> {
    stdin
        .write_all(format!("{text}\n").as_bytes())
        .await
        .context("writing rule script reply")?;
    stdin.flush().await.context("flushing rule script reply")?;
    Ok(())
}
