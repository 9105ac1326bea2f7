//! Scripted `ProcessRunner` for tests

use super::{ExitStatus, ProcessEvent, ProcessHandle, ProcessRunner};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What a fake process prints and how it ends
#[derive(Debug, Clone)]
pub struct Script {
    output: Vec<ProcessEvent>,
    status: ExitStatus,
    hang: bool,
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Self {
            output: Vec::new(),
            status: ExitStatus::Code(code),
            hang: false,
        }
    }

    /// Prints its output, then runs until killed
    pub fn hang() -> Self {
        Self {
            output: Vec::new(),
            status: ExitStatus::Killed,
            hang: true,
        }
    }

    pub fn stdout(mut self, chunk: &str) -> Self {
        self.output.push(ProcessEvent::Stdout(chunk.to_string()));
        self
    }

    pub fn stderr(mut self, chunk: &str) -> Self {
        self.output.push(ProcessEvent::Stderr(chunk.to_string()));
        self
    }
}

struct Rule {
    key: String,
    queue: VecDeque<Script>,
    repeat: Option<Script>,
    fail_launch: bool,
}

/// Matches each launch against rules by substring of the joined argv.
/// Unmatched commands exit 0 with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    launched: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(&self, key: &str, f: impl FnOnce(&mut Rule)) {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| r.key == key) {
            f(rule);
        } else {
            let mut rule = Rule {
                key: key.to_string(),
                queue: VecDeque::new(),
                repeat: None,
                fail_launch: false,
            };
            f(&mut rule);
            rules.push(rule);
        }
    }

    /// Queue `script` for the next launch whose argv contains `key`
    pub fn script(self, key: &str, script: Script) -> Self {
        self.rule(key, |r| r.queue.push_back(script));
        self
    }

    /// Use `script` for every matching launch once the queue is empty
    pub fn repeat(self, key: &str, script: Script) -> Self {
        self.rule(key, |r| r.repeat = Some(script));
        self
    }

    pub fn fail_launch(self, key: &str) -> Self {
        self.rule(key, |r| r.fail_launch = true);
        self
    }

    pub fn launched(&self) -> Vec<Vec<String>> {
        self.launched.lock().unwrap().clone()
    }

    pub fn count(&self, key: &str) -> usize {
        self.launched()
            .iter()
            .filter(|argv| argv.join(" ").contains(key))
            .count()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn launch(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>> {
        let joined = argv.join(" ");
        let mut script = Script::exit(0);
        {
            let mut rules = self.rules.lock().unwrap();
            if let Some(rule) = rules.iter_mut().find(|r| joined.contains(&r.key)) {
                if rule.fail_launch {
                    return Err(SyncError::Launch {
                        program: argv.first().cloned().unwrap_or_default(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    });
                }
                if let Some(next) = rule.queue.pop_front().or_else(|| rule.repeat.clone()) {
                    script = next;
                }
            }
        }
        self.launched.lock().unwrap().push(argv.to_vec());

        Ok(Box::new(ScriptedHandle {
            output: script.output.into(),
            status: script.status,
            hang: script.hang,
            killed: false,
            done: false,
        }))
    }
}

struct ScriptedHandle {
    output: VecDeque<ProcessEvent>,
    status: ExitStatus,
    hang: bool,
    killed: bool,
    done: bool,
}

#[async_trait]
impl ProcessHandle for ScriptedHandle {
    async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.done {
            return None;
        }
        if let Some(event) = self.output.pop_front() {
            return Some(event);
        }
        if self.killed {
            self.done = true;
            return Some(ProcessEvent::Exited(ExitStatus::Killed));
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.done = true;
        Some(ProcessEvent::Exited(self.status))
    }

    fn kill(&mut self) {
        if !self.done {
            self.killed = true;
        }
    }
}
