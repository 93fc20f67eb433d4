//! Scripted command runner for tests and dry runs.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec};

type SideEffect = Arc<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

#[derive(Clone)]
enum Response {
    Output(CommandOutput),
    Effect(SideEffect),
    Unavailable,
}

#[derive(Clone)]
struct Rule {
    program: String,
    args_prefix: Vec<String>,
    response: Response,
}

impl Rule {
    fn matches(&self, command: &CommandSpec) -> bool {
        self.program == command.program
            && command.args.len() >= self.args_prefix.len()
            && self
                .args_prefix
                .iter()
                .zip(&command.args)
                .all(|(expected, actual)| expected == actual)
    }
}

/// Returns scripted results for commands matched by program and argument prefix.
///
/// The most recently added matching rule wins. Commands no rule matches fail
/// like a program that is not installed. Every invocation is recorded.
#[derive(Clone, Default)]
pub struct ScriptedCommandRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, program: &str, args_prefix: &[&str], response: Response) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                program: program.to_string(),
                args_prefix: args_prefix.iter().map(ToString::to_string).collect(),
                response,
            });
        }
    }

    /// Answer matching commands with `output`
    pub fn on(&self, program: &str, args_prefix: &[&str], output: CommandOutput) -> &Self {
        self.push(program, args_prefix, Response::Output(output));
        self
    }

    /// Answer matching commands with exit code 0 and `stdout`
    pub fn ok(&self, program: &str, args_prefix: &[&str], stdout: &str) -> &Self {
        self.on(program, args_prefix, CommandOutput::success(stdout))
    }

    /// Answer matching commands with a non-zero exit code
    pub fn fail(&self, program: &str, args_prefix: &[&str], exit_code: i32) -> &Self {
        self.on(program, args_prefix, CommandOutput::failure(exit_code, "scripted failure"))
    }

    /// Run `effect` for matching commands, e.g. to write the file a tool would produce
    pub fn effect<F>(&self, program: &str, args_prefix: &[&str], effect: F) -> &Self
    where
        F: Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static,
    {
        self.push(program, args_prefix, Response::Effect(Arc::new(effect)));
        self
    }

    /// Make matching commands fail to start
    pub fn unavailable(&self, program: &str, args_prefix: &[&str]) -> &Self {
        self.push(program, args_prefix, Response::Unavailable);
        self
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Commands run so far whose program and leading arguments match
    pub fn calls_matching(&self, program: &str, args_prefix: &[&str]) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|call| {
                call.program == program
                    && call.args.len() >= args_prefix.len()
                    && args_prefix.iter().zip(&call.args).all(|(a, b)| a == b)
            })
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, command: &CommandSpec) -> DomainResult<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let response = self
            .rules
            .lock()
            .ok()
            .and_then(|rules| rules.iter().rev().find(|rule| rule.matches(command)).cloned())
            .map(|rule| rule.response);

        match response {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Effect(effect)) => Ok(effect(command)),
            Some(Response::Unavailable) | None => Err(DomainError::ToolUnavailable {
                program: command.program.clone(),
                reason: "no scripted response".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_matching_and_precedence() {
        let runner = ScriptedCommandRunner::new();
        runner
            .ok("git", &["rev-parse"], "generic")
            .ok("git", &["rev-parse", "--abbrev-ref"], "feature/x");

        let branch = runner
            .run(&CommandSpec::new("git").args(["rev-parse", "--abbrev-ref", "HEAD"]))
            .await
            .unwrap();
        assert_eq!(branch.stdout, "feature/x");

        let other = runner
            .run(&CommandSpec::new("git").args(["rev-parse", "--git-dir"]))
            .await
            .unwrap();
        assert_eq!(other.stdout, "generic");
    }

    #[tokio::test]
    async fn test_unmatched_and_unavailable() {
        let runner = ScriptedCommandRunner::new();
        runner.unavailable("reportgenerator", &[]);

        assert!(runner.run(&CommandSpec::new("dotnet")).await.is_err());
        assert!(runner.run(&CommandSpec::new("reportgenerator")).await.is_err());
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_effect_sees_command() {
        let runner = ScriptedCommandRunner::new();
        runner.effect("dotnet", &["test"], |cmd| CommandOutput::success(cmd.args.join(",")));

        let output = runner
            .run(&CommandSpec::new("dotnet").args(["test", "A.csproj"]))
            .await
            .unwrap();
        assert_eq!(output.stdout, "test,A.csproj");
        assert_eq!(runner.calls_matching("dotnet", &["test"]).len(), 1);
    }
}
