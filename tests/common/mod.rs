//! Common test utilities for integration tests
//!
//! Provides a fake .NET workspace on disk, Cobertura report builders and a
//! scripted toolchain (git, dotnet, reportgenerator) that writes the files the
//! real tools would.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use covergen::domain::ports::CommandOutput;
use covergen::infrastructure::process::ScriptedCommandRunner;

pub const APP_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
  </PropertyGroup>
</Project>
"#;

pub const TEST_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
    <IsPackable>false</IsPackable>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="Microsoft.NET.Test.Sdk" Version="17.8.0" />
    <PackageReference Include="xunit" Version="2.6.2" />
    <PackageReference Include="coverlet.collector" Version="6.0.0" />
  </ItemGroup>
  <ItemGroup>
    <ProjectReference Include="..\..\src\App\App.csproj" />
  </ItemGroup>
</Project>
"#;

pub const CALC_SOURCE: &str = r#"using System;

namespace App
{
    public class Calc
    {
        public Calc() { }

        // Adds two numbers
        public int Add(int a, int b)
        {
            return a + b;
        }

        public int Divide(int a, int b)
        {
            return a / b;
        }
    }
}
"#;

/// A reply the test validator accepts
pub const VALID_TESTS: &str = r#"```csharp
using Xunit;

public class CalcTests
{
    [Fact]
    public void Add_ReturnsSum()
    {
        Assert.Equal(3, new App.Calc().Add(1, 2));
    }
}
```"#;

/// Zero-context diff adding lines 10-13 of Calc.cs
pub const CALC_DIFF: &str = "diff --git a/src/App/Calc.cs b/src/App/Calc.cs
index 1111111..2222222 100644
--- a/src/App/Calc.cs
+++ b/src/App/Calc.cs
@@ -9,0 +10,4 @@ namespace App
+        public int Add(int a, int b)
+        {
+            return a + b;
+        }
";

pub const SDK_LIST: &str = "6.0.417 [/usr/share/dotnet/sdk]\n8.0.100 [/usr/share/dotnet/sdk]\n";

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Workspace with an application project, a test project and `Calc.cs`
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = temp_dir();
        write(&dir.path().join("src/App/App.csproj"), APP_CSPROJ);
        write(&dir.path().join("src/App/Calc.cs"), CALC_SOURCE);
        write(&dir.path().join("tests/App.Tests/App.Tests.csproj"), TEST_CSPROJ);
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_file(&self) -> PathBuf {
        self.root().join("src/App/Calc.cs")
    }

    pub fn test_project_dir(&self) -> PathBuf {
        self.root().join("tests/App.Tests")
    }
}

pub fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().expect("path has a parent")).expect("create parent");
    std::fs::write(path, content).expect("write file");
}

/// One class entry: file name plus `(line, hits)` pairs
pub struct ClassLines<'a> {
    pub filename: &'a str,
    pub lines: &'a [(u32, u32)],
}

/// Cobertura report whose aggregates match its lines
pub fn cobertura_report(classes: &[ClassLines<'_>]) -> String {
    let rate = |covered: usize, valid: usize| {
        if valid == 0 {
            0.0
        } else {
            covered as f64 / valid as f64
        }
    };

    let mut total_covered = 0;
    let mut total_valid = 0;
    let mut class_xml = String::new();
    for (index, class) in classes.iter().enumerate() {
        let covered = class.lines.iter().filter(|(_, hits)| *hits > 0).count();
        total_covered += covered;
        total_valid += class.lines.len();

        class_xml.push_str(&format!(
            "        <class name=\"App.Class{index}\" filename=\"{}\" line-rate=\"{}\" branch-rate=\"1\" complexity=\"1\">\n          <methods />\n          <lines>\n",
            class.filename,
            rate(covered, class.lines.len())
        ));
        for (number, hits) in class.lines {
            class_xml.push_str(&format!(
                "            <line number=\"{number}\" hits=\"{hits}\" branch=\"false\" />\n"
            ));
        }
        class_xml.push_str("          </lines>\n        </class>\n");
    }

    let root_rate = rate(total_covered, total_valid);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<coverage line-rate="{root_rate}" branch-rate="1" lines-covered="{total_covered}" lines-valid="{total_valid}" branches-covered="0" branches-valid="0" version="1.9" timestamp="1700000000">
  <sources><source>/repo/</source></sources>
  <packages>
    <package name="App" line-rate="{root_rate}" branch-rate="1" complexity="1">
      <classes>
{class_xml}      </classes>
    </package>
  </packages>
</coverage>
"#
    )
}

/// Calc.cs lines 10-13 with the first `covered` of them hit, plus an untouched file
pub fn calc_report(covered: usize) -> String {
    let calc: Vec<(u32, u32)> = (10..=13)
        .enumerate()
        .map(|(index, line)| (line, u32::from(index < covered)))
        .collect();
    cobertura_report(&[
        ClassLines {
            filename: "src/App/Calc.cs",
            lines: &calc,
        },
        ClassLines {
            filename: "src/App/Other.cs",
            lines: &[(1, 0), (2, 0), (3, 1), (4, 1)],
        },
    ])
}

/// Value following `flag` in a command line
pub fn arg_after(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|index| args.get(index + 1))
        .map(PathBuf::from)
}

/// Script a git checkout on a feature branch with `origin/main` as base
pub fn script_git(runner: &ScriptedCommandRunner, diff: &str) {
    runner
        .ok("git", &["rev-parse", "--is-inside-work-tree"], "true\n")
        .ok("git", &["rev-parse", "--show-toplevel"], "/repo\n")
        .ok("git", &["rev-parse", "--abbrev-ref", "HEAD"], "feature/calc\n")
        .fail("git", &["rev-parse", "--verify"], 1)
        .ok("git", &["rev-parse", "--verify", "--quiet", "origin/main"], "abc123\n")
        .ok("git", &["diff"], diff);
}

/// Script an installed SDK whose builds succeed; no report renderer
pub fn script_dotnet(runner: &ScriptedCommandRunner) {
    runner
        .ok("dotnet", &["--version"], "8.0.100\n")
        .ok("dotnet", &["--list-sdks"], SDK_LIST)
        .ok("dotnet", &["build"], "")
        .unavailable("reportgenerator", &[]);
}

/// Make `dotnet test` drop a collector report, one entry of `reports` per run.
///
/// The last report repeats once the list is used up. Returns the run counter.
pub fn script_test_runs(runner: &ScriptedCommandRunner, reports: Vec<String>) -> Arc<AtomicUsize> {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    runner.effect("dotnet", &["test"], move |command| {
        let run = counter.fetch_add(1, Ordering::SeqCst);
        let report = &reports[run.min(reports.len() - 1)];
        let Some(results_dir) = arg_after(&command.args, "--results-directory") else {
            return CommandOutput::failure(1, "no results directory");
        };
        let produced = results_dir.join(format!("run-{run}")).join("coverage.cobertura.xml");
        write(&produced, report);
        CommandOutput::success("Passed!")
    });
    runs
}
