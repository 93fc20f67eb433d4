//! Command-line parsing.

use clap::Parser;
use std::path::PathBuf;

use covergen::cli::{Cli, Commands};

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["covergen", "check", "--json", "--config", "ci.yaml"]).unwrap();
    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
    assert!(matches!(cli.command, Commands::Check(_)));
}

#[test]
fn test_check_install_tools() {
    let cli = Cli::try_parse_from(["covergen", "check", "app", "--install-tools"]).unwrap();
    match cli.command {
        Commands::Check(args) => {
            assert_eq!(args.project_path, PathBuf::from("app"));
            assert!(args.install_tools);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_diff_defaults_to_current_directory() {
    let cli = Cli::try_parse_from(["covergen", "diff", "--base", "main"]).unwrap();
    match cli.command {
        Commands::Diff(args) => {
            assert_eq!(args.project_path, PathBuf::from("."));
            assert_eq!(args.base.as_deref(), Some("main"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_run_without_project_path() {
    let cli = Cli::try_parse_from(["covergen", "run", "Calc.cs"]).unwrap();
    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.source_file, PathBuf::from("Calc.cs"));
            assert!(args.project_path.is_none());
            assert!(args.target.is_none());
            assert!(args.max_iterations.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_run_rejects_out_of_range_target() {
    assert!(Cli::try_parse_from(["covergen", "run", "Calc.cs", "--target", "0"]).is_err());
    assert!(Cli::try_parse_from(["covergen", "run", "Calc.cs", "--target", "120"]).is_err());
    assert!(Cli::try_parse_from(["covergen", "run", "Calc.cs", "--max-iterations", "-1"]).is_err());
}

#[test]
fn test_coverage_no_html() {
    let cli = Cli::try_parse_from(["covergen", "coverage", "--no-html"]).unwrap();
    assert!(matches!(cli.command, Commands::Coverage(args) if args.no_html));
}

#[test]
fn test_unknown_subcommand_fails() {
    assert!(Cli::try_parse_from(["covergen", "serve"]).is_err());
}
