//! `joule-lsp` binary: a Jsonnet language server speaking LSP over stdio.
//!
//! With no arguments it serves an editor on stdin/stdout. `--version` and
//! `--help` print and exit.

use joule_lsp::config::JSONNET_PATH;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// What the command line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Version,
    Help,
}

fn mode(args: &[String]) -> Mode {
    let mut mode = Mode::Serve;
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => return Mode::Help,
            "-V" | "--version" => mode = Mode::Version,
            _ => {}
        }
    }
    mode
}

fn help() -> String {
    format!(
        "joule-lsp {version}\n\
         Jsonnet language server: diagnostics, navigation, hover and completion\n\
         for .jsonnet and .libsonnet files.\n\
         \n\
         Editors launch it with no arguments and talk LSP over stdin/stdout.\n\
         \n\
         Flags:\n\
         \x20 -V, --version   show the version and exit\n\
         \x20 -h, --help      show this text and exit\n\
         \n\
         Library search paths come from the `jpath` initialization option,\n\
         then from {env} (entries separated by ':').\n\
         Server logs go to stderr; filter them with RUST_LOG, e.g.\n\
         RUST_LOG=joule_lsp=debug.",
        version = joule_lsp::VERSION,
        env = JSONNET_PATH,
    )
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match mode(&args) {
        Mode::Version => {
            println!("joule-lsp {}", joule_lsp::VERSION);
            return ExitCode::SUCCESS;
        }
        Mode::Help => {
            println!("{}", help());
            return ExitCode::SUCCESS;
        }
        Mode::Serve => {}
    }

    // stdout carries the protocol.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("joule_lsp=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match joule_lsp::start_stdio() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("joule-lsp")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_mode_from_args() {
        assert_eq!(mode(&args(&[])), Mode::Serve);
        assert_eq!(mode(&args(&["--stdio"])), Mode::Serve);
        assert_eq!(mode(&args(&["-V"])), Mode::Version);
        assert_eq!(mode(&args(&["--version", "--help"])), Mode::Help);
    }

    #[test]
    fn test_help_names_the_search_path_sources() {
        let text = help();
        assert!(text.starts_with(&format!("joule-lsp {}", joule_lsp::VERSION)));
        assert!(text.contains("jpath"));
        assert!(text.contains(JSONNET_PATH));
    }
}
